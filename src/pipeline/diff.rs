//! Change detection between the latest snapshot and fresh content.
//!
//! Per target the outcome only depends on the single most recent snapshot:
//! no snapshot gives `FIRST_RUN`, equal content gives `NO_CHANGE`, anything
//! else gives `CHANGED` with diff rows.
//!
//! Text rows come from an LCS line alignment scanned left to right with a
//! prior-position counter and a one-slot buffer holding the latest removed
//! line. Each inserted line emits a row pairing it with the buffered removal.
//! A removal that is never followed by an insertion is not reported, so a
//! pure deletion is `CHANGED` with zero rows.

use crate::models::{Canonical, ChangeFlag, DiffRow};
use crate::utils::truncate;

/// Cells allowed in the LCS table before falling back to a block replace.
const MAX_LCS_CELLS: usize = 16_000_000;

/// One step of a line edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp<'a> {
    Unchanged(&'a str),
    Removed(&'a str),
    Inserted(&'a str),
}

/// Result of comparing current content with the latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub flag: ChangeFlag,
    pub rows: Vec<DiffRow>,
}

impl Detection {
    /// Number of emitted diff rows.
    pub fn change_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the content changed.
    pub fn has_changes(&self) -> bool {
        self.flag == ChangeFlag::Changed
    }
}

/// Compares canonical content and builds diff rows.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    /// Longest before/after text kept in a text row
    max_field_len: usize,
}

impl ChangeDetector {
    /// Create a detector truncating text row fields to `max_field_len`.
    pub fn new(max_field_len: usize) -> Self {
        Self { max_field_len }
    }

    /// Classify `current` against the latest stored content, if any.
    pub fn detect(&self, previous: Option<&Canonical>, current: &Canonical) -> Detection {
        let Some(previous) = previous else {
            return Detection {
                flag: ChangeFlag::FirstRun,
                rows: Vec::new(),
            };
        };

        if previous == current {
            return Detection {
                flag: ChangeFlag::NoChange,
                rows: Vec::new(),
            };
        }

        let rows = match (previous, current) {
            (Canonical::Text(before), Canonical::Text(after)) => self.text_rows(before, after),
            _ => vec![structured_row(previous, current)],
        };

        Detection {
            flag: ChangeFlag::Changed,
            rows,
        }
    }

    /// Diff rows between two canonical texts.
    pub fn text_rows(&self, before: &str, after: &str) -> Vec<DiffRow> {
        let before_lines: Vec<&str> = before.lines().collect();
        let after_lines: Vec<&str> = after.lines().collect();

        let mut rows = Vec::new();
        let mut line_no = 0;
        let mut pending: Option<&str> = None;

        for op in line_ops(&before_lines, &after_lines) {
            match op {
                LineOp::Unchanged(_) => {
                    line_no += 1;
                    pending = None;
                }
                LineOp::Removed(text) => {
                    // Removed lines hold a prior position too.
                    line_no += 1;
                    pending = Some(text);
                }
                LineOp::Inserted(text) => {
                    let full_before = pending.take().unwrap_or("");
                    rows.push(DiffRow::new(
                        line_no,
                        full_before,
                        text,
                        truncate(full_before, self.max_field_len),
                        truncate(text, self.max_field_len),
                    ));
                }
            }
        }

        rows
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(crate::models::DiffConfig::default().max_field_len)
    }
}

/// Convenience function to detect a change with default settings.
pub fn detect_change(previous: Option<&Canonical>, current: &Canonical) -> Detection {
    ChangeDetector::default().detect(previous, current)
}

/// The single untruncated row reported for structured content.
fn structured_row(previous: &Canonical, current: &Canonical) -> DiffRow {
    let before = previous.serialized();
    let after = current.serialized();
    DiffRow::new(0, &before, &after, before.clone(), after.clone())
}

/// Line edit script between two line sequences, in original order.
///
/// Within a change hunk removals come before insertions.
pub fn line_ops<'a>(before: &[&'a str], after: &[&'a str]) -> Vec<LineOp<'a>> {
    line_ops_bounded(before, after, MAX_LCS_CELLS)
}

fn line_ops_bounded<'a>(before: &[&'a str], after: &[&'a str], max_cells: usize) -> Vec<LineOp<'a>> {
    let prefix = before
        .iter()
        .zip(after)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = before[prefix..]
        .iter()
        .rev()
        .zip(after[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &before[prefix..before.len() - suffix];
    let b = &after[prefix..after.len() - suffix];

    let mut ops: Vec<LineOp<'a>> = before[..prefix]
        .iter()
        .map(|line| LineOp::Unchanged(*line))
        .collect();

    let cells = (a.len() + 1).saturating_mul(b.len() + 1);
    if cells > max_cells {
        log::debug!(
            "Diff of {}x{} lines exceeds LCS limit, reporting as block replace",
            a.len(),
            b.len()
        );
        ops.extend(a.iter().map(|line| LineOp::Removed(*line)));
        ops.extend(b.iter().map(|line| LineOp::Inserted(*line)));
    } else {
        ops.extend(lcs_ops(a, b));
    }

    ops.extend(
        before[before.len() - suffix..]
            .iter()
            .map(|line| LineOp::Unchanged(*line)),
    );
    ops
}

/// Classic dynamic-programming LCS alignment.
fn lcs_ops<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<LineOp<'a>> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;

    // table[i * width + j] = LCS length of a[i..] and b[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(LineOp::Unchanged(a[i]));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(LineOp::Removed(a[i]));
            i += 1;
        } else {
            ops.push(LineOp::Inserted(b[j]));
            j += 1;
        }
    }
    ops.extend(a[i..].iter().map(|line| LineOp::Removed(*line)));
    ops.extend(b[j..].iter().map(|line| LineOp::Inserted(*line)));
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::TRUNCATION_MARKER;
    use proptest::prelude::*;
    use serde_json::json;

    fn text(s: &str) -> Canonical {
        Canonical::Text(s.to_string())
    }

    fn summary(rows: &[DiffRow]) -> Vec<(usize, &str, &str)> {
        rows.iter()
            .map(|r| (r.line_no, r.before.as_str(), r.after.as_str()))
            .collect()
    }

    #[test]
    fn test_first_run() {
        let result = detect_change(None, &text("anything"));
        assert_eq!(result.flag, ChangeFlag::FirstRun);
        assert_eq!(result.change_count(), 0);
    }

    #[test]
    fn test_no_change() {
        let result = detect_change(Some(&text("A\nB")), &text("A\nB"));
        assert_eq!(result.flag, ChangeFlag::NoChange);
        assert!(result.rows.is_empty());
        assert!(!result.has_changes());
    }

    #[test]
    fn test_pure_substitution() {
        let result = detect_change(Some(&text("A\nB\nC")), &text("A\nX\nC"));
        assert_eq!(result.flag, ChangeFlag::Changed);
        assert_eq!(summary(&result.rows), vec![(2, "B", "X")]);
        assert_eq!(result.rows[0].before_len, 1);
        assert_eq!(result.rows[0].delta_len, 0);
    }

    #[test]
    fn test_pure_deletion_emits_no_rows() {
        let result = detect_change(Some(&text("A\nB")), &text("A"));
        assert_eq!(result.flag, ChangeFlag::Changed);
        assert!(result.rows.is_empty());
        assert_eq!(result.change_count(), 0);
    }

    #[test]
    fn test_pure_insertion() {
        let result = detect_change(Some(&text("A")), &text("A\nB"));
        assert_eq!(result.flag, ChangeFlag::Changed);
        assert_eq!(summary(&result.rows), vec![(1, "", "B")]);
        assert_eq!(result.rows[0].delta_len, 1);
    }

    #[test]
    fn test_only_latest_removal_is_paired() {
        let result = detect_change(Some(&text("A\nB\nC\nD")), &text("A\nX\nD"));
        assert_eq!(summary(&result.rows), vec![(3, "C", "X")]);
    }

    #[test]
    fn test_extra_insertions_get_empty_before() {
        let result = detect_change(Some(&text("A\nB\nC")), &text("A\nX\nY\nC"));
        assert_eq!(summary(&result.rows), vec![(2, "B", "X"), (2, "", "Y")]);
    }

    #[test]
    fn test_deletion_then_unchanged_is_dropped() {
        let result = detect_change(Some(&text("a\nb\nc\nd")), &text("a\nc\nd\ne"));
        assert_eq!(summary(&result.rows), vec![(4, "", "e")]);
    }

    #[test]
    fn test_insertion_at_start() {
        let result = detect_change(Some(&text("B\nC")), &text("A\nB\nC"));
        assert_eq!(summary(&result.rows), vec![(0, "", "A")]);
    }

    #[test]
    fn test_from_empty_text() {
        let result = detect_change(Some(&text("")), &text("A\nB"));
        assert_eq!(summary(&result.rows), vec![(0, "", "A"), (0, "", "B")]);
    }

    #[test]
    fn test_long_lines_truncated_but_measured() {
        let long = "x".repeat(50);
        let detector = ChangeDetector::new(10);
        let rows = detector.text_rows("A\nold", &format!("A\n{long}"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].after, format!("{}{}", "x".repeat(10), TRUNCATION_MARKER));
        assert_eq!(rows[0].after_len, 50);
        assert_eq!(rows[0].before, "old");
        assert_eq!(rows[0].delta_len, 47);
    }

    #[test]
    fn test_structured_change_is_one_row() {
        let before = Canonical::Structured(json!({"a": 1, "b": 2, "c": 3}));
        let after = Canonical::Structured(json!({"a": 9, "b": 8, "c": 7}));
        let result = detect_change(Some(&before), &after);
        assert_eq!(result.flag, ChangeFlag::Changed);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].line_no, 0);
        assert_eq!(result.rows[0].before, r#"{"a":1,"b":2,"c":3}"#);
        assert_eq!(result.rows[0].after, r#"{"a":9,"b":8,"c":7}"#);
    }

    #[test]
    fn test_structured_equality_ignores_key_order() {
        let before: serde_json::Value = serde_json::from_str(r#"{"b": [1, 2], "a": {"y": 1, "x": 0}}"#).unwrap();
        let after: serde_json::Value = serde_json::from_str(r#"{"a": {"x": 0, "y": 1}, "b": [1, 2]}"#).unwrap();
        let result = detect_change(
            Some(&Canonical::Structured(before)),
            &Canonical::Structured(after),
        );
        assert_eq!(result.flag, ChangeFlag::NoChange);
    }

    #[test]
    fn test_structured_rows_are_not_truncated() {
        let big = "v".repeat(100);
        let detector = ChangeDetector::new(5);
        let result = detector.detect(
            Some(&Canonical::Structured(json!({"k": "old"}))),
            &Canonical::Structured(json!({ "k": big })),
        );
        assert!(!result.rows[0].after.contains(TRUNCATION_MARKER));
        assert_eq!(result.rows[0].after_len, result.rows[0].after.chars().count());
    }

    #[test]
    fn test_mixed_kinds_are_structured_change() {
        let result = detect_change(
            Some(&text("Fees\nLab codes")),
            &Canonical::Structured(json!([1, 2])),
        );
        assert_eq!(result.flag, ChangeFlag::Changed);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].line_no, 0);
        assert_eq!(result.rows[0].before, "Fees\nLab codes");
        assert_eq!(result.rows[0].after, "[1,2]");
    }

    #[test]
    fn test_line_ops_alignment() {
        let ops = line_ops(&["a", "b", "c", "d"], &["a", "c", "d", "e"]);
        assert_eq!(
            ops,
            vec![
                LineOp::Unchanged("a"),
                LineOp::Removed("b"),
                LineOp::Unchanged("c"),
                LineOp::Unchanged("d"),
                LineOp::Inserted("e"),
            ]
        );
    }

    #[test]
    fn test_line_ops_fallback_keeps_prefix_and_suffix() {
        let ops = line_ops_bounded(&["a", "b", "c", "z"], &["a", "x", "b", "z"], 4);
        assert_eq!(
            ops,
            vec![
                LineOp::Unchanged("a"),
                LineOp::Removed("b"),
                LineOp::Removed("c"),
                LineOp::Inserted("x"),
                LineOp::Inserted("b"),
                LineOp::Unchanged("z"),
            ]
        );
    }

    fn lines() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-d]{2}", 0..12)
    }

    proptest! {
        #[test]
        fn prop_edit_script_rebuilds_both_sides(before in lines(), after in lines()) {
            let a: Vec<&str> = before.iter().map(String::as_str).collect();
            let b: Vec<&str> = after.iter().map(String::as_str).collect();
            let ops = line_ops(&a, &b);

            let old: Vec<&str> = ops.iter().filter_map(|op| match op {
                LineOp::Unchanged(l) | LineOp::Removed(l) => Some(*l),
                LineOp::Inserted(_) => None,
            }).collect();
            let new: Vec<&str> = ops.iter().filter_map(|op| match op {
                LineOp::Unchanged(l) | LineOp::Inserted(l) => Some(*l),
                LineOp::Removed(_) => None,
            }).collect();
            prop_assert_eq!(old, a);
            prop_assert_eq!(new, b);
        }

        #[test]
        fn prop_changed_text_row_count_matches_insertions(before in lines(), after in lines()) {
            let prev = Canonical::Text(before.join("\n"));
            let curr = Canonical::Text(after.join("\n"));
            let result = detect_change(Some(&prev), &curr);

            if prev == curr {
                prop_assert_eq!(result.flag, ChangeFlag::NoChange);
                prop_assert!(result.rows.is_empty());
            } else {
                prop_assert_eq!(result.flag, ChangeFlag::Changed);
                let a: Vec<&str> = before.iter().map(String::as_str).collect();
                let b: Vec<&str> = after.iter().map(String::as_str).collect();
                let inserted = line_ops(&a, &b)
                    .iter()
                    .filter(|op| matches!(op, LineOp::Inserted(_)))
                    .count();
                prop_assert_eq!(result.change_count(), inserted);
                for row in &result.rows {
                    prop_assert!(row.line_no <= before.len());
                }
            }
        }
    }
}
