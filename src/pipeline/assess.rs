//! Per-target outcome derivation.
//!
//! Everything here is synchronous and side-effect free: given a fetched
//! document and the latest stored snapshot it decides the change record, the
//! diff rows and the snapshot to persist. The coordinator only sequences I/O
//! around it.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    Canonical, ChangeDetail, ChangeFlag, ChangeRecord, DiffEntry, Snapshot, Target,
};
use crate::pipeline::blocked::{BlockCheck, BlockDetector};
use crate::pipeline::diff::ChangeDetector;
use crate::pipeline::normalize::Normalizer;
use crate::services::FetchedDocument;

/// A fetched document after normalization and the block check.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Content(Canonical),
    Blocked { reason: String },
}

/// Normalize a document and classify it as content or a blocked page.
pub fn observe(
    document: &FetchedDocument,
    normalizer: &Normalizer,
    blocker: &BlockDetector,
) -> Observation {
    let canonical = normalizer.normalize(&document.body, document.kind);
    match blocker.check(&canonical) {
        BlockCheck::Clear => Observation::Content(canonical),
        BlockCheck::Blocked { reason } => Observation::Blocked { reason },
    }
}

/// Everything one target contributes to a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub record: ChangeRecord,
    pub rows: Vec<DiffEntry>,
    /// Snapshot to append; `None` for blocked and failed targets
    pub snapshot: Option<Snapshot>,
}

impl Assessment {
    /// Outcome for a blocked page: no snapshot, no rows.
    pub fn blocked(target: &Target, run_time: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            record: record(target, run_time, ChangeFlag::Blocked, ChangeDetail::Reason(reason.into())),
            rows: Vec::new(),
            snapshot: None,
        }
    }

    /// Outcome for a target whose processing failed.
    pub fn failed(target: &Target, run_time: DateTime<Utc>, error: &AppError) -> Self {
        Self {
            record: record(
                target,
                run_time,
                ChangeFlag::Error,
                ChangeDetail::Reason(error.to_string()),
            ),
            rows: Vec::new(),
            snapshot: None,
        }
    }

    pub fn flag(&self) -> ChangeFlag {
        self.record.flag
    }
}

/// Compare fresh content with the latest snapshot of a target.
pub fn assess(
    target: &Target,
    run_time: DateTime<Utc>,
    content: Canonical,
    previous: Option<&Snapshot>,
    detector: &ChangeDetector,
) -> Assessment {
    let detection = detector.detect(previous.map(|s| &s.content), &content);
    if detection.has_changes() {
        log::debug!("{}: {} diff rows", target.name, detection.change_count());
    }

    let rows = detection
        .rows
        .into_iter()
        .map(|row| DiffEntry {
            run_time,
            target_name: target.name.clone(),
            url: target.url.clone(),
            row,
        })
        .collect::<Vec<_>>();

    Assessment {
        record: record(target, run_time, detection.flag, ChangeDetail::Count(rows.len())),
        rows,
        snapshot: Some(Snapshot {
            run_time,
            target_name: target.name.clone(),
            url: target.url.clone(),
            content,
        }),
    }
}

fn record(
    target: &Target,
    run_time: DateTime<Utc>,
    flag: ChangeFlag,
    detail: ChangeDetail,
) -> ChangeRecord {
    ChangeRecord {
        run_time,
        target_name: target.name.clone(),
        url: target.url.clone(),
        flag,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockingConfig, NormalizeConfig};
    use crate::utils::http::ContentKind;
    use serde_json::json;

    fn target() -> Target {
        Target::new("SOB", "https://example.com/sob")
    }

    fn run_time() -> DateTime<Utc> {
        "2026-03-02T08:00:00Z".parse().unwrap()
    }

    fn previous(content: Canonical) -> Snapshot {
        Snapshot {
            run_time: "2026-03-01T08:00:00Z".parse().unwrap(),
            target_name: "SOB".into(),
            url: "https://example.com/sob".into(),
            content,
        }
    }

    fn observe_body(body: &str, kind: ContentKind) -> Observation {
        let normalizer = Normalizer::new(&NormalizeConfig::default()).unwrap();
        let blocker = BlockDetector::new(&BlockingConfig::default()).unwrap();
        observe(&FetchedDocument::new(body, kind), &normalizer, &blocker)
    }

    #[test]
    fn test_observe_content_and_blocks() {
        assert_eq!(
            observe_body("<p>Fee schedule</p>", ContentKind::Html),
            Observation::Content(Canonical::Text("Fee schedule".into()))
        );
        assert_eq!(
            observe_body("<html><body><script>x()</script></body></html>", ContentKind::Html),
            Observation::Blocked {
                reason: "empty_content".into()
            }
        );
        assert_eq!(
            observe_body("<h1>Access Denied</h1>", ContentKind::Html),
            Observation::Blocked {
                reason: "access_denied".into()
            }
        );
        assert!(matches!(
            observe_body(r#"{"status": "captcha"}"#, ContentKind::Json),
            Observation::Content(Canonical::Structured(_))
        ));
    }

    #[test]
    fn test_login_form_is_blocked() {
        let page = "<html><body><h1>Sign in to continue</h1>\
                    <label>Email address</label><label>Password</label>\
                    <button>Sign in</button></body></html>";
        assert_eq!(
            observe_body(page, ContentKind::Html),
            Observation::Blocked {
                reason: "login_wall".into()
            }
        );
    }

    #[test]
    fn test_page_with_captcha_footer_is_content() {
        let page = "<html><body><h2>Fee schedule</h2><p>L123 Lipid panel</p>\
                    <footer>This site is protected by reCAPTCHA and the Google \
                    Privacy Policy and Terms of Service apply.</footer></body></html>";
        assert!(matches!(
            observe_body(page, ContentKind::Html),
            Observation::Content(Canonical::Text(_))
        ));
    }

    #[test]
    fn test_first_run() {
        let result = assess(
            &target(),
            run_time(),
            Canonical::Text("A".into()),
            None,
            &ChangeDetector::default(),
        );
        assert_eq!(result.flag(), ChangeFlag::FirstRun);
        assert_eq!(result.record.detail, ChangeDetail::Count(0));
        assert!(result.rows.is_empty());
        assert_eq!(result.snapshot.unwrap().run_time, run_time());
    }

    #[test]
    fn test_changed_rows_carry_target_and_run() {
        let prev = previous(Canonical::Text("A\nB\nC".into()));
        let result = assess(
            &target(),
            run_time(),
            Canonical::Text("A\nX\nC".into()),
            Some(&prev),
            &ChangeDetector::default(),
        );
        assert_eq!(result.flag(), ChangeFlag::Changed);
        assert_eq!(result.record.change_count(), Some(1));
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].target_name, "SOB");
        assert_eq!(result.rows[0].run_time, run_time());
        assert_eq!(result.rows[0].row.line_no, 2);
        assert!(result.snapshot.is_some());
    }

    #[test]
    fn test_no_change_still_snapshots() {
        let prev = previous(Canonical::Structured(json!({"a": 1})));
        let result = assess(
            &target(),
            run_time(),
            Canonical::Structured(json!({"a": 1})),
            Some(&prev),
            &ChangeDetector::default(),
        );
        assert_eq!(result.flag(), ChangeFlag::NoChange);
        assert_eq!(result.record.change_count(), Some(0));
        assert!(result.snapshot.is_some());
    }

    #[test]
    fn test_float_formatting_is_no_change() {
        let Observation::Content(before) = observe_body(r#"{"a": 1}"#, ContentKind::Json) else {
            panic!("expected content");
        };
        let Observation::Content(after) = observe_body(r#"{"a": 1.0}"#, ContentKind::Json) else {
            panic!("expected content");
        };
        let prev = previous(before);
        let result = assess(&target(), run_time(), after, Some(&prev), &ChangeDetector::default());
        assert_eq!(result.flag(), ChangeFlag::NoChange);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_blocked_and_failed_persist_nothing() {
        let blocked = Assessment::blocked(&target(), run_time(), "captcha");
        assert_eq!(blocked.flag(), ChangeFlag::Blocked);
        assert_eq!(blocked.record.detail, ChangeDetail::Reason("captcha".into()));
        assert!(blocked.snapshot.is_none() && blocked.rows.is_empty());

        let error = AppError::fetch("https://example.com/sob", "HTTP 404 Not Found");
        let failed = Assessment::failed(&target(), run_time(), &error);
        assert_eq!(failed.flag(), ChangeFlag::Error);
        assert_eq!(
            failed.record.detail.to_string(),
            "Fetch failed for https://example.com/sob: HTTP 404 Not Found"
        );
        assert!(failed.snapshot.is_none());
    }
}
