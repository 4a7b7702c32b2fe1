//! Change records and diff rows emitted by a run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-target, per-run outcome classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeFlag {
    FirstRun,
    NoChange,
    Changed,
    Blocked,
    Error,
}

impl ChangeFlag {
    pub const ALL: [ChangeFlag; 5] = [
        ChangeFlag::FirstRun,
        ChangeFlag::NoChange,
        ChangeFlag::Changed,
        ChangeFlag::Blocked,
        ChangeFlag::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFlag::FirstRun => "FIRST_RUN",
            ChangeFlag::NoChange => "NO_CHANGE",
            ChangeFlag::Changed => "CHANGED",
            ChangeFlag::Blocked => "BLOCKED",
            ChangeFlag::Error => "ERROR",
        }
    }
}

impl fmt::Display for ChangeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row count for observed outcomes, reason text for blocked and failed ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ChangeDetail {
    Count(usize),
    Reason(String),
}

impl fmt::Display for ChangeDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeDetail::Count(count) => write!(f, "{count}"),
            ChangeDetail::Reason(reason) => f.write_str(reason),
        }
    }
}

/// One line of the change summary log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    pub run_time: DateTime<Utc>,
    pub target_name: String,
    pub url: String,
    #[serde(rename = "change_flag")]
    pub flag: ChangeFlag,
    #[serde(rename = "change_detail")]
    pub detail: ChangeDetail,
}

impl ChangeRecord {
    /// Diff row count, when the detail carries one.
    pub fn change_count(&self) -> Option<usize> {
        match self.detail {
            ChangeDetail::Count(count) => Some(count),
            ChangeDetail::Reason(_) => None,
        }
    }
}

/// One unit of difference between a prior and a current snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffRow {
    /// 1-based position in the prior content's lines; 0 for structured rows
    pub line_no: usize,
    pub before: String,
    pub after: String,
    /// Length of the untruncated before text, in chars
    pub before_len: usize,
    /// Length of the untruncated after text, in chars
    pub after_len: usize,
    pub delta_len: i64,
}

impl DiffRow {
    /// Build a row, measuring lengths on the full texts and storing the
    /// (possibly truncated) display values.
    pub fn new(
        line_no: usize,
        full_before: &str,
        full_after: &str,
        before: String,
        after: String,
    ) -> Self {
        let before_len = full_before.chars().count();
        let after_len = full_after.chars().count();
        Self {
            line_no,
            before,
            after,
            before_len,
            after_len,
            delta_len: after_len as i64 - before_len as i64,
        }
    }
}

/// A diff row as written to the diff archive log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffEntry {
    pub run_time: DateTime<Utc>,
    pub target_name: String,
    pub url: String,
    #[serde(flatten)]
    pub row: DiffRow,
}
