//! Storage abstractions for snapshots and run logs.
//!
//! Everything is append-only. Three logs live under the storage root:
//!
//! ```text
//! storage/
//! ├── config.toml        # Watcher configuration
//! ├── snapshots.jsonl    # Canonical content per target per run
//! ├── changes.jsonl      # One change record per target per run
//! └── diffs.jsonl        # Diff rows for CHANGED targets
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ChangeRecord, DiffEntry, Snapshot};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Append-only snapshot history keyed by target name.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Append a snapshot to the history.
    async fn append(&self, snapshot: &Snapshot) -> Result<()>;

    /// Most recent snapshot for a target. Among equal run times the one
    /// appended last wins.
    async fn latest(&self, target_name: &str) -> Result<Option<Snapshot>>;
}

/// Append-only change summary and diff archive.
#[async_trait]
pub trait ChangeLog: Send + Sync {
    /// Append one change record.
    async fn append_change(&self, record: &ChangeRecord) -> Result<()>;

    /// Append diff rows in order. An empty slice writes nothing.
    async fn append_diff_rows(&self, rows: &[DiffEntry]) -> Result<()>;

    /// Change records written for a run, in append order.
    async fn changes_for_run(&self, run_time: DateTime<Utc>) -> Result<Vec<ChangeRecord>>;

    /// Diff rows written for a run, in append order.
    async fn diffs_for_run(&self, run_time: DateTime<Utc>) -> Result<Vec<DiffEntry>>;

    /// Run time of the most recent recorded run.
    async fn latest_run_time(&self) -> Result<Option<DateTime<Utc>>>;
}

/// Pick the most recent snapshot for a target, last appended winning ties.
pub(crate) fn latest_of<'a>(
    history: impl IntoIterator<Item = &'a Snapshot>,
    target_name: &str,
) -> Option<&'a Snapshot> {
    history
        .into_iter()
        .filter(|s| s.target_name == target_name)
        .fold(None, |best: Option<&Snapshot>, s| match best {
            Some(b) if b.run_time > s.run_time => Some(b),
            _ => Some(s),
        })
}
