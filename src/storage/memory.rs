//! In-memory storage, used by tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{ChangeRecord, DiffEntry, Snapshot};
use crate::storage::{ChangeLog, SnapshotStore, latest_of};

#[derive(Debug, Default)]
struct Logs {
    snapshots: Vec<Snapshot>,
    changes: Vec<ChangeRecord>,
    diffs: Vec<DiffEntry>,
}

/// Storage backend holding every log in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    logs: Mutex<Logs>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full snapshot history of one target, in append order.
    pub async fn history(&self, target_name: &str) -> Vec<Snapshot> {
        self.logs
            .lock()
            .await
            .snapshots
            .iter()
            .filter(|s| s.target_name == target_name)
            .cloned()
            .collect()
    }

    /// Every change record, in append order.
    pub async fn all_changes(&self) -> Vec<ChangeRecord> {
        self.logs.lock().await.changes.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStorage {
    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        self.logs.lock().await.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn latest(&self, target_name: &str) -> Result<Option<Snapshot>> {
        let logs = self.logs.lock().await;
        Ok(latest_of(&logs.snapshots, target_name).cloned())
    }
}

#[async_trait]
impl ChangeLog for MemoryStorage {
    async fn append_change(&self, record: &ChangeRecord) -> Result<()> {
        self.logs.lock().await.changes.push(record.clone());
        Ok(())
    }

    async fn append_diff_rows(&self, rows: &[DiffEntry]) -> Result<()> {
        self.logs.lock().await.diffs.extend_from_slice(rows);
        Ok(())
    }

    async fn changes_for_run(&self, run_time: DateTime<Utc>) -> Result<Vec<ChangeRecord>> {
        let logs = self.logs.lock().await;
        Ok(logs
            .changes
            .iter()
            .filter(|r| r.run_time == run_time)
            .cloned()
            .collect())
    }

    async fn diffs_for_run(&self, run_time: DateTime<Utc>) -> Result<Vec<DiffEntry>> {
        let logs = self.logs.lock().await;
        Ok(logs
            .diffs
            .iter()
            .filter(|r| r.run_time == run_time)
            .cloned()
            .collect())
    }

    async fn latest_run_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.logs.lock().await.changes.iter().map(|r| r.run_time).max())
    }
}
