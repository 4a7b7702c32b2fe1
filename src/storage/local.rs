//! Local filesystem storage implementation.
//!
//! Each log is a JSON Lines file: one serialized record per line, appended
//! and never rewritten. Lines that fail to parse are skipped with a warning
//! so a torn write cannot poison the whole history.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ChangeRecord, DiffEntry, Snapshot};
use crate::storage::{ChangeLog, SnapshotStore, latest_of};

const SNAPSHOTS: &str = "snapshots.jsonl";
const CHANGES: &str = "changes.jsonl";
const DIFFS: &str = "diffs.jsonl";

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Append records as JSON lines in a single write.
    async fn append_lines<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for item in items {
            serde_json::to_writer(&mut buf, item)?;
            buf.push(b'\n');
        }

        let path = self.path(key);
        let _guard = self.write_lock.lock().await;
        self.ensure_dir(&path).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read every parsable record of a JSON Lines file.
    async fn read_lines<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(bytes) = self.read_bytes(key).await? else {
            return Ok(Vec::new());
        };

        let text = String::from_utf8_lossy(&bytes);
        let mut items = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(item) => items.push(item),
                Err(e) => log::warn!("Skipping malformed line {} of {}: {}", index + 1, key, e),
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl SnapshotStore for LocalStorage {
    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        self.append_lines(SNAPSHOTS, std::slice::from_ref(snapshot))
            .await
    }

    async fn latest(&self, target_name: &str) -> Result<Option<Snapshot>> {
        let history: Vec<Snapshot> = self.read_lines(SNAPSHOTS).await?;
        Ok(latest_of(&history, target_name).cloned())
    }
}

#[async_trait]
impl ChangeLog for LocalStorage {
    async fn append_change(&self, record: &ChangeRecord) -> Result<()> {
        self.append_lines(CHANGES, std::slice::from_ref(record)).await
    }

    async fn append_diff_rows(&self, rows: &[DiffEntry]) -> Result<()> {
        self.append_lines(DIFFS, rows).await
    }

    async fn changes_for_run(&self, run_time: DateTime<Utc>) -> Result<Vec<ChangeRecord>> {
        let records: Vec<ChangeRecord> = self.read_lines(CHANGES).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.run_time == run_time)
            .collect())
    }

    async fn diffs_for_run(&self, run_time: DateTime<Utc>) -> Result<Vec<DiffEntry>> {
        let rows: Vec<DiffEntry> = self.read_lines(DIFFS).await?;
        Ok(rows.into_iter().filter(|r| r.run_time == run_time).collect())
    }

    async fn latest_run_time(&self) -> Result<Option<DateTime<Utc>>> {
        let records: Vec<ChangeRecord> = self.read_lines(CHANGES).await?;
        Ok(records.iter().map(|r| r.run_time).max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Canonical, ChangeDetail, ChangeFlag, DiffRow};
    use serde_json::json;
    use tempfile::TempDir;

    fn time(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn snapshot(name: &str, run_time: &str, content: Canonical) -> Snapshot {
        Snapshot {
            run_time: time(run_time),
            target_name: name.into(),
            url: format!("https://{}.example.com", name.to_lowercase()),
            content,
        }
    }

    fn record(name: &str, run_time: &str, flag: ChangeFlag, detail: ChangeDetail) -> ChangeRecord {
        ChangeRecord {
            run_time: time(run_time),
            target_name: name.into(),
            url: "https://example.com".into(),
            flag,
            detail,
        }
    }

    #[tokio::test]
    async fn test_latest_on_empty_storage() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.latest("SOB").await.unwrap().is_none());
        assert!(storage.latest_run_time().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshots_round_trip_both_kinds() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let text = snapshot("SOB", "2026-03-01T00:00:00Z", Canonical::Text("A\nB".into()));
        let structured = snapshot(
            "API",
            "2026-03-01T00:00:00Z",
            Canonical::Structured(json!({"a": [1, 2]})),
        );
        storage.append(&text).await.unwrap();
        storage.append(&structured).await.unwrap();

        assert_eq!(storage.latest("SOB").await.unwrap(), Some(text));
        assert_eq!(storage.latest("API").await.unwrap(), Some(structured));
    }

    #[tokio::test]
    async fn test_latest_prefers_newest_then_last_appended() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        for (t, body) in [
            ("2026-03-02T00:00:00Z", "second"),
            ("2026-03-01T00:00:00Z", "first"),
            ("2026-03-02T00:00:00Z", "second again"),
        ] {
            let s = snapshot("SOB", t, Canonical::Text(body.into()));
            storage.append(&s).await.unwrap();
        }

        let latest = storage.latest("SOB").await.unwrap().unwrap();
        assert_eq!(latest.content.as_text(), Some("second again"));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let s = snapshot("SOB", "2026-03-01T00:00:00Z", Canonical::Text("kept".into()));
        storage.append(&s).await.unwrap();

        let path = tmp.path().join(SNAPSHOTS);
        let mut raw = tokio::fs::read_to_string(&path).await.unwrap();
        raw.push_str("{\"run_time\": \"not a time\"\n\n");
        tokio::fs::write(&path, raw).await.unwrap();

        assert_eq!(storage.latest("SOB").await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn test_change_log_filters_by_run() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let first = "2026-03-01T00:00:00Z";
        let second = "2026-03-02T00:00:00Z";

        storage
            .append_change(&record("A", first, ChangeFlag::FirstRun, ChangeDetail::Count(0)))
            .await
            .unwrap();
        storage
            .append_change(&record("A", second, ChangeFlag::Changed, ChangeDetail::Count(1)))
            .await
            .unwrap();
        storage
            .append_change(&record(
                "B",
                second,
                ChangeFlag::Error,
                ChangeDetail::Reason("timeout".into()),
            ))
            .await
            .unwrap();

        let entry = DiffEntry {
            run_time: time(second),
            target_name: "A".into(),
            url: "https://example.com".into(),
            row: DiffRow::new(2, "B", "X", "B".into(), "X".into()),
        };
        storage.append_diff_rows(&[entry.clone()]).await.unwrap();
        storage.append_diff_rows(&[]).await.unwrap();

        let changes = storage.changes_for_run(time(second)).await.unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].target_name, "A");
        assert_eq!(changes[1].flag, ChangeFlag::Error);

        assert_eq!(storage.diffs_for_run(time(second)).await.unwrap(), vec![entry]);
        assert!(storage.diffs_for_run(time(first)).await.unwrap().is_empty());
        assert_eq!(storage.latest_run_time().await.unwrap(), Some(time(second)));
    }

    #[tokio::test]
    async fn test_creates_missing_root() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("nested/storage"));

        let s = snapshot("SOB", "2026-03-01T00:00:00Z", Canonical::Text("x y".into()));
        storage.append(&s).await.unwrap();
        assert!(storage.root().join(SNAPSHOTS).exists());
    }
}
