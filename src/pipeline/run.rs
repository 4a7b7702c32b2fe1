// src/pipeline/run.rs

//! Run coordination.
//!
//! One run is one pass over the target list under a single run time. Each
//! target goes fetch, normalize, block check, latest lookup and diff, then
//! snapshot append, change record and diff rows. A failing target becomes an
//! `ERROR` record and the run carries on; only an invalid target list stops
//! a run, before anything is fetched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{ChangeFlag, ChangeRecord, Config, Target, validate_targets};
use crate::pipeline::assess::{Assessment, Observation, assess, observe};
use crate::pipeline::blocked::BlockDetector;
use crate::pipeline::diff::ChangeDetector;
use crate::pipeline::normalize::Normalizer;
use crate::services::Fetcher;
use crate::storage::{ChangeLog, SnapshotStore};
use crate::utils::log;

/// Records produced by one run, in target-list order.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_time: DateTime<Utc>,
    pub records: Vec<ChangeRecord>,
    /// Change records or diff rows that could not be written
    pub persist_failures: usize,
}

impl RunOutcome {
    /// Number of targets with the given flag.
    pub fn count(&self, flag: ChangeFlag) -> usize {
        self.records.iter().filter(|r| r.flag == flag).count()
    }

    /// Per-flag counts in canonical flag order.
    pub fn counts(&self) -> Vec<(ChangeFlag, usize)> {
        ChangeFlag::ALL
            .iter()
            .map(|flag| (*flag, self.count(*flag)))
            .collect()
    }
}

/// Drives runs over a fetcher and a pair of stores.
pub struct RunCoordinator {
    fetcher: Arc<dyn Fetcher>,
    snapshots: Arc<dyn SnapshotStore>,
    changes: Arc<dyn ChangeLog>,
    normalizer: Normalizer,
    blocker: BlockDetector,
    detector: ChangeDetector,
    concurrency: usize,
    request_delay: Duration,
    target_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RunCoordinator {
    /// Build a coordinator, compiling the configured pattern sets.
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        snapshots: Arc<dyn SnapshotStore>,
        changes: Arc<dyn ChangeLog>,
    ) -> Result<Self> {
        Ok(Self {
            fetcher,
            snapshots,
            changes,
            normalizer: Normalizer::new(&config.normalize)?,
            blocker: BlockDetector::new(&config.blocking)?,
            detector: ChangeDetector::new(config.diff.max_field_len),
            concurrency: config.run.concurrency.max(1),
            request_delay: Duration::from_millis(config.run.request_delay_ms),
            target_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Run over all targets with the current time as run time.
    ///
    /// The run time is kept strictly after the last recorded run, so two
    /// runs inside the same second never share a report.
    pub async fn run(&self, targets: &[Target]) -> Result<RunOutcome> {
        validate_targets(targets)?;
        let last = self.changes.latest_run_time().await?;
        self.run_at(targets, next_run_time(current_run_time(), last)).await
    }

    /// Run over all targets with an explicit run time.
    pub async fn run_at(&self, targets: &[Target], run_time: DateTime<Utc>) -> Result<RunOutcome> {
        validate_targets(targets)?;

        log::header(&format!("Run {}", run_time.to_rfc3339()));
        log::step(
            1,
            2,
            &format!(
                "Checking {} targets (concurrency {})",
                targets.len(),
                self.concurrency
            ),
        );

        let mut outcome = RunOutcome {
            run_time,
            records: Vec::with_capacity(targets.len()),
            persist_failures: 0,
        };

        let mut assessments = stream::iter(targets)
            .map(|target| self.process_target(target, run_time))
            .buffered(self.concurrency);

        while let Some(assessment) = assessments.next().await {
            let record = &assessment.record;
            log::sub_item(&format!(
                "{}: {} ({})",
                record.target_name, record.flag, record.detail
            ));

            if let Err(e) = self.changes.append_change(record).await {
                ::log::error!("Failed to record change for {}: {}", record.target_name, e);
                outcome.persist_failures += 1;
            }
            if let Err(e) = self.changes.append_diff_rows(&assessment.rows).await {
                ::log::error!("Failed to record diff rows for {}: {}", record.target_name, e);
                outcome.persist_failures += 1;
            }
            outcome.records.push(assessment.record);
        }

        log::step(2, 2, "Run complete");
        let items: Vec<(&str, String)> = outcome
            .counts()
            .into_iter()
            .map(|(flag, count)| (flag.as_str(), count.to_string()))
            .collect();
        log::summary("Outcomes", &items);

        Ok(outcome)
    }

    /// Process one target; every failure becomes an `ERROR` assessment.
    async fn process_target(&self, target: &Target, run_time: DateTime<Utc>) -> Assessment {
        let result = self.observe_and_store(target, run_time).await;

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        result.unwrap_or_else(|e| {
            ::log::warn!("{} failed: {}", target.name, e);
            Assessment::failed(target, run_time, &e)
        })
    }

    async fn observe_and_store(&self, target: &Target, run_time: DateTime<Utc>) -> Result<Assessment> {
        let document = self.fetcher.fetch(&target.url).await?;

        let content = match observe(&document, &self.normalizer, &self.blocker) {
            Observation::Blocked { reason } => {
                return Ok(Assessment::blocked(target, run_time, reason));
            }
            Observation::Content(content) => content,
        };

        // Latest lookup and append must not interleave with another writer.
        let lock = self.target_lock(&target.name).await;
        let _guard = lock.lock().await;

        let previous = self.snapshots.latest(&target.name).await?;
        let assessment = assess(target, run_time, content, previous.as_ref(), &self.detector);
        if let Some(snapshot) = &assessment.snapshot {
            self.snapshots.append(snapshot).await?;
        }
        Ok(assessment)
    }

    async fn target_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.target_locks.lock().await;
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}

/// Current time at whole-second precision, so run times are easy to quote.
pub fn current_run_time() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

/// `now`, or one second past `last` when `now` does not come after it.
pub fn next_run_time(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match last {
        Some(last) if now <= last => last + chrono::Duration::seconds(1),
        _ => now,
    }
}
