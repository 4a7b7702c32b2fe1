// src/pipeline/summary.rs

//! Per-run summary for alerting.
//!
//! A [`RunReport`] gathers every change record of one run plus a bounded
//! excerpt of diff rows per `CHANGED` target, read back from the change log.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{AlertConfig, ChangeFlag, ChangeRecord, DiffEntry};
use crate::services::AlertTransport;
use crate::storage::ChangeLog;
use crate::utils::excerpt;

const SEPARATOR: &str = "----------------------------------------";

/// A shortened diff row for alert bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffExcerpt {
    pub target_name: String,
    pub line_no: usize,
    pub before: String,
    pub after: String,
}

/// Everything an alert transport needs about one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_time: DateTime<Utc>,
    pub records: Vec<ChangeRecord>,
    pub excerpts: Vec<DiffExcerpt>,
    include_blocked: bool,
}

impl RunReport {
    /// Build a report from a run's records and diff rows.
    ///
    /// Keeps the last `excerpt_rows` rows of each changed target, each field
    /// cut to `excerpt_chars` characters.
    pub fn new(
        run_time: DateTime<Utc>,
        records: Vec<ChangeRecord>,
        diffs: &[DiffEntry],
        config: &AlertConfig,
    ) -> Self {
        let (max_rows, max_chars) = (config.excerpt_rows, config.excerpt_chars);
        let excerpts = records
            .iter()
            .filter(|r| r.flag == ChangeFlag::Changed)
            .flat_map(|r| {
                let rows: Vec<&DiffEntry> = diffs
                    .iter()
                    .filter(|d| d.target_name == r.target_name)
                    .collect();
                let skip = rows.len().saturating_sub(max_rows);
                rows.into_iter().skip(skip).map(move |d| DiffExcerpt {
                    target_name: d.target_name.clone(),
                    line_no: d.row.line_no,
                    before: excerpt(&d.row.before, max_chars).to_string(),
                    after: excerpt(&d.row.after, max_chars).to_string(),
                })
            })
            .collect();

        Self {
            run_time,
            records,
            excerpts,
            include_blocked: config.include_blocked,
        }
    }

    /// Read a run back from the change log.
    pub async fn collect(
        changes: &dyn ChangeLog,
        run_time: DateTime<Utc>,
        config: &AlertConfig,
    ) -> Result<Self> {
        let records = changes.changes_for_run(run_time).await?;
        let diffs = changes.diffs_for_run(run_time).await?;
        Ok(Self::new(run_time, records, &diffs, config))
    }

    pub fn count(&self, flag: ChangeFlag) -> usize {
        self.records.iter().filter(|r| r.flag == flag).count()
    }

    /// Whether the run warrants an alert.
    pub fn needs_alert(&self) -> bool {
        self.count(ChangeFlag::Changed) > 0
            || self.count(ChangeFlag::Error) > 0
            || (self.include_blocked && self.count(ChangeFlag::Blocked) > 0)
    }

    pub fn render_subject(&self) -> String {
        format!("URL Monitor Alert {}", self.run_time.to_rfc3339())
    }

    /// Plain-text alert body.
    pub fn render_text(&self) -> String {
        let mut lines = vec![format!("Run time: {}", self.run_time.to_rfc3339()), String::new()];

        lines.push(format!("Changed targets: {}", self.count(ChangeFlag::Changed)));
        lines.push(format!("Errored targets: {}", self.count(ChangeFlag::Error)));
        if self.include_blocked {
            lines.push(format!("Blocked targets: {}", self.count(ChangeFlag::Blocked)));
        }
        lines.push(String::new());

        let mut sections = vec![(ChangeFlag::Changed, "changes"), (ChangeFlag::Error, "error")];
        if self.include_blocked {
            sections.push((ChangeFlag::Blocked, "reason"));
        }
        for (flag, label) in sections {
            let matching: Vec<&ChangeRecord> =
                self.records.iter().filter(|r| r.flag == flag).collect();
            if matching.is_empty() {
                continue;
            }
            lines.push(flag.to_string());
            for r in matching {
                lines.push(format!("- {}  {}={}  url={}", r.target_name, label, r.detail, r.url));
            }
            lines.push(String::new());
        }

        if !self.excerpts.is_empty() {
            lines.push("DIFF EXCERPTS".to_string());
            for e in &self.excerpts {
                lines.push(format!("Target: {} (line {})", e.target_name, e.line_no));
                lines.push("Before (excerpt):".to_string());
                lines.push(e.before.clone());
                lines.push(String::new());
                lines.push("After (excerpt):".to_string());
                lines.push(e.after.clone());
                lines.push(String::new());
                lines.push(SEPARATOR.to_string());
            }
        }

        lines.join("\n")
    }
}

/// Send a report if it warrants an alert. Returns whether one was sent.
pub async fn deliver(report: &RunReport, transport: &dyn AlertTransport) -> Result<bool> {
    if !report.needs_alert() {
        log::info!("No alert needed for run {}", report.run_time.to_rfc3339());
        return Ok(false);
    }

    transport
        .send(&report.render_subject(), &report.render_text())
        .await?;
    log::info!("Alert sent via {} transport", transport.name());
    Ok(true)
}
