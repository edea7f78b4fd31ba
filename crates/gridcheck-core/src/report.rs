//! Report aggregation and rendering.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GridError;
use crate::matrix::{JobId, JobSpec};
use crate::outcome::{JobOutcome, OutcomeStatus};

/// One (identity, outcome) row of the final report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEntry {
    /// Job identity.
    pub job: JobId,

    /// Family the job was expanded from.
    pub family: String,

    /// What happened.
    pub outcome: JobOutcome,
}

/// Final aggregated result of a verification run.
///
/// Entries appear in the Matrix Expander's enumeration order, so two runs
/// against the same configuration produce diffable reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Unique id of this run.
    pub run_id: Uuid,

    /// Digest of the configuration that produced the run.
    pub config_digest: String,

    /// Overall verdict: false iff at least one job Failed.
    pub passed: bool,

    /// Per-job outcomes in expansion order.
    pub entries: Vec<ReportEntry>,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When aggregation completed.
    pub finished_at: DateTime<Utc>,
}

impl Report {
    /// Build a report from the collected outcomes.
    ///
    /// Consumes one outcome per submitted job, in expansion order. A
    /// missing outcome means the scheduler lost a job and is reported as
    /// [`GridError::Scheduling`], never as a silently shorter report.
    pub fn from_outcomes(
        run_id: Uuid,
        config_digest: String,
        jobs: &[JobSpec],
        mut outcomes: BTreeMap<JobId, JobOutcome>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, GridError> {
        let mut entries = Vec::with_capacity(jobs.len());
        for job in jobs {
            let outcome = outcomes
                .remove(&job.id)
                .ok_or_else(|| GridError::Scheduling {
                    job: job.id.to_string(),
                })?;
            entries.push(ReportEntry {
                job: job.id.clone(),
                family: job.family.clone(),
                outcome,
            });
        }

        let passed = !entries.iter().any(|e| e.outcome.is_failed());

        Ok(Self {
            run_id,
            config_digest,
            passed,
            entries,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Number of jobs that passed.
    pub fn passed_count(&self) -> usize {
        self.count(OutcomeStatus::Passed)
    }

    /// Number of jobs that failed.
    pub fn failed_count(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    /// Number of jobs that were skipped.
    pub fn skipped_count(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.status == status)
            .count()
    }

    /// Human-readable console summary.
    pub fn render(&self) -> String {
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        let digest = &self.config_digest[..12.min(self.config_digest.len())];
        let mut out = String::new();
        let _ = writeln!(out, "gridcheck {} {}", digest, verdict);

        for entry in &self.entries {
            match entry.outcome.status {
                OutcomeStatus::Passed => {
                    let _ = writeln!(
                        out,
                        "  PASS  {}  ({} ms)",
                        entry.job, entry.outcome.duration_ms
                    );
                }
                OutcomeStatus::Failed => {
                    let detail = entry
                        .outcome
                        .failed_step
                        .and_then(|i| entry.outcome.steps.get(i))
                        .map(|s| format!("step '{}' (exit {})", s.step_name, s.exit_code))
                        .unwrap_or_else(|| "unknown step".to_string());
                    let _ = writeln!(out, "  FAIL  {}  {}", entry.job, detail);
                }
                OutcomeStatus::Skipped => {
                    let reason = entry
                        .outcome
                        .skip_reason
                        .as_deref()
                        .unwrap_or("environment unavailable");
                    let _ = writeln!(out, "  SKIP  {}  {}", entry.job, reason);
                }
            }
        }

        let _ = write!(
            out,
            "{} passed, {} failed, {} skipped",
            self.passed_count(),
            self.failed_count(),
            self.skipped_count()
        );
        out
    }
}
