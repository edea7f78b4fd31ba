//! End-to-end verification runs.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::action::StepAction;
use crate::config::VerifyConfig;
use crate::error::GridError;
use crate::provision::ToolchainProvisioner;
use crate::report::Report;
use crate::scheduler::{CancelFlag, JobScheduler};

/// Runs a whole verification: expansion, scheduling, aggregation.
pub struct VerifyRun;

impl VerifyRun {
    /// Execute `config` against the given collaborators.
    ///
    /// A malformed configuration aborts before any job starts. Otherwise
    /// every expanded job is run (or skipped) and the returned report
    /// covers all of them, whatever the verdict.
    pub async fn execute(
        config: &VerifyConfig,
        provisioner: Arc<dyn ToolchainProvisioner>,
        action: Arc<dyn StepAction>,
        cancel: &CancelFlag,
    ) -> Result<Report, GridError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let jobs = config.expand_jobs()?;
        let concurrency = config
            .max_concurrency
            .unwrap_or_else(|| config.default_concurrency());

        info!(
            run_id = %run_id,
            jobs = jobs.len(),
            concurrency,
            "starting verification run"
        );

        let scheduler = JobScheduler::new(concurrency);
        let outcomes = scheduler.run(&jobs, provisioner, action, cancel).await?;
        let report = Report::from_outcomes(run_id, config.digest(), &jobs, outcomes, started_at)?;

        info!(
            run_id = %run_id,
            passed = report.passed,
            failed_jobs = report.failed_count(),
            skipped_jobs = report.skipped_count(),
            "verification run finished"
        );

        Ok(report)
    }
}
