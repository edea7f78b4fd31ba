//! Bounded-parallelism job scheduling and outcome collection.
//!
//! One tokio task per job, gated by a semaphore sized to the configured
//! maximum concurrency. Jobs are fully independent of one another; steps
//! inside a job stay strictly sequential. The scheduler joins every task
//! before returning, so the outcome map is always complete.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::action::StepAction;
use crate::error::GridError;
use crate::matrix::{JobId, JobSpec};
use crate::outcome::JobOutcome;
use crate::provision::{Provision, ToolchainProvisioner};
use crate::runner::StepRunner;

/// Cooperative cancellation flag shared across a run.
///
/// Setting it lets in-flight jobs finish their current step; no new step
/// starts, and jobs that have not been dispatched are marked Skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs job specifications concurrently and collects one outcome per job.
pub struct JobScheduler {
    max_concurrency: usize,
}

impl JobScheduler {
    /// Scheduler with at most `max_concurrency` jobs in flight (minimum 1).
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run every job and return the identity-to-outcome mapping.
    ///
    /// The mapping has exactly one entry per submitted job (write-once per
    /// key). Before a job's first step, the toolchain provisioner prepares
    /// its environment; unavailability yields a Skipped outcome and the
    /// step runner is never invoked. A job that cannot be dispatched or
    /// joined fails the run with [`GridError::Scheduling`] naming it.
    pub async fn run(
        &self,
        jobs: &[JobSpec],
        provisioner: Arc<dyn ToolchainProvisioner>,
        action: Arc<dyn StepAction>,
        cancel: &CancelFlag,
    ) -> Result<BTreeMap<JobId, JobOutcome>, GridError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut ids = Vec::with_capacity(jobs.len());
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let provisioner = Arc::clone(&provisioner);
            let action = Arc::clone(&action);
            let cancel = cancel.clone();

            ids.push(job.id.clone());
            handles.push(tokio::spawn(async move {
                // The semaphore is never closed; a failed acquire means the
                // job cannot be dispatched at all.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };

                if cancel.is_cancelled() {
                    info!(job = %job.id, "cancelled before dispatch, skipping");
                    return Some(JobOutcome::skipped("cancelled before the job started"));
                }

                match provisioner.provision(&job).await {
                    Provision::Ready => {}
                    Provision::Unavailable { reason } => {
                        warn!(job = %job.id, %reason, "toolchain unavailable, skipping job");
                        return Some(JobOutcome::skipped(reason));
                    }
                }

                info!(job = %job.id, "running job");
                Some(StepRunner::run_job(&job, action.as_ref(), &cancel).await)
            }));
        }

        let mut outcomes = BTreeMap::new();
        for (id, joined) in ids.into_iter().zip(join_all(handles).await) {
            let outcome = match joined {
                Ok(Some(outcome)) => outcome,
                Ok(None) | Err(_) => {
                    return Err(GridError::Scheduling {
                        job: id.to_string(),
                    })
                }
            };
            if outcomes.insert(id.clone(), outcome).is_some() {
                // Write-once violated: two jobs claimed the same identity.
                return Err(GridError::Scheduling {
                    job: id.to_string(),
                });
            }
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedAction, UnavailableToolchain};
    use crate::matrix::{expand, Axis};
    use crate::outcome::OutcomeStatus;
    use crate::provision::EnvToolchain;
    use crate::step::StepSpec;

    fn matrix_jobs(platforms: &[&str], features: &[&str]) -> Vec<JobSpec> {
        let axes = vec![
            Axis::new("platform", platforms),
            Axis::new("features", features),
        ];
        let steps = vec![
            StepSpec::new("check", vec!["unused".to_string()]),
            StepSpec::new("test", vec!["unused".to_string()]),
        ];
        expand("matrix", &axes, &steps).expect("expand")
    }

    #[tokio::test]
    async fn test_one_outcome_per_submitted_job() {
        let jobs = matrix_jobs(&["a", "b", "c"], &["default", "no_std", "alloc", "full"]);
        let scheduler = JobScheduler::new(2);
        let outcomes = scheduler
            .run(
                &jobs,
                Arc::new(EnvToolchain),
                Arc::new(ScriptedAction::all_pass()),
                &CancelFlag::new(),
            )
            .await
            .expect("run");

        assert_eq!(outcomes.len(), jobs.len());
        for job in &jobs {
            assert!(outcomes.contains_key(&job.id), "missing {}", job.id);
        }
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_respected() {
        let jobs = matrix_jobs(&["a", "b"], &["w", "x", "y", "z"]);
        let action = Arc::new(ScriptedAction::all_pass().sleep_all(20));
        let scheduler = JobScheduler::new(2);
        scheduler
            .run(
                &jobs,
                Arc::new(EnvToolchain),
                Arc::clone(&action) as Arc<dyn StepAction>,
                &CancelFlag::new(),
            )
            .await
            .expect("run");

        assert!(
            action.max_in_flight() <= 2,
            "observed {} jobs in flight",
            action.max_in_flight()
        );
    }

    #[tokio::test]
    async fn test_unavailable_toolchain_skips_job() {
        let jobs = matrix_jobs(&["a", "b"], &["default"]);
        let provisioner = Arc::new(UnavailableToolchain::for_value("b", "no runner for b"));
        let scheduler = JobScheduler::new(4);
        let outcomes = scheduler
            .run(
                &jobs,
                provisioner,
                Arc::new(ScriptedAction::all_pass()),
                &CancelFlag::new(),
            )
            .await
            .expect("run");

        let skipped: Vec<_> = outcomes
            .iter()
            .filter(|(_, o)| o.status == OutcomeStatus::Skipped)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].0.as_str().contains("platform=b"));
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_every_unstarted_job() {
        let jobs = matrix_jobs(&["a", "b"], &["default", "no_std"]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let scheduler = JobScheduler::new(2);
        let outcomes = scheduler
            .run(
                &jobs,
                Arc::new(EnvToolchain),
                Arc::new(ScriptedAction::all_pass()),
                &cancel,
            )
            .await
            .expect("run");

        assert_eq!(outcomes.len(), jobs.len(), "no job silently dropped");
        assert!(outcomes
            .values()
            .all(|o| o.status == OutcomeStatus::Skipped));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let jobs = matrix_jobs(&["a"], &["default"]);
        let scheduler = JobScheduler::new(0);
        let outcomes = scheduler
            .run(
                &jobs,
                Arc::new(EnvToolchain),
                Arc::new(ScriptedAction::all_pass()),
                &CancelFlag::new(),
            )
            .await
            .expect("run");
        assert_eq!(outcomes.len(), 1);
    }
}
