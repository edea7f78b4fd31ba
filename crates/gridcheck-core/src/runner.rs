//! Sequential step execution for a single job.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::action::{ActionOutput, StepAction};
use crate::matrix::JobSpec;
use crate::outcome::{JobOutcome, StepReport};
use crate::scheduler::CancelFlag;
use crate::step::StepSpec;

enum Invocation {
    Completed(ActionOutput),
    TimedOut,
    NotInvocable(String),
}

/// Runs one job's steps in declared order.
pub struct StepRunner;

impl StepRunner {
    /// Execute `job`'s step sequence via `action`.
    ///
    /// Steps run strictly in order. A failing (or timed-out) step marks
    /// the job Failed at its index; if the step halts the job, no later
    /// step runs. The cancellation flag is checked before each step: once
    /// set, the current step is allowed to finish but no new step starts.
    /// Diagnostic output is retained for every executed step, pass or
    /// fail.
    pub async fn run_job(job: &JobSpec, action: &dyn StepAction, cancel: &CancelFlag) -> JobOutcome {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(job.steps.len());
        let mut failed_step: Option<usize> = None;
        let mut cancelled = false;

        for (index, step) in job.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(job = %job.id, step = %step.name, "cancellation requested, no new step starts");
                cancelled = true;
                break;
            }

            debug!(job = %job.id, step = %step.name, "running step");
            let step_start = Instant::now();
            let invocation = Self::invoke(job, step, action).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            let report = match invocation {
                Invocation::Completed(output) => StepReport {
                    step_name: step.name.clone(),
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    duration_ms,
                    success: output.success,
                },
                Invocation::TimedOut => StepReport {
                    step_name: step.name.clone(),
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!(
                        "step '{}' timed out after {} seconds",
                        step.name, step.timeout_secs
                    ),
                    duration_ms,
                    success: false,
                },
                Invocation::NotInvocable(error) => StepReport {
                    step_name: step.name.clone(),
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: error,
                    duration_ms,
                    success: false,
                },
            };

            let success = report.success;
            reports.push(report);

            if !success {
                warn!(job = %job.id, step = %step.name, index, "step failed");
                if failed_step.is_none() {
                    failed_step = Some(index);
                }
                if step.halts_job {
                    break;
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match failed_step {
            Some(index) => JobOutcome::failed(index, reports, duration_ms),
            None if cancelled && reports.is_empty() => {
                JobOutcome::skipped("cancelled before the job started")
            }
            None => JobOutcome::passed(reports, duration_ms),
        }
    }

    /// Invoke the action, enforcing the step timeout.
    ///
    /// Exceeding the timeout is identical to the step signaling failure,
    /// not a distinct error kind.
    async fn invoke(job: &JobSpec, step: &StepSpec, action: &dyn StepAction) -> Invocation {
        let invocation = action.run(job, step);

        let result = if step.timeout_secs > 0 {
            match tokio::time::timeout(Duration::from_secs(step.timeout_secs), invocation).await {
                Ok(result) => result,
                Err(_) => return Invocation::TimedOut,
            }
        } else {
            invocation.await
        };

        match result {
            Ok(output) => Invocation::Completed(output),
            Err(e) => Invocation::NotInvocable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedAction;
    use crate::matrix::{expand, Axis};

    fn job_with_steps(steps: Vec<StepSpec>) -> JobSpec {
        let axes = vec![Axis::new("platform", &["local"])];
        expand("matrix", &axes, &steps)
            .expect("expand")
            .into_iter()
            .next()
            .expect("job")
    }

    fn step(name: &str) -> StepSpec {
        StepSpec::new(name, vec!["unused".to_string()])
    }

    #[tokio::test]
    async fn test_all_steps_pass() {
        let job = job_with_steps(vec![step("check"), step("test")]);
        let action = ScriptedAction::all_pass();
        let outcome = StepRunner::run_job(&job, &action, &CancelFlag::new()).await;

        assert!(!outcome.is_failed());
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps.iter().all(|s| s.success));
    }

    #[tokio::test]
    async fn test_halting_failure_short_circuits() {
        let job = job_with_steps(vec![step("check"), step("test"), step("doc")]);
        let action = ScriptedAction::all_pass().fail_step("test");
        let outcome = StepRunner::run_job(&job, &action, &CancelFlag::new()).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.failed_step, Some(1));
        assert_eq!(outcome.steps.len(), 2, "step after the failure never ran");

        let invoked: Vec<_> = action
            .invocations()
            .into_iter()
            .map(|(_, step)| step)
            .collect();
        assert_eq!(invoked, vec!["check", "test"]);
    }

    #[tokio::test]
    async fn test_non_halting_failure_runs_later_steps() {
        let job = job_with_steps(vec![step("fmt").non_halting(), step("doc")]);
        let action = ScriptedAction::all_pass().fail_step("fmt");
        let outcome = StepRunner::run_job(&job, &action, &CancelFlag::new()).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.failed_step, Some(0));
        assert_eq!(outcome.steps.len(), 2, "doc still ran for its diagnostics");
        assert!(outcome.steps[1].success);
    }

    #[tokio::test]
    async fn test_diagnostics_are_captured_on_success() {
        let job = job_with_steps(vec![step("fmt")]);
        let action = ScriptedAction::all_pass();
        let outcome = StepRunner::run_job(&job, &action, &CancelFlag::new()).await;

        assert!(!outcome.steps[0].stdout.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_behaves_like_step_failure() {
        let job = job_with_steps(vec![step("check").with_timeout(2), step("test")]);
        let action = ScriptedAction::all_pass().sleep_step("check", 10_000);
        let outcome = StepRunner::run_job(&job, &action, &CancelFlag::new()).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.failed_step, Some(0));
        assert_eq!(outcome.steps.len(), 1);
        assert!(outcome.steps[0].stderr.contains("timed out"));
        assert_eq!(outcome.steps[0].exit_code, -1);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_step() {
        let job = job_with_steps(vec![step("check"), step("test")]);
        let action = ScriptedAction::all_pass();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = StepRunner::run_job(&job, &action, &cancel).await;

        assert!(outcome.steps.is_empty());
        assert_eq!(outcome.status, crate::outcome::OutcomeStatus::Skipped);
        assert!(action.invocations().is_empty());
    }
}
