//! Job outcomes and per-step reports.

use serde::{Deserialize, Serialize};

/// Terminal status of one job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every step succeeded.
    Passed,

    /// At least one step failed or timed out.
    Failed,

    /// The job never ran: its environment could not be prepared, or the
    /// run was cancelled before the job started.
    Skipped,
}

/// Captured result of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepReport {
    /// Step name.
    pub step_name: String,

    /// Exit code (0 = success, -1 when the action could not report one).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the step succeeded.
    pub success: bool,
}

/// Result of running one [`JobSpec`](crate::matrix::JobSpec).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobOutcome {
    /// Terminal status.
    pub status: OutcomeStatus,

    /// Index of the first failing step (absent for Passed and Skipped).
    pub failed_step: Option<usize>,

    /// Reports for the steps that actually ran, in declared order.
    pub steps: Vec<StepReport>,

    /// Why the job was skipped (absent otherwise).
    pub skip_reason: Option<String>,

    /// Wall-clock duration of the whole job in milliseconds.
    pub duration_ms: u64,
}

impl JobOutcome {
    /// All steps succeeded.
    pub fn passed(steps: Vec<StepReport>, duration_ms: u64) -> Self {
        Self {
            status: OutcomeStatus::Passed,
            failed_step: None,
            steps,
            skip_reason: None,
            duration_ms,
        }
    }

    /// A step failed; `failed_step` is the index of the first failure.
    pub fn failed(failed_step: usize, steps: Vec<StepReport>, duration_ms: u64) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            failed_step: Some(failed_step),
            steps,
            skip_reason: None,
            duration_ms,
        }
    }

    /// The job never ran.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            failed_step: None,
            steps: Vec::new(),
            skip_reason: Some(reason.into()),
            duration_ms: 0,
        }
    }

    /// Whether this outcome fails the overall verdict.
    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, success: bool) -> StepReport {
        StepReport {
            step_name: name.to_string(),
            exit_code: if success { 0 } else { 101 },
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 10,
            success,
        }
    }

    #[test]
    fn test_passed_outcome_has_no_failing_step() {
        let outcome = JobOutcome::passed(vec![report("check", true)], 10);
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        assert!(outcome.failed_step.is_none());
        assert!(!outcome.is_failed());
    }

    #[test]
    fn test_failed_outcome_records_first_failing_index() {
        let steps = vec![report("check", true), report("test", false)];
        let outcome = JobOutcome::failed(1, steps, 20);
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.failed_step, Some(1));
        assert!(outcome.is_failed());
    }

    #[test]
    fn test_skipped_outcome_carries_reason_and_no_steps() {
        let outcome = JobOutcome::skipped("toolchain unavailable");
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert!(outcome.failed_step.is_none());
        assert!(outcome.steps.is_empty());
        assert_eq!(outcome.skip_reason.as_deref(), Some("toolchain unavailable"));
        assert!(!outcome.is_failed());
    }

    #[test]
    fn test_outcome_serde_roundtrip() {
        let outcome = JobOutcome::failed(0, vec![report("check", false)], 42);
        let json = serde_json::to_string(&outcome).expect("serialize");
        let deserialized: JobOutcome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(outcome, deserialized);
    }
}
