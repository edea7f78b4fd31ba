//! Error types for the orchestrator core.

use thiserror::Error;

/// Errors that abort expansion or scheduling.
///
/// Step failures and toolchain unavailability are deliberately absent:
/// they are contained at the job boundary and recorded on the job's
/// [`JobOutcome`](crate::outcome::JobOutcome) instead of propagating.
#[derive(Error, Debug)]
pub enum GridError {
    /// Malformed axis or step declarations. Fatal: no jobs run.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The scheduler could not dispatch or join a job.
    #[error("job '{job}' was not dispatched")]
    Scheduling {
        /// Identity of the job that was lost.
        job: String,
    },

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
