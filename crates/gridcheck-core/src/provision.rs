//! Toolchain provisioning: prepares a job's execution environment.
//!
//! Provisioning is an external capability. The scheduler consults it once
//! per job, before any step runs; a refusal marks the job Skipped rather
//! than Failed, keeping environment problems visibly distinct from build
//! breakage in the report.

use async_trait::async_trait;

use crate::matrix::JobSpec;

/// Result of asking for a job's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provision {
    /// The environment is ready; steps may run.
    Ready,

    /// The environment cannot be prepared; the job is skipped.
    Unavailable {
        /// Human-readable reason, surfaced in the report.
        reason: String,
    },
}

/// Makes the toolchain a job requests available before its steps run.
#[async_trait]
pub trait ToolchainProvisioner: Send + Sync {
    /// Prepare the environment for `job`.
    async fn provision(&self, job: &JobSpec) -> Provision;
}

/// Assumes the ambient environment already has every requested toolchain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvToolchain;

#[async_trait]
impl ToolchainProvisioner for EnvToolchain {
    async fn provision(&self, _job: &JobSpec) -> Provision {
        Provision::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{expand, Axis};
    use crate::step::StepSpec;

    #[tokio::test]
    async fn test_env_toolchain_is_always_ready() {
        let axes = vec![Axis::new("toolchain", &["stable"])];
        let steps = vec![StepSpec::new("check", vec!["true".to_string()])];
        let jobs = expand("matrix", &axes, &steps).expect("expand");

        let provisioner = EnvToolchain;
        assert_eq!(provisioner.provision(&jobs[0]).await, Provision::Ready);
    }
}
