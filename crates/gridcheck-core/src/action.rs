//! Step action execution: the collaborator that runs one verification
//! action in a job's environment and reports success plus captured text.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::matrix::JobSpec;
use crate::step::StepSpec;

/// Captured result of one action invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutput {
    /// Exit code (0 = success, -1 when unavailable).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Whether the action succeeded.
    pub success: bool,
}

impl ActionOutput {
    /// A successful invocation with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    /// A failed invocation with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

/// Runs one verification action for a job.
///
/// The only operation the step runner invokes. Implementations report a
/// failing command through [`ActionOutput::success`]; an `Err` means the
/// action could not be invoked at all (e.g. spawn failure) and is treated
/// like a failing step by the runner.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Execute `step` in `job`'s environment.
    async fn run(&self, job: &JobSpec, step: &StepSpec) -> anyhow::Result<ActionOutput>;
}

/// Spawns step commands as local processes with piped stdio.
///
/// The job's axis selections are exported as `GRIDCHECK_<AXIS>` environment
/// variables so commands can vary on them without parsing their own argv.
#[derive(Debug, Clone)]
pub struct ProcessAction {
    workdir: PathBuf,
}

impl ProcessAction {
    /// Run commands inside `workdir` (the checked-out project tree).
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl StepAction for ProcessAction {
    async fn run(&self, job: &JobSpec, step: &StepSpec) -> anyhow::Result<ActionOutput> {
        if step.command.is_empty() {
            anyhow::bail!("step '{}' has an empty command", step.name);
        }

        let exe = &step.command[0];
        let args = &step.command[1..];

        let mut cmd = Command::new(exe);
        cmd.args(args)
            .current_dir(&self.workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (axis, value) in &job.selections {
            cmd.env(format!("GRIDCHECK_{}", axis.to_uppercase()), value);
        }

        let child = cmd.spawn()?;
        let output = child.wait_with_output().await?;

        Ok(ActionOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }
}
