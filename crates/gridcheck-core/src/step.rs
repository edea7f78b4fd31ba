//! Verification step definitions and builtin Cargo presets.

use serde::{Deserialize, Serialize};

fn default_halts() -> bool {
    true
}

/// One ordered unit of verification within a job.
///
/// The command is an argv vector (first element is the executable). A
/// `timeout_secs` of 0 means no limit. Steps marked `takes_axis_args`
/// receive the extra arguments of every axis value the enclosing job
/// selected, appended at expansion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepSpec {
    /// Human-readable step name.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Timeout in seconds (0 = unlimited).
    #[serde(default)]
    pub timeout_secs: u64,

    /// Whether a failure stops the remaining steps of the job.
    #[serde(default = "default_halts")]
    pub halts_job: bool,

    /// Whether axis value arguments are appended to the command.
    #[serde(default)]
    pub takes_axis_args: bool,
}

impl StepSpec {
    /// Create a step with no timeout that halts its job on failure.
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs: 0,
            halts_job: true,
            takes_axis_args: false,
        }
    }

    /// Set the step timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Append the job's axis value arguments to this step's command.
    pub fn with_axis_args(mut self) -> Self {
        self.takes_axis_args = true;
        self
    }

    /// Let later steps run even when this one fails.
    pub fn non_halting(mut self) -> Self {
        self.halts_job = false;
        self
    }
}

/// Builtin verification steps for a Cargo workspace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStep {
    /// cargo check --workspace
    CargoCheck,

    /// cargo test --workspace
    CargoTest,

    /// cargo fmt --all -- --check
    CargoFmt,

    /// cargo doc --workspace --no-deps
    CargoDoc,
}

impl BuiltinStep {
    /// Get the step name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStep::CargoCheck => "cargo_check",
            BuiltinStep::CargoTest => "cargo_test",
            BuiltinStep::CargoFmt => "cargo_fmt",
            BuiltinStep::CargoDoc => "cargo_doc",
        }
    }

    /// Get the step's command.
    pub fn command(&self) -> Vec<String> {
        match self {
            BuiltinStep::CargoCheck => {
                vec!["cargo".to_string(), "check".to_string(), "--workspace".to_string()]
            }
            BuiltinStep::CargoTest => {
                vec!["cargo".to_string(), "test".to_string(), "--workspace".to_string()]
            }
            BuiltinStep::CargoFmt => {
                vec![
                    "cargo".to_string(),
                    "fmt".to_string(),
                    "--all".to_string(),
                    "--".to_string(),
                    "--check".to_string(),
                ]
            }
            BuiltinStep::CargoDoc => {
                vec![
                    "cargo".to_string(),
                    "doc".to_string(),
                    "--workspace".to_string(),
                    "--no-deps".to_string(),
                ]
            }
        }
    }

    /// Build a [`StepSpec`] from this builtin.
    ///
    /// Check and test steps take axis arguments (the feature-set axis
    /// contributes cargo flags); fmt and doc run the project as declared.
    pub fn spec(&self, timeout_secs: u64) -> StepSpec {
        let spec = StepSpec::new(self.name(), self.command()).with_timeout(timeout_secs);
        match self {
            BuiltinStep::CargoCheck | BuiltinStep::CargoTest => spec.with_axis_args(),
            BuiltinStep::CargoFmt | BuiltinStep::CargoDoc => spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_step_names() {
        assert_eq!(BuiltinStep::CargoCheck.name(), "cargo_check");
        assert_eq!(BuiltinStep::CargoTest.name(), "cargo_test");
        assert_eq!(BuiltinStep::CargoFmt.name(), "cargo_fmt");
        assert_eq!(BuiltinStep::CargoDoc.name(), "cargo_doc");
    }

    #[test]
    fn test_builtin_step_commands() {
        let check = BuiltinStep::CargoCheck.command();
        assert_eq!(check[0], "cargo");
        assert!(check.contains(&"check".to_string()));

        let fmt = BuiltinStep::CargoFmt.command();
        assert!(fmt.contains(&"--check".to_string()));
    }

    #[test]
    fn test_builtin_spec_axis_args_classification() {
        assert!(BuiltinStep::CargoCheck.spec(60).takes_axis_args);
        assert!(BuiltinStep::CargoTest.spec(60).takes_axis_args);
        assert!(!BuiltinStep::CargoFmt.spec(60).takes_axis_args);
        assert!(!BuiltinStep::CargoDoc.spec(60).takes_axis_args);
    }

    #[test]
    fn test_step_spec_builders() {
        let step = StepSpec::new("lint", vec!["cargo".to_string(), "clippy".to_string()])
            .with_timeout(120)
            .non_halting();
        assert_eq!(step.name, "lint");
        assert_eq!(step.timeout_secs, 120);
        assert!(!step.halts_job);
        assert!(!step.takes_axis_args);
    }

    #[test]
    fn test_step_spec_halts_by_default() {
        let step = StepSpec::new("check", vec!["true".to_string()]);
        assert!(step.halts_job);
        assert_eq!(step.timeout_secs, 0);
    }

    #[test]
    fn test_step_spec_deserialize_defaults() {
        let step: StepSpec =
            serde_json::from_str(r#"{"name":"check","command":["cargo","check"]}"#)
                .expect("deserialize");
        assert!(step.halts_job);
        assert_eq!(step.timeout_secs, 0);
        assert!(!step.takes_axis_args);
    }
}
