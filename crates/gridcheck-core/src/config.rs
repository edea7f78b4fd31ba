//! Declarative run configuration and identity.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::GridError;
use crate::matrix::{self, Axis, AxisValue, JobSpec};
use crate::step::{BuiltinStep, StepSpec};

/// One job family: a set of axes and the steps every job in the family
/// runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FamilyConfig {
    /// Family name, unique within the configuration.
    pub name: String,

    /// Axes of variation. A family with no axes yields a single job.
    #[serde(default)]
    pub axes: Vec<Axis>,

    /// Ordered step sequence, shared by every job in the family.
    pub steps: Vec<StepSpec>,
}

impl FamilyConfig {
    /// Create a family.
    pub fn new(name: impl Into<String>, axes: Vec<Axis>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            axes,
            steps,
        }
    }
}

/// Full declarative description of a verification run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyConfig {
    /// Job families, expanded and scheduled together.
    pub families: Vec<FamilyConfig>,

    /// Maximum concurrent jobs. When absent, the platform-axis
    /// cardinality is used (platform execution is the real isolation
    /// boundary).
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl VerifyConfig {
    /// Configuration with the given families and default concurrency.
    pub fn new(families: Vec<FamilyConfig>) -> Self {
        Self {
            families,
            max_concurrency: None,
        }
    }

    /// The standard matrix for a Rust library: three platforms, the
    /// stable toolchain, and four feature sets run (check, test); a
    /// separate hygiene family runs (fmt, doc) once.
    pub fn rust_library() -> Self {
        let matrix = FamilyConfig::new(
            "matrix",
            vec![
                Axis::new("platform", &["linux", "macos", "windows"]),
                Axis::new("toolchain", &["stable"]),
                Axis::with_values(
                    "features",
                    vec![
                        AxisValue::new("default"),
                        AxisValue::with_args("no_std", &["--no-default-features"]),
                        AxisValue::with_args(
                            "no_std_alloc",
                            &["--no-default-features", "--features", "alloc"],
                        ),
                        AxisValue::with_args("full_unstable", &["--all-features"]),
                    ],
                ),
            ],
            vec![
                BuiltinStep::CargoCheck.spec(600),
                BuiltinStep::CargoTest.spec(1800),
            ],
        );

        // fmt is non-halting so a formatting diff still produces the doc
        // build's diagnostics in the same run.
        let hygiene = FamilyConfig::new(
            "hygiene",
            Vec::new(),
            vec![
                BuiltinStep::CargoFmt.spec(120).non_halting(),
                BuiltinStep::CargoDoc.spec(600),
            ],
        );

        Self::new(vec![matrix, hygiene])
    }

    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, GridError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, GridError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Expand every family into its jobs, in declaration order.
    ///
    /// Fails with [`GridError::Configuration`] before any job runs when
    /// the declaration is malformed.
    pub fn expand_jobs(&self) -> Result<Vec<JobSpec>, GridError> {
        if self.families.is_empty() {
            return Err(GridError::Configuration(
                "configuration declares no job families".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for family in &self.families {
            if !seen.insert(family.name.as_str()) {
                return Err(GridError::Configuration(format!(
                    "duplicate job family '{}'",
                    family.name
                )));
            }
        }

        let mut jobs = Vec::new();
        for family in &self.families {
            jobs.extend(matrix::expand(&family.name, &family.axes, &family.steps)?);
        }
        Ok(jobs)
    }

    /// Deterministic SHA-256 digest of the ordered declaration.
    ///
    /// Identical configurations hash identically; reordering axes,
    /// values, or steps changes the digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for family in &self.families {
            hasher.update(family.name.as_bytes());
            hasher.update(b"\0");
            for axis in &family.axes {
                hasher.update(axis.name.as_bytes());
                hasher.update(b"\0");
                for value in &axis.values {
                    hasher.update(value.label.as_bytes());
                    hasher.update(b"\0");
                    for arg in &value.args {
                        hasher.update(arg.as_bytes());
                        hasher.update(b"\0");
                    }
                }
            }
            for step in &family.steps {
                hasher.update(step.name.as_bytes());
                hasher.update(b"\0");
                for arg in &step.command {
                    hasher.update(arg.as_bytes());
                    hasher.update(b"\0");
                }
                hasher.update(step.timeout_secs.to_le_bytes());
                hasher.update([step.halts_job as u8, step.takes_axis_args as u8]);
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Concurrency to use when none is configured: the platform-axis
    /// cardinality, or full parallelism when no family declares one.
    pub fn default_concurrency(&self) -> usize {
        for family in &self.families {
            if let Some(axis) = family.axes.iter().find(|a| a.name == "platform") {
                return axis.values.len().max(1);
            }
        }
        self.families
            .iter()
            .map(|f| {
                f.axes
                    .iter()
                    .map(|a| a.values.len())
                    .product::<usize>()
            })
            .sum::<usize>()
            .max(1)
    }
}
