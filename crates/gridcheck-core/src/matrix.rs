//! Matrix expansion: axes into concrete job specifications.
//!
//! An axis is a named dimension of variation (platform, toolchain channel,
//! feature set). Expansion takes the Cartesian product of every axis value
//! and renders one [`JobSpec`] per combination, in an order that is stable
//! across runs so reports stay diffable.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::step::StepSpec;

/// One selectable value on an axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AxisValue {
    /// Identity of the value within its axis (e.g. "no_std").
    pub label: String,

    /// Extra command arguments contributed to steps of jobs selecting
    /// this value.
    #[serde(default)]
    pub args: Vec<String>,
}

impl AxisValue {
    /// A value that contributes no command arguments.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            args: Vec::new(),
        }
    }

    /// A value that appends `args` to axis-aware step commands.
    pub fn with_args(label: impl Into<String>, args: &[&str]) -> Self {
        Self {
            label: label.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A named dimension of variation with an ordered set of values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Axis {
    /// Axis name, unique within its family.
    pub name: String,

    /// Possible values, in declaration order.
    pub values: Vec<AxisValue>,
}

impl Axis {
    /// Create an axis from plain value labels.
    pub fn new(name: impl Into<String>, labels: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: labels.iter().map(|l| AxisValue::new(*l)).collect(),
        }
    }

    /// Create an axis from prepared values.
    pub fn with_values(name: impl Into<String>, values: Vec<AxisValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Identity of one job: the family name plus the tuple of selected axis
/// values, rendered as `family/axis=value,axis=value`.
///
/// Ordering follows the rendered string, which is stable because axis
/// declaration order is part of the identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(String);

impl JobId {
    fn render(family: &str, selections: &[(String, String)]) -> Self {
        if selections.is_empty() {
            return JobId(family.to_string());
        }
        let tuple = selections
            .iter()
            .map(|(axis, value)| format!("{}={}", axis, value))
            .collect::<Vec<_>>()
            .join(",");
        JobId(format!("{}/{}", family, tuple))
    }

    /// The rendered identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One concrete combination of axis values plus its step sequence.
///
/// Immutable once created; identity is the tuple of axis values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSpec {
    /// Stable identity of this job.
    pub id: JobId,

    /// Family this job was expanded from.
    pub family: String,

    /// (axis name, value label) pairs in axis declaration order.
    pub selections: Vec<(String, String)>,

    /// Steps with commands fully rendered for this combination.
    pub steps: Vec<StepSpec>,
}

impl JobSpec {
    /// Look up the selected value label for an axis.
    pub fn value_of(&self, axis: &str) -> Option<&str> {
        self.selections
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, label)| label.as_str())
    }

    /// Whether any axis of this job selected the given value label.
    pub fn selects(&self, label: &str) -> bool {
        self.selections.iter().any(|(_, value)| value == label)
    }
}

/// Expand one family into the full Cartesian product of its axis values.
///
/// Fails with [`GridError::Configuration`] on an empty axis, a duplicate
/// axis name, or an empty step list. The result has exactly
/// `c1 x c2 x ... x cn` jobs (a family with no axes yields a single job
/// with an empty selection tuple), enumerated lexicographically over axis
/// declaration order and value order within each axis. Step commands are
/// rendered per job: every selected value's extra arguments are appended,
/// in axis order, to steps that take axis arguments.
pub fn expand(
    family: &str,
    axes: &[Axis],
    steps: &[StepSpec],
) -> Result<Vec<JobSpec>, GridError> {
    validate(family, axes, steps)?;

    let mut combos: Vec<Vec<&AxisValue>> = vec![Vec::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(combos.len() * axis.values.len());
        for prefix in &combos {
            for value in &axis.values {
                let mut combo = prefix.clone();
                combo.push(value);
                next.push(combo);
            }
        }
        combos = next;
    }

    let jobs = combos
        .into_iter()
        .map(|combo| {
            let selections: Vec<(String, String)> = axes
                .iter()
                .zip(&combo)
                .map(|(axis, value)| (axis.name.clone(), value.label.clone()))
                .collect();

            let steps = steps
                .iter()
                .map(|step| {
                    let mut rendered = step.clone();
                    if step.takes_axis_args {
                        for value in &combo {
                            rendered.command.extend(value.args.iter().cloned());
                        }
                    }
                    rendered
                })
                .collect();

            JobSpec {
                id: JobId::render(family, &selections),
                family: family.to_string(),
                selections,
                steps,
            }
        })
        .collect();

    Ok(jobs)
}

fn validate(family: &str, axes: &[Axis], steps: &[StepSpec]) -> Result<(), GridError> {
    if family.is_empty() {
        return Err(GridError::Configuration(
            "job family name must not be empty".to_string(),
        ));
    }
    if steps.is_empty() {
        return Err(GridError::Configuration(format!(
            "family '{}' declares no steps",
            family
        )));
    }

    let mut seen = HashSet::new();
    for axis in axes {
        if axis.values.is_empty() {
            return Err(GridError::Configuration(format!(
                "axis '{}' in family '{}' has no values",
                axis.name, family
            )));
        }
        if !seen.insert(axis.name.as_str()) {
            return Err(GridError::Configuration(format!(
                "duplicate axis '{}' in family '{}'",
                axis.name, family
            )));
        }
    }

    Ok(())
}
