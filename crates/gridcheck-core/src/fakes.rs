//! Scripted fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedAction` and `UnavailableToolchain` so the runner and
//! scheduler can be exercised without spawning processes or touching a
//! real toolchain.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::action::{ActionOutput, StepAction};
use crate::matrix::{JobId, JobSpec};
use crate::provision::{Provision, ToolchainProvisioner};
use crate::step::StepSpec;

#[derive(Debug, Clone)]
enum Behavior {
    Fail { exit_code: i32 },
    Sleep { ms: u64 },
}

#[derive(Debug, Clone)]
struct Rule {
    /// Axis value labels the job must all select (empty matches every job).
    values: Vec<String>,
    /// Step name (`None` matches every step).
    step: Option<String>,
    behavior: Behavior,
}

impl Rule {
    fn matches(&self, job: &JobSpec, step: &StepSpec) -> bool {
        let values_ok = self.values.iter().all(|v| job.selects(v));
        let step_ok = self.step.as_deref().map_or(true, |s| step.name == s);
        values_ok && step_ok
    }
}

#[derive(Debug, Default)]
struct Gauge {
    current: usize,
    max: usize,
}

/// Decrements the gauge even when the invocation future is dropped
/// (a timed-out step never reaches the code after its sleep).
struct InFlight<'a>(&'a Mutex<Gauge>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut gauge) = self.0.lock() {
            gauge.current -= 1;
        }
    }
}

/// Scripted step action: passes everything unless a rule says otherwise.
///
/// Records every invocation so tests can assert ordering and
/// short-circuiting, and tracks the maximum number of concurrently
/// in-flight invocations for concurrency-bound assertions.
#[derive(Debug)]
pub struct ScriptedAction {
    rules: Vec<Rule>,
    invocations: Mutex<Vec<(JobId, String)>>,
    gauge: Mutex<Gauge>,
}

impl ScriptedAction {
    /// An action where every step succeeds.
    pub fn all_pass() -> Self {
        Self {
            rules: Vec::new(),
            invocations: Mutex::new(Vec::new()),
            gauge: Mutex::new(Gauge::default()),
        }
    }

    /// Fail the named step for every job.
    pub fn fail_step(mut self, step: &str) -> Self {
        self.rules.push(Rule {
            values: Vec::new(),
            step: Some(step.to_string()),
            behavior: Behavior::Fail { exit_code: 101 },
        });
        self
    }

    /// Fail the named step for jobs selecting the given axis value.
    pub fn fail_when(mut self, value: &str, step: &str) -> Self {
        self.rules.push(Rule {
            values: vec![value.to_string()],
            step: Some(step.to_string()),
            behavior: Behavior::Fail { exit_code: 101 },
        });
        self
    }

    /// Fail the named step for jobs selecting all of the given axis
    /// values (one cell of the matrix).
    pub fn fail_when_all(mut self, values: &[&str], step: &str) -> Self {
        self.rules.push(Rule {
            values: values.iter().map(|v| v.to_string()).collect(),
            step: Some(step.to_string()),
            behavior: Behavior::Fail { exit_code: 101 },
        });
        self
    }

    /// Sleep before completing the named step, for every job.
    pub fn sleep_step(mut self, step: &str, ms: u64) -> Self {
        self.rules.push(Rule {
            values: Vec::new(),
            step: Some(step.to_string()),
            behavior: Behavior::Sleep { ms },
        });
        self
    }

    /// Sleep before completing every step of every job.
    pub fn sleep_all(mut self, ms: u64) -> Self {
        self.rules.push(Rule {
            values: Vec::new(),
            step: None,
            behavior: Behavior::Sleep { ms },
        });
        self
    }

    /// Every `(job, step name)` invocation, in call order.
    pub fn invocations(&self) -> Vec<(JobId, String)> {
        self.invocations.lock().unwrap().clone()
    }

    /// Highest number of invocations that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.gauge.lock().unwrap().max
    }
}

#[async_trait]
impl StepAction for ScriptedAction {
    async fn run(&self, job: &JobSpec, step: &StepSpec) -> anyhow::Result<ActionOutput> {
        self.invocations
            .lock()
            .unwrap()
            .push((job.id.clone(), step.name.clone()));

        let _in_flight = {
            let mut gauge = self.gauge.lock().unwrap();
            gauge.current += 1;
            gauge.max = gauge.max.max(gauge.current);
            InFlight(&self.gauge)
        };

        let mut fail: Option<i32> = None;
        let mut sleep_ms = 0u64;
        for rule in &self.rules {
            if rule.matches(job, step) {
                match rule.behavior {
                    Behavior::Sleep { ms } => sleep_ms = sleep_ms.max(ms),
                    Behavior::Fail { exit_code } => fail = fail.or(Some(exit_code)),
                }
            }
        }

        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }

        match fail {
            Some(exit_code) => Ok(ActionOutput::failed(
                exit_code,
                format!("scripted failure for '{}'", step.name),
            )),
            None => Ok(ActionOutput::ok(format!("{} ok", step.name))),
        }
    }
}

/// Provisioner that refuses jobs selecting a given axis value.
#[derive(Debug, Clone)]
pub struct UnavailableToolchain {
    value: String,
    reason: String,
}

impl UnavailableToolchain {
    /// Refuse every job that selects `value` on any axis.
    pub fn for_value(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ToolchainProvisioner for UnavailableToolchain {
    async fn provision(&self, job: &JobSpec) -> Provision {
        if job.selects(&self.value) {
            Provision::Unavailable {
                reason: self.reason.clone(),
            }
        } else {
            Provision::Ready
        }
    }
}
