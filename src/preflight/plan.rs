//! Cached/run split and container command rendering

use crate::cache::is_noop_script;
use crate::preflight::classify::{lint_cached, PlanWarning};
use serde::Serialize;

/// When a preflight script executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptPhase {
    /// Baked into an image layer at build time
    Cached,
    /// Executed inside every task container
    Run,
}

/// A named setup script tagged with its phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightScript {
    pub name: String,
    pub phase: ScriptPhase,
    pub body: String,
}

impl PreflightScript {
    pub fn cached(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: ScriptPhase::Cached,
            body: body.into(),
        }
    }

    pub fn run(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: ScriptPhase::Run,
            body: body.into(),
        }
    }

    /// True when the script has no effective commands
    pub fn is_noop(&self) -> bool {
        is_noop_script(&self.body)
    }
}

/// What runs where for one task
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    /// Handed to the layer orchestrator; `None` when there is nothing to bake
    pub cached: Option<PreflightScript>,
    /// Executed in the task container before the job
    pub run: PreflightScript,
    pub caching_enabled: bool,
    pub warnings: Vec<PlanWarning>,
}

/// Join script bodies in order, skipping empty ones
fn concat<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(|p| p.trim_end_matches('\n'))
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split setup between build time and run time.
///
/// With caching disabled the run phase is the cached content followed by
/// the run content, so the task sees the same commands in the same order.
pub fn plan(cached: &str, run: &str, caching_enabled: bool) -> ExecutionPlan {
    if !caching_enabled {
        return ExecutionPlan {
            cached: None,
            run: PreflightScript::run("run", concat([cached, run])),
            caching_enabled,
            warnings: vec![],
        };
    }

    let cached_script = PreflightScript::cached("environment", cached);
    let warnings = lint_cached(cached);
    ExecutionPlan {
        cached: (!cached_script.is_noop()).then_some(cached_script),
        run: PreflightScript::run("run", concat([run])),
        caching_enabled,
        warnings,
    }
}

impl ExecutionPlan {
    /// Prepend cached scripts the orchestrator could not bake into the image
    pub fn with_fallback<S: AsRef<str>>(mut self, unbaked: &[S]) -> Self {
        if unbaked.is_empty() {
            return self;
        }

        let parts = unbaked
            .iter()
            .map(|s| s.as_ref())
            .chain(std::iter::once(self.run.body.as_str()));
        self.run.body = concat(parts);
        self
    }

    /// Command for the task container: `/bin/sh -c` running the run
    /// phase under `set -e`, then exec-ing the job.
    pub fn render_commands(&self, job: &[String]) -> Vec<String> {
        render_commands(self, job)
    }
}

/// POSIX single-quote escaping: replace `'` with `'\''`.
pub fn shell_escape(s: &str) -> String {
    s.replace('\'', "'\\''")
}

/// See [`ExecutionPlan::render_commands`]
pub fn render_commands(plan: &ExecutionPlan, job: &[String]) -> Vec<String> {
    let mut script = String::from("set -e\n");

    if !plan.run.is_noop() {
        script.push_str(&plan.run.body);
        script.push('\n');
    }

    if !job.is_empty() {
        script.push_str("exec");
        for arg in job {
            script.push_str(&format!(" '{}'", shell_escape(arg)));
        }
        script.push('\n');
    }

    vec!["/bin/sh".to_string(), "-c".to_string(), script]
}
