//! Preflight execution planning
//!
//! Decides which setup runs at image build time and which runs in every
//! task container, and renders the container command.

pub mod classify;
pub mod plan;

pub use classify::{classify, lint_cached, Classification, ClassifiedLine, LineClass, PlanWarning};
pub use plan::{plan, render_commands, shell_escape, ExecutionPlan, PreflightScript, ScriptPhase};
