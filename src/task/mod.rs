//! End-to-end task execution
//!
//! A task resolves its layered image, gets a private workspace with a
//! checkout and context descriptor, and runs its job in a container on the
//! resolved image with whatever setup could not be baked.

mod runner;

pub use crate::workspace::TaskOutcome;
pub use runner::TaskRunner;

use crate::config::{read_script, Config};
use crate::context::SyncOutcome;
use crate::error::StrataResult;
use crate::layer::ResolvedImage;
use crate::preflight::PlanWarning;
use crate::workspace::{task_slug, ReclaimAction};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix for generated task branch names
pub const TASK_BRANCH_PREFIX: &str = "strata/";

/// Everything needed to run one task
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub task_id: String,
    pub environment_id: String,
    /// Repository to check out, if any
    pub remote_url: Option<String>,
    pub base_branch: String,
    /// Defaults to `strata/<task slug>`
    pub task_branch: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    /// Job command, exec'd after the run phase
    pub command: Vec<String>,
    /// Extra container environment
    pub env: BTreeMap<String, String>,
}

impl TaskSpec {
    pub fn new(task_id: impl Into<String>, environment_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            environment_id: environment_id.into(),
            remote_url: None,
            base_branch: "main".to_string(),
            task_branch: None,
            title: None,
            body: None,
            command: vec![],
            env: BTreeMap::new(),
        }
    }

    /// Task id generated from a fresh UUID
    pub fn generate_id() -> String {
        let id = uuid::Uuid::new_v4().to_string();
        format!("task-{}", &id[..8])
    }

    /// Branch the task's changes go on
    pub fn task_branch(&self) -> StrataResult<String> {
        match self.task_branch {
            Some(ref branch) => Ok(branch.clone()),
            None => Ok(format!("{}{}", TASK_BRANCH_PREFIX, task_slug(&self.task_id)?)),
        }
    }

    /// Name of the task's container
    pub fn container_name(&self) -> StrataResult<String> {
        Ok(format!("strata-{}", task_slug(&self.task_id)?))
    }

    /// Title and body for the placeholder descriptor
    pub(crate) fn hints(&self) -> Option<(&str, &str)> {
        if self.title.is_none() && self.body.is_none() {
            return None;
        }
        Some((
            self.title.as_deref().unwrap_or_default(),
            self.body.as_deref().unwrap_or_default(),
        ))
    }
}

/// Setup script bodies for the three places setup can live
#[derive(Debug, Clone, Default)]
pub struct PreflightScripts {
    /// Desktop tier, cached when that tier is enabled
    pub desktop: String,
    /// Environment tier, cached when that tier is enabled
    pub cached: String,
    /// Always runs in the task container
    pub run: String,
}

impl PreflightScripts {
    /// Read every configured script source
    pub async fn load(config: &Config) -> StrataResult<Self> {
        Ok(Self {
            desktop: read_script(&config.preflight.desktop_cached).await?,
            cached: read_script(&config.preflight.cached).await?,
            run: read_script(&config.preflight.run).await?,
        })
    }
}

/// What happened to one task
#[derive(Debug)]
pub struct TaskReport {
    pub task_id: String,
    pub outcome: TaskOutcome,
    /// `None` when the container never finished
    pub exit_code: Option<i32>,
    pub image: ResolvedImage,
    /// `None` for tasks without a repository
    pub context: Option<SyncOutcome>,
    pub workspace: PathBuf,
    /// `None` when reclaiming failed
    pub reclaim: Option<ReclaimAction>,
    /// Runtime error that ended the task, if any
    pub error: Option<String>,
    pub warnings: Vec<PlanWarning>,
    pub duration: Duration,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == TaskOutcome::Success
    }
}
