//! Workspace record persistence

use crate::error::{StrataError, StrataResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const RECORD_DIR: &str = ".strata";
const RECORD_FILE: &str = "workspace.json";
const CHECKOUT_DIR: &str = "repo";

/// How a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Success,
    Failure,
    Cancelled,
}

/// Workspace status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Active,
    Succeeded,
    Failed,
    Cancelled,
}

impl From<TaskOutcome> for WorkspaceStatus {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Success => Self::Succeeded,
            TaskOutcome::Failure => Self::Failed,
            TaskOutcome::Cancelled => Self::Cancelled,
        }
    }
}

/// Record stored inside each workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    /// Task id as given by the caller, before sanitizing
    pub task_id: String,

    pub environment_id: String,

    pub status: WorkspaceStatus,

    pub created_at: DateTime<Utc>,

    pub last_activity: DateTime<Utc>,
}

impl WorkspaceRecord {
    pub fn new(environment_id: &str, task_id: &str) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.to_string(),
            environment_id: environment_id.to_string(),
            status: WorkspaceStatus::Active,
            created_at: now,
            last_activity: now,
        }
    }

    /// Record file path for the workspace at `dir`
    pub fn file_path(dir: &Path) -> PathBuf {
        dir.join(RECORD_DIR).join(RECORD_FILE)
    }

    /// Load the record, `None` if the workspace has none
    pub async fn load(dir: &Path) -> StrataResult<Option<Self>> {
        let path = Self::file_path(dir);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| StrataError::io(format!("reading workspace record {}", path.display()), e))?;

        let record: WorkspaceRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    /// Save the record into the workspace at `dir`
    pub async fn save(&self, dir: &Path) -> StrataResult<()> {
        let path = Self::file_path(dir);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StrataError::io("creating workspace record directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| StrataError::io(format!("writing workspace record {}", path.display()), e))?;

        Ok(())
    }
}

/// An allocated task workspace
#[derive(Debug, Clone)]
pub struct TaskWorkspace {
    dir: PathBuf,
    pub record: WorkspaceRecord,
}

impl TaskWorkspace {
    pub(crate) fn new(dir: PathBuf, record: WorkspaceRecord) -> Self {
        Self { dir, record }
    }

    /// Workspace root directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Where the repository is checked out
    pub fn checkout_dir(&self) -> PathBuf {
        self.dir.join(CHECKOUT_DIR)
    }

    /// Where the repository context descriptor lives
    pub fn descriptor_path(&self) -> PathBuf {
        crate::context::descriptor_path(&self.dir)
    }
}
