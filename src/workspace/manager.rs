//! Task workspace lifecycle

use crate::config::{Config, ConfigManager};
use crate::error::{StrataError, StrataResult};
use crate::workspace::record::{TaskOutcome, TaskWorkspace, WorkspaceRecord, WorkspaceStatus};
use crate::workspace::{sanitize_id, task_slug};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{debug, info, warn};

const TASKS_DIR: &str = "tasks";

/// What `reclaim` did with a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimAction {
    Removed,
    Retained,
    /// Nothing to reclaim
    Absent,
}

/// Result of an age-based sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub retained: Vec<PathBuf>,
    /// Directories that could not be removed
    pub skipped: Vec<PathBuf>,
}

/// Marks a workspace as in use until dropped
#[derive(Debug)]
pub struct ActiveGuard {
    dir: PathBuf,
    registry: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.registry.lock() {
            active.remove(&self.dir);
        }
    }
}

/// Allocates, reclaims and sweeps per-task workspaces.
///
/// Cloning shares the active-task registry.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    failed_retention: Duration,
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

impl WorkspaceManager {
    /// Manager rooted at `root` with the default 3-day failure retention
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            failed_retention: Duration::days(3),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Manager configured from `[workspace]`
    pub fn from_config(config: &Config) -> Self {
        let root = config
            .workspace
            .root
            .clone()
            .unwrap_or_else(ConfigManager::workspaces_dir);
        Self::new(root).with_retention_days(config.workspace.failed_retention_days)
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.failed_retention = Duration::days(days as i64);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tasks_dir(&self, env_id: &str) -> StrataResult<PathBuf> {
        Ok(self.root.join(sanitize_id(env_id)?).join(TASKS_DIR))
    }

    /// Directory a task's workspace lives in, whether or not it exists
    pub fn workspace_dir(&self, env_id: &str, task_id: &str) -> StrataResult<PathBuf> {
        Ok(self.tasks_dir(env_id)?.join(task_slug(task_id)?))
    }

    /// Create (or reuse) the workspace for `task_id`.
    ///
    /// Idempotent: an existing directory and its checkout are kept and only
    /// the last-activity time is refreshed. A directory recorded for a
    /// different task or environment is never handed out.
    pub async fn allocate(&self, env_id: &str, task_id: &str) -> StrataResult<TaskWorkspace> {
        let dir = self.workspace_dir(env_id, task_id)?;

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StrataError::io(format!("creating workspace {}", dir.display()), e))?;

        let record = match WorkspaceRecord::load(&dir).await {
            Ok(Some(record)) if record.task_id != task_id || record.environment_id != env_id => {
                return Err(StrataError::WorkspaceOwned {
                    path: dir,
                    owner: format!("{}/{}", record.environment_id, record.task_id),
                });
            }
            Ok(Some(mut record)) => {
                debug!("Reusing workspace {}", dir.display());
                record.last_activity = Utc::now();
                record.status = WorkspaceStatus::Active;
                record
            }
            Ok(None) => WorkspaceRecord::new(env_id, task_id),
            Err(e) => {
                warn!("Replacing unreadable workspace record in {}: {}", dir.display(), e);
                WorkspaceRecord::new(env_id, task_id)
            }
        };
        record.save(&dir).await?;

        info!("Allocated workspace {}", dir.display());
        Ok(TaskWorkspace::new(dir, record))
    }

    /// Register a workspace as active so sweep and reclaim leave it alone
    pub fn activate(&self, workspace: &TaskWorkspace) -> StrataResult<ActiveGuard> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| StrataError::Internal("workspace registry poisoned".to_string()))?;

        if !active.insert(workspace.path().to_path_buf()) {
            return Err(StrataError::TaskActive(workspace.record.task_id.clone()));
        }

        Ok(ActiveGuard {
            dir: workspace.path().to_path_buf(),
            registry: Arc::clone(&self.active),
        })
    }

    fn is_active(&self, dir: &Path) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(dir))
            .unwrap_or(true)
    }

    /// Refresh the last-activity time
    pub async fn touch(&self, env_id: &str, task_id: &str) -> StrataResult<()> {
        let dir = self.workspace_dir(env_id, task_id)?;
        let mut record = WorkspaceRecord::load(&dir)
            .await?
            .ok_or_else(|| StrataError::WorkspaceNotFound(dir.clone()))?;

        record.last_activity = Utc::now();
        record.save(&dir).await
    }

    /// Dispose of a finished task's workspace.
    ///
    /// Success removes it. Failure and cancellation keep it for diagnosis
    /// unless the retention window has already elapsed.
    pub async fn reclaim(
        &self,
        env_id: &str,
        task_id: &str,
        outcome: TaskOutcome,
    ) -> StrataResult<ReclaimAction> {
        let dir = self.workspace_dir(env_id, task_id)?;
        if !dir.exists() {
            return Ok(ReclaimAction::Absent);
        }
        if self.is_active(&dir) {
            return Err(StrataError::TaskActive(task_id.to_string()));
        }

        let remove = match outcome {
            TaskOutcome::Success => true,
            TaskOutcome::Failure | TaskOutcome::Cancelled => {
                let last = last_modified(&dir).await;
                Utc::now() - last >= self.failed_retention
            }
        };

        if remove {
            remove_tree(&dir).await?;
            info!("Reclaimed workspace {} ({:?})", dir.display(), outcome);
            return Ok(ReclaimAction::Removed);
        }

        match WorkspaceRecord::load(&dir).await {
            Ok(Some(mut record)) => {
                record.status = outcome.into();
                record.save(&dir).await?;
            }
            Ok(None) => {}
            Err(e) => warn!("Could not update record in {}: {}", dir.display(), e),
        }
        info!(
            "Retaining workspace {} for {} days ({:?})",
            dir.display(),
            self.failed_retention.num_days(),
            outcome
        );
        Ok(ReclaimAction::Retained)
    }

    /// Remove every workspace in `env_id` untouched for longer than `max_age_days`.
    ///
    /// Outcome does not matter. A value of 0 disables the sweep.
    pub async fn sweep_older_than(
        &self,
        env_id: &str,
        max_age_days: u32,
    ) -> StrataResult<SweepReport> {
        let mut report = SweepReport::default();
        if max_age_days == 0 {
            return Ok(report);
        }

        let cutoff = Utc::now() - Duration::days(max_age_days as i64);
        for dir in self.task_dirs(env_id).await? {
            if self.is_active(&dir) {
                report.retained.push(dir);
                continue;
            }

            if last_modified(&dir).await >= cutoff {
                report.retained.push(dir);
                continue;
            }

            match remove_tree(&dir).await {
                Ok(()) => {
                    info!("Swept stale workspace {}", dir.display());
                    report.removed.push(dir);
                }
                Err(e) => {
                    warn!("Skipping workspace {}: {}", dir.display(), e);
                    report.skipped.push(dir);
                }
            }
        }

        Ok(report)
    }

    /// Workspaces of `env_id`, most recently active first
    pub async fn list(&self, env_id: &str) -> StrataResult<Vec<TaskWorkspace>> {
        let mut workspaces = vec![];
        for dir in self.task_dirs(env_id).await? {
            let record = match WorkspaceRecord::load(&dir).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    // Directory without a record: describe it from its name
                    let name = dir
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let mut record = WorkspaceRecord::new(env_id, &name);
                    record.last_activity = last_modified(&dir).await;
                    record.created_at = record.last_activity;
                    record
                }
                Err(e) => {
                    debug!("Ignoring {}: {}", dir.display(), e);
                    continue;
                }
            };
            workspaces.push(TaskWorkspace::new(dir, record));
        }

        workspaces.sort_by(|a, b| b.record.last_activity.cmp(&a.record.last_activity));
        Ok(workspaces)
    }

    /// Environment ids that have a workspace directory
    pub async fn environments(&self) -> StrataResult<Vec<String>> {
        let mut envs = read_subdirs(&self.root)
            .await?
            .into_iter()
            .filter(|dir| dir.join(TASKS_DIR).is_dir())
            .filter_map(|dir| dir.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect::<Vec<_>>();
        envs.sort();
        Ok(envs)
    }

    async fn task_dirs(&self, env_id: &str) -> StrataResult<Vec<PathBuf>> {
        read_subdirs(&self.tasks_dir(env_id)?).await
    }
}

async fn read_subdirs(dir: &Path) -> StrataResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut dirs = vec![];
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| StrataError::io(format!("reading {}", dir.display()), e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StrataError::io(format!("reading entry in {}", dir.display()), e))?
    {
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

/// Newest of the directory mtime and the record's last activity
async fn last_modified(dir: &Path) -> DateTime<Utc> {
    let mtime = fs::metadata(dir)
        .await
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH));

    match WorkspaceRecord::load(dir).await {
        Ok(Some(record)) => mtime.max(record.last_activity),
        _ => mtime,
    }
}

async fn remove_tree(dir: &Path) -> StrataResult<()> {
    fs::remove_dir_all(dir)
        .await
        .map_err(|e| StrataError::io(format!("removing workspace {}", dir.display()), e))
}
