//! Descriptor schema and atomic persistence

use crate::context::ContextError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Current descriptor schema version
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Repository section, present only after a successful Phase 2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub url: String,
    pub owner: String,
    pub name: String,
    pub base_branch: String,
    pub task_branch: String,
    pub head_commit: String,
}

/// The descriptor record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryContext {
    pub version: u32,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Always serialized, as `null` until populated
    pub repository: Option<RepositoryInfo>,
}

impl RepositoryContext {
    /// Phase 1 placeholder
    pub fn placeholder(task_id: impl Into<String>) -> Self {
        Self {
            version: DESCRIPTOR_VERSION,
            task_id: task_id.into(),
            title: None,
            body: None,
            repository: None,
        }
    }

    /// Read and validate a descriptor file
    pub async fn load(path: &Path) -> Result<Self, ContextError> {
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContextError::Missing(path.to_path_buf()))
            }
            Err(e) => return Err(ContextError::io(path, e)),
        };

        let context: Self =
            serde_json::from_str(&content).map_err(|e| ContextError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if context.version != DESCRIPTOR_VERSION {
            return Err(ContextError::UnsupportedVersion {
                path: path.to_path_buf(),
                version: context.version,
            });
        }

        Ok(context)
    }

    /// Write atomically over `path`
    pub async fn store(&self, path: &Path) -> Result<(), ContextError> {
        let staged = StagedWrite::stage(path, self).await?;
        staged.commit().await
    }
}

/// A descriptor written to a sibling temp file but not yet renamed into place.
///
/// Until `commit` runs, the original file is untouched; a crash at this
/// point leaves at most a stray temp file behind.
#[derive(Debug)]
pub(crate) struct StagedWrite {
    temp: PathBuf,
    target: PathBuf,
}

impl StagedWrite {
    /// Serialize `context`, write it to a temp file next to `target`, and flush it to disk
    pub(crate) async fn stage(target: &Path, context: &RepositoryContext) -> Result<Self, ContextError> {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "context.json".to_string());
        let temp = target.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let mut content = serde_json::to_vec_pretty(context).map_err(|e| ContextError::Malformed {
            path: target.to_path_buf(),
            reason: e.to_string(),
        })?;
        content.push(b'\n');

        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| ContextError::io(&temp, e))?;
        file.write_all(&content)
            .await
            .map_err(|e| ContextError::io(&temp, e))?;
        file.sync_all().await.map_err(|e| ContextError::io(&temp, e))?;

        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    /// Atomically rename the temp file over the target
    pub(crate) async fn commit(self) -> Result<(), ContextError> {
        if let Err(e) = fs::rename(&self.temp, &self.target).await {
            let _ = fs::remove_file(&self.temp).await;
            return Err(ContextError::io(&self.target, e));
        }

        if let Some(parent) = self.target.parent() {
            fsync_dir(parent).await.ok();
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn temp_path(&self) -> &Path {
        &self.temp
    }
}

async fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    let file = fs::File::open(dir).await?;
    file.sync_all().await
}
