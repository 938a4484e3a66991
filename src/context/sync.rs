//! Phase 1 and Phase 2 descriptor writes

use crate::checkout::CheckoutError;
use crate::context::descriptor::StagedWrite;
use crate::context::detect::{detect_repository, Detection};
use crate::context::{ContextError, RepositoryContext, RepositoryInfo};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DESCRIPTOR_DIR: &str = ".strata";
const DESCRIPTOR_FILE: &str = "context.json";

/// Location of the descriptor inside a task workspace
pub fn descriptor_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(DESCRIPTOR_DIR).join(DESCRIPTOR_FILE)
}

/// Result of Phase 2. Never collapses into a plain success flag.
#[derive(Debug)]
pub enum SyncOutcome {
    Populated(RepositoryInfo),
    NotDetected { reason: String },
    Error { error: ContextError },
}

impl SyncOutcome {
    pub fn is_populated(&self) -> bool {
        matches!(self, Self::Populated(_))
    }

    pub fn repository(&self) -> Option<&RepositoryInfo> {
        match self {
            Self::Populated(info) => Some(info),
            _ => None,
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Populated(info) => write!(
                f,
                "populated {}/{} @ {}",
                info.owner,
                info.name,
                short_commit(&info.head_commit)
            ),
            Self::NotDetected { reason } => write!(f, "not detected: {}", reason),
            Self::Error { error } => write!(f, "error: {}", error),
        }
    }
}

fn short_commit(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}

/// Inputs Phase 2 needs besides the checkout itself
#[derive(Debug, Clone, Copy)]
pub struct SyncRequest<'a> {
    pub base_branch: &'a str,
    /// Used when the checkout has no `origin` remote
    pub remote_url: Option<&'a str>,
}

/// Phase 1: write the placeholder before the task container starts.
///
/// Overwrites any descriptor left from an earlier run of the same task.
pub async fn write_placeholder(
    path: &Path,
    task_id: &str,
    hints: Option<(&str, &str)>,
) -> Result<RepositoryContext, ContextError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ContextError::io(parent, e))?;
    }

    let mut context = RepositoryContext::placeholder(task_id);
    if let Some((title, body)) = hints {
        context.title = Some(title.to_string()).filter(|t| !t.is_empty());
        context.body = Some(body.to_string()).filter(|b| !b.is_empty());
    }

    context.store(path).await?;
    debug!("Wrote context placeholder at {}", path.display());
    Ok(context)
}

/// Read the descriptor
pub async fn read(path: &Path) -> Result<RepositoryContext, ContextError> {
    RepositoryContext::load(path).await
}

/// Update the title and body, leaving the repository section alone
pub async fn set_hints(
    path: &Path,
    title: Option<&str>,
    body: Option<&str>,
) -> Result<RepositoryContext, ContextError> {
    let mut context = RepositoryContext::load(path).await?;
    if let Some(title) = title {
        context.title = Some(title.to_string());
    }
    if let Some(body) = body {
        context.body = Some(body.to_string());
    }
    context.store(path).await?;
    Ok(context)
}

/// Phase 2: fill in the repository section of an existing descriptor.
///
/// Every other field is preserved. The write is atomic, so a reader sees
/// either the placeholder or the populated record.
pub async fn populate(
    path: &Path,
    metadata: RepositoryInfo,
) -> Result<RepositoryContext, ContextError> {
    let mut context = RepositoryContext::load(path).await?;
    context.repository = Some(metadata);

    let staged = StagedWrite::stage(path, &context).await?;
    staged.commit().await?;
    Ok(context)
}

/// Phase 2 end to end: detect the repository in `checkout_dir` and populate.
pub async fn sync(
    path: &Path,
    checkout_dir: &Path,
    checkout_result: &Result<String, CheckoutError>,
    request: SyncRequest<'_>,
) -> SyncOutcome {
    let outcome = match checkout_result {
        Err(e) => SyncOutcome::NotDetected {
            reason: format!("checkout failed: {}", e),
        },
        Ok(_) => match detect_repository(checkout_dir, request.base_branch, request.remote_url)
            .await
        {
            Detection::NotFound(reason) => SyncOutcome::NotDetected { reason },
            Detection::Found(info) => match populate(path, info.clone()).await {
                Ok(_) => SyncOutcome::Populated(info),
                Err(error) => SyncOutcome::Error { error },
            },
        },
    };

    match &outcome {
        SyncOutcome::Populated(_) => info!("Repository context {}", outcome),
        _ => warn!("Repository context {}", outcome),
    }
    outcome
}

/// Whether the descriptor exists, parses and has a repository section
pub async fn verify_populated(path: &Path) -> bool {
    matches!(
        RepositoryContext::load(path).await,
        Ok(RepositoryContext {
            repository: Some(_),
            ..
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn info() -> RepositoryInfo {
        RepositoryInfo {
            url: "git@github.com:acme/widgets.git".to_string(),
            owner: "acme".to_string(),
            name: "widgets".to_string(),
            base_branch: "main".to_string(),
            task_branch: "task/t-7".to_string(),
            head_commit: "feedfacefeedfacefeedfacefeedfacefeedface".to_string(),
        }
    }

    #[tokio::test]
    async fn placeholder_then_populate() {
        let temp = TempDir::new().unwrap();
        let path = descriptor_path(temp.path());

        write_placeholder(&path, "t-7", Some(("Title", "")))
            .await
            .unwrap();
        assert!(!verify_populated(&path).await);

        let ctx = populate(&path, info()).await.unwrap();
        assert_eq!(ctx.title.as_deref(), Some("Title"));
        assert_eq!(ctx.body, None);
        assert!(verify_populated(&path).await);
        assert_eq!(read(&path).await.unwrap().repository, Some(info()));
    }

    #[tokio::test]
    async fn populate_without_placeholder_is_missing() {
        let temp = TempDir::new().unwrap();
        let path = descriptor_path(temp.path());
        assert!(matches!(
            populate(&path, info()).await,
            Err(ContextError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn populate_over_malformed_is_malformed() {
        let temp = TempDir::new().unwrap();
        let path = descriptor_path(temp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(
            populate(&path, info()).await,
            Err(ContextError::Malformed { .. })
        ));
        assert!(!verify_populated(&path).await);
    }

    #[tokio::test]
    async fn set_hints_keeps_repository() {
        let temp = TempDir::new().unwrap();
        let path = descriptor_path(temp.path());
        write_placeholder(&path, "t-7", None).await.unwrap();
        populate(&path, info()).await.unwrap();

        let ctx = set_hints(&path, Some("New title"), None).await.unwrap();
        assert_eq!(ctx.title.as_deref(), Some("New title"));
        assert_eq!(ctx.repository, Some(info()));
    }

    #[tokio::test]
    async fn sync_after_failed_checkout_is_not_detected() {
        let temp = TempDir::new().unwrap();
        let path = descriptor_path(temp.path());
        write_placeholder(&path, "t-7", None).await.unwrap();

        let failed: Result<String, CheckoutError> =
            Err(CheckoutError::NotARepository("/nowhere".to_string()));
        let outcome = sync(
            &path,
            &temp.path().join("repo"),
            &failed,
            SyncRequest {
                base_branch: "main",
                remote_url: None,
            },
        )
        .await;

        assert!(matches!(outcome, SyncOutcome::NotDetected { .. }));
        assert!(!outcome.is_populated());
        assert!(!verify_populated(&path).await);
    }

    #[tokio::test]
    async fn sync_on_plain_directory_is_not_detected() {
        let temp = TempDir::new().unwrap();
        let path = descriptor_path(temp.path());
        write_placeholder(&path, "t-7", None).await.unwrap();
        let checkout = temp.path().join("repo");
        std::fs::create_dir_all(&checkout).unwrap();

        let outcome = sync(
            &path,
            &checkout,
            &Ok("abc".to_string()),
            SyncRequest {
                base_branch: "main",
                remote_url: Some("https://github.com/acme/widgets.git"),
            },
        )
        .await;
        assert!(matches!(outcome, SyncOutcome::NotDetected { .. }));
    }

    #[test]
    fn outcome_display() {
        let outcome = SyncOutcome::Populated(info());
        assert_eq!(outcome.to_string(), "populated acme/widgets @ feedfacefeed");
        let outcome = SyncOutcome::NotDetected {
            reason: "no origin".to_string(),
        };
        assert_eq!(outcome.to_string(), "not detected: no origin");
    }
}
