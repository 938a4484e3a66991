//! Repository detection from a checkout directory

use crate::checkout::run_git;
use crate::context::RepositoryInfo;
use std::path::Path;
use tracing::debug;

/// What detection found in a checkout directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Found(RepositoryInfo),
    /// No repository, or not enough information to describe one
    NotFound(String),
}

/// Split a remote URL into `(owner, name)`.
///
/// Handles `https://host/owner/name.git`, `ssh://git@host:22/owner/name`,
/// scp-style `git@host:owner/name.git` and local paths. Nested groups keep
/// every segment but the last in the owner.
pub fn parse_remote(url: &str) -> Option<(String, String)> {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        return None;
    }

    let (path, local) = if let Some((_, rest)) = url.split_once("://") {
        // Drop the authority
        (rest.split_once('/').map(|(_, p)| p)?, false)
    } else if let Some((host, rest)) = url.split_once(':') {
        if host.contains('/') {
            (url, true)
        } else {
            (rest, false)
        }
    } else {
        (url, true)
    };

    let path = path.trim_end_matches(".git").trim_matches('/');
    let (owner, name) = path.rsplit_once('/')?;
    let owner = if local {
        owner.rsplit('/').next().unwrap_or(owner)
    } else {
        owner
    };

    if owner.is_empty() || name.is_empty() {
        return None;
    }
    Some((owner.to_string(), name.to_string()))
}

/// Inspect `checkout_dir` and describe the repository it holds.
///
/// `fallback_url` is used when the checkout has no `origin` remote.
pub async fn detect_repository(
    checkout_dir: &Path,
    base_branch: &str,
    fallback_url: Option<&str>,
) -> Detection {
    if !checkout_dir.exists() {
        return Detection::NotFound(format!("{} does not exist", checkout_dir.display()));
    }

    if run_git(checkout_dir, &["rev-parse", "--is-inside-work-tree"])
        .await
        .is_err()
    {
        return Detection::NotFound(format!(
            "{} is not a git checkout",
            checkout_dir.display()
        ));
    }

    let url = match run_git(checkout_dir, &["remote", "get-url", "origin"]).await {
        Ok(url) if !url.is_empty() => url,
        _ => match fallback_url {
            Some(url) => url.to_string(),
            None => return Detection::NotFound("checkout has no origin remote".to_string()),
        },
    };

    let Some((owner, name)) = parse_remote(&url) else {
        return Detection::NotFound(format!("cannot derive owner/name from remote {}", url));
    };

    let head_commit = match run_git(checkout_dir, &["rev-parse", "HEAD"]).await {
        Ok(c) => c,
        Err(e) => return Detection::NotFound(format!("no head commit: {}", e)),
    };

    let task_branch = run_git(checkout_dir, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .unwrap_or_else(|_| "HEAD".to_string());

    debug!("Detected {}/{} at {}", owner, name, head_commit);

    Detection::Found(RepositoryInfo {
        url,
        owner,
        name,
        base_branch: base_branch.to_string(),
        task_branch,
        head_commit,
    })
}
