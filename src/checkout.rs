//! Version-control checkout collaborator
//!
//! `Checkout` is the seam the task runner clones repositories through.
//! `GitCheckout` shells out to the `git` CLI.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Why a checkout failed
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("remote {url} unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("authentication failed for {url}: {reason}")]
    Auth { url: String, reason: String },

    #[error("not a git repository: {0}")]
    NotARepository(String),

    #[error("branch {branch} not found on {url}")]
    BranchNotFound { url: String, branch: String },

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),
}

impl CheckoutError {
    /// Map git's stderr to the most specific error kind
    fn classify(url: &str, branch: &str, command: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        let reason = stderr.trim().to_string();

        if lower.contains("authentication failed")
            || lower.contains("permission denied")
            || lower.contains("could not read username")
            || lower.contains("403")
        {
            Self::Auth {
                url: url.to_string(),
                reason,
            }
        } else if lower.contains("remote branch") && lower.contains("not found") {
            Self::BranchNotFound {
                url: url.to_string(),
                branch: branch.to_string(),
            }
        } else if lower.contains("repository not found")
            || lower.contains("does not appear to be a git repository")
            || lower.contains("not a git repository")
        {
            Self::NotARepository(url.to_string())
        } else if lower.contains("could not resolve host")
            || lower.contains("unable to access")
            || lower.contains("connection refused")
            || lower.contains("connection timed out")
            || lower.contains("network is unreachable")
        {
            Self::Unreachable {
                url: url.to_string(),
                reason,
            }
        } else {
            Self::Command {
                command: command.to_string(),
                stderr: reason,
            }
        }
    }
}

/// Checkout collaborator contract
#[async_trait]
pub trait Checkout: Send + Sync {
    /// Make `dest` a checkout of `branch` from `remote_url` and return the head commit
    async fn checkout(
        &self,
        remote_url: &str,
        dest: &Path,
        branch: &str,
    ) -> Result<String, CheckoutError>;

    /// Create (or reset) a local task branch at the current head
    async fn start_branch(&self, dest: &Path, branch: &str) -> Result<(), CheckoutError>;
}

/// Run git in `dir`, returning trimmed stdout
pub(crate) async fn run_git(dir: &Path, args: &[&str]) -> Result<String, CheckoutError> {
    debug!("git -C {} {:?}", dir.display(), args);

    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(CheckoutError::Spawn)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(CheckoutError::Command {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Checkout via the `git` command line
#[derive(Debug, Default, Clone)]
pub struct GitCheckout;

impl GitCheckout {
    pub fn new() -> Self {
        Self
    }

    async fn clone_fresh(
        &self,
        remote_url: &str,
        dest: &Path,
        branch: &str,
    ) -> Result<(), CheckoutError> {
        let parent = dest.parent().unwrap_or(dest);
        let dest_str = dest.display().to_string();
        let args = [
            "clone",
            "--branch",
            branch,
            "--single-branch",
            remote_url,
            dest_str.as_str(),
        ];

        match run_git(parent, &args).await {
            Ok(_) => Ok(()),
            Err(CheckoutError::Command { command, stderr }) => {
                Err(CheckoutError::classify(remote_url, branch, &command, &stderr))
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_existing(
        &self,
        remote_url: &str,
        dest: &Path,
        branch: &str,
    ) -> Result<(), CheckoutError> {
        let refspec = format!("{0}:refs/remotes/origin/{0}", branch);
        match run_git(dest, &["fetch", "origin", &refspec]).await {
            Ok(_) => Ok(()),
            Err(CheckoutError::Command { command, stderr }) => {
                Err(CheckoutError::classify(remote_url, branch, &command, &stderr))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Checkout for GitCheckout {
    async fn checkout(
        &self,
        remote_url: &str,
        dest: &Path,
        branch: &str,
    ) -> Result<String, CheckoutError> {
        if dest.join(".git").exists() {
            // Workspace was allocated before; keep local work, only fetch.
            debug!("Reusing existing checkout at {}", dest.display());
            self.refresh_existing(remote_url, dest, branch).await?;
        } else {
            info!("Cloning {} ({}) into {}", remote_url, branch, dest.display());
            self.clone_fresh(remote_url, dest, branch).await?;
        }

        run_git(dest, &["rev-parse", "HEAD"]).await
    }

    async fn start_branch(&self, dest: &Path, branch: &str) -> Result<(), CheckoutError> {
        run_git(dest, &["checkout", "-B", branch]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth() {
        let err = CheckoutError::classify(
            "https://example.com/a/b.git",
            "main",
            "clone",
            "fatal: Authentication failed for 'https://example.com/a/b.git/'",
        );
        assert!(matches!(err, CheckoutError::Auth { .. }));
    }

    #[test]
    fn classify_unreachable() {
        let err = CheckoutError::classify(
            "https://nowhere.invalid/a/b.git",
            "main",
            "clone",
            "fatal: unable to access 'https://nowhere.invalid/a/b.git/': Could not resolve host: nowhere.invalid",
        );
        assert!(matches!(err, CheckoutError::Unreachable { .. }));
    }

    #[test]
    fn classify_not_a_repository() {
        let err = CheckoutError::classify(
            "/tmp/plain-dir",
            "main",
            "clone",
            "fatal: '/tmp/plain-dir' does not appear to be a git repository",
        );
        assert!(matches!(err, CheckoutError::NotARepository(_)));
    }

    #[test]
    fn classify_missing_branch() {
        let err = CheckoutError::classify(
            "https://example.com/a/b.git",
            "nope",
            "clone",
            "warning: Could not find remote branch nope to clone.\nfatal: Remote branch nope not found in upstream origin",
        );
        assert!(matches!(err, CheckoutError::BranchNotFound { .. }));
    }

    #[test]
    fn classify_fallback_keeps_stderr() {
        let err = CheckoutError::classify("u", "b", "clone", "fatal: disk quota exceeded");
        match err {
            CheckoutError::Command { stderr, .. } => assert!(stderr.contains("quota")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn checkout_of_non_repository_fails_typed() {
        let temp = tempfile::TempDir::new().unwrap();
        let source = temp.path().join("not-a-repo");
        std::fs::create_dir_all(&source).unwrap();
        let dest = temp.path().join("dest");

        let result = GitCheckout::new()
            .checkout(&source.display().to_string(), &dest, "main")
            .await;
        assert!(result.is_err());
    }
}
