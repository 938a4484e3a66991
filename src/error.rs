//! Error types for strata
//!
//! All modules use `StrataResult<T>` as their return type. Layer build
//! failures never show up here: the orchestrator degrades instead of
//! returning an error.

use crate::checkout::CheckoutError;
use crate::context::ContextError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for strata operations
pub type StrataResult<T> = Result<T, StrataError>;

/// All errors that can occur in strata
#[derive(Error, Debug)]
pub enum StrataError {
    // Runtime errors
    #[error("Container runtime not found: {0}")]
    RuntimeNotFound(String),

    #[error("Unsupported container engine: {0}. Use \"podman\" or \"docker\".")]
    UnsupportedEngine(String),

    #[error("Image build failed for {tag}: {reason}")]
    ImageBuild { tag: String, reason: String },

    #[error("Image build for {tag} timed out after {secs}s")]
    BuildTimeout { tag: String, secs: u64 },

    #[error("Container failed to run {image}: {reason}")]
    ContainerRun { image: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown configuration key: {0}")]
    ConfigKeyUnknown(String),

    // Task errors
    #[error("Checkout failed: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Repository context error: {0}")]
    Context(#[from] ContextError),

    #[error("Task {0} is already active")]
    TaskActive(String),

    #[error("Task {0} was cancelled")]
    TaskCancelled(String),

    #[error("Invalid task id '{0}': nothing left after sanitizing")]
    TaskIdInvalid(String),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(PathBuf),

    #[error("Workspace {path} belongs to {owner}")]
    WorkspaceOwned { path: PathBuf, owner: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML edit error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl StrataError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ImageBuild { .. }
                | Self::BuildTimeout { .. }
                | Self::ContainerRun { .. }
                | Self::Checkout(CheckoutError::Unreachable { .. })
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeNotFound(_) => Some("Install podman, or set runtime.engine = \"docker\""),
            Self::UnsupportedEngine(_) => Some("Run: strata config set runtime.engine podman"),
            Self::Checkout(CheckoutError::Auth { .. }) => {
                Some("Check the credentials configured for the remote")
            }
            Self::Context(ContextError::Missing(_)) => {
                Some("The placeholder descriptor is written before checkout; was the workspace reclaimed?")
            }
            Self::TaskActive(_) => Some("Wait for the running task to finish or cancel it"),
            Self::WorkspaceOwned { .. } => Some("Reclaim or sweep the stale workspace, then retry"),
            _ => None,
        }
    }
}
