//! Repository context descriptor
//!
//! Each task workspace carries a JSON descriptor describing the checked-out
//! repository. It is written in two phases:
//!
//! 1. Before the task container starts: placeholder with `repository: null`
//! 2. After checkout: the repository section is filled in
//!
//! Phase 2 is the only writer of the repository section. Its result is
//! always one of `Populated`, `NotDetected` or `Error`, so "nothing
//! happened" can never be mistaken for success.

pub mod descriptor;
pub mod detect;
pub mod sync;

pub use descriptor::{RepositoryContext, RepositoryInfo, DESCRIPTOR_VERSION};
pub use detect::{detect_repository, parse_remote, Detection};
pub use sync::{
    descriptor_path, populate, read, set_hints, sync, verify_populated, write_placeholder,
    SyncOutcome, SyncRequest,
};

use std::path::PathBuf;
use thiserror::Error;

/// Errors reading or writing the descriptor
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("descriptor missing at {0}")]
    Missing(PathBuf),

    #[error("descriptor at {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("descriptor at {path} has unsupported version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("descriptor IO failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContextError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
