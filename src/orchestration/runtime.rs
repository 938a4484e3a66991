//! Container runtime abstraction
//!
//! The orchestrator needs a handful of primitives from a runtime: check
//! whether an image exists, inspect it, build an image from instructions,
//! and run (or kill) a container. Output is streamed line by line to a
//! callback.

use crate::error::StrataResult;
use crate::orchestration::types::{BuildRequest, ImageInfo, RunSpec};
use async_trait::async_trait;

/// Line observer for streamed build/run output
pub type OutputFn = dyn Fn(String) + Send + Sync;

/// Abstract container runtime interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether an image with this reference exists locally
    async fn image_exists(&self, image: &str) -> StrataResult<bool>;

    /// Content id and user of an image, pulling it first if it is not local
    async fn inspect_image(&self, image: &str) -> StrataResult<ImageInfo>;

    /// Build an image and return its reference (the requested tag)
    async fn build_image(&self, request: &BuildRequest, on_output: &OutputFn)
        -> StrataResult<String>;

    /// Run a container to completion and return its exit code
    async fn run_container(&self, spec: &RunSpec, on_output: &OutputFn) -> StrataResult<i32>;

    /// Kill and remove a named container. A missing container is not an error.
    async fn kill_container(&self, name: &str) -> StrataResult<()>;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
