//! Shared runtime request types
//!
//! Plain data passed to `ContainerRuntime` implementations.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Request to build one image layer
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Image the new layer is built on
    pub base_ref: String,
    /// Tag to apply to the result
    pub tag: String,
    /// Containerfile text
    pub instructions: String,
    /// Extra files placed in the build context (name, content)
    pub context_files: Vec<(String, String)>,
}

/// What the orchestrator needs to know about a local image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Content id (`sha256:...`), changes whenever the image content does
    pub id: String,
    /// Configured user, empty for the engine default
    pub user: String,
}

/// Bind mount for a task container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Path on the host
    pub host: PathBuf,
    /// Path inside the container
    pub container: String,
    /// Mount read-only
    pub readonly: bool,
}

impl Mount {
    /// Render as a `-v` argument
    pub fn volume_arg(&self) -> String {
        let ro = if self.readonly { ":ro" } else { "" };
        format!("{}:{}{}", self.host.display(), self.container, ro)
    }
}

/// Everything needed to run a task container
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Image to run
    pub image: String,
    /// Command and arguments
    pub commands: Vec<String>,
    /// Bind mounts
    pub mounts: Vec<Mount>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Working directory inside the container
    pub workdir: String,
    /// Container name, if one should be assigned
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_volume_arg() {
        let mount = Mount {
            host: PathBuf::from("/srv/tasks/t1/repo"),
            container: "/workspace".to_string(),
            readonly: false,
        };
        assert_eq!(mount.volume_arg(), "/srv/tasks/t1/repo:/workspace");

        let ro = Mount {
            readonly: true,
            ..mount
        };
        assert_eq!(ro.volume_arg(), "/srv/tasks/t1/repo:/workspace:ro");
    }
}
