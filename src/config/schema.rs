//! Configuration schema for strata
//!
//! Global configuration is stored at `~/.config/strata/config.toml`; a
//! project-local `.strata.toml` is merged over it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container runtime settings
    pub runtime: RuntimeConfig,

    /// Layer build cache settings
    pub cache: CacheConfig,

    /// Setup scripts split into cached and run phases
    pub preflight: PreflightConfig,

    /// Task workspace settings
    pub workspace: WorkspaceConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record build/sync events to the event log
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Engine binary: "podman" or "docker"
    pub engine: String,

    /// Image every layer chain starts from
    pub base_image: String,

    /// Repository part of cached image tags (`<namespace>:<key>`)
    pub namespace: String,

    /// Upper bound for a single layer build, in seconds
    pub build_timeout_secs: u64,

    /// Working directory inside task containers
    pub workdir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: "podman".to_string(),
            base_image: "docker.io/library/ubuntu:24.04".to_string(),
            namespace: "strata-cache".to_string(),
            build_timeout_secs: 1800,
            workdir: "/workspace".to_string(),
        }
    }
}

/// What the orchestrator returns when a layer in the chain fails to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFailurePolicy {
    /// Use the last layer that resolved before the failure
    #[default]
    LastResolved,
    /// Discard every cached layer and use the base image
    BaseImage,
}

/// Layer cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch for build-time caching
    pub enabled: bool,

    /// Bake the desktop tier into an image layer
    pub desktop: bool,

    /// Bake the environment tier into an image layer
    pub environment: bool,

    /// Behavior when a layer build fails partway through the chain
    pub on_failure: ChainFailurePolicy,

    /// Coordinate builds across processes with lock files
    pub cross_process_lock: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            desktop: true,
            environment: true,
            on_failure: ChainFailurePolicy::LastResolved,
            cross_process_lock: true,
        }
    }
}

impl CacheConfig {
    /// Whether a given tier should be baked into an image
    pub fn tier_enabled(&self, tier: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match tier {
            "desktop" => self.desktop,
            "environment" => self.environment,
            _ => true,
        }
    }
}

/// A script body, given inline or as a file path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSource {
    /// Inline script content
    pub inline: Option<String>,

    /// Path to a script file (relative paths resolve against the config file)
    pub path: Option<PathBuf>,
}

impl ScriptSource {
    /// Whether neither inline content nor a path is set
    pub fn is_empty(&self) -> bool {
        self.inline.is_none() && self.path.is_none()
    }
}

/// Preflight scripts for each tier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Desktop provisioning, baked at build time
    pub desktop_cached: ScriptSource,

    /// Environment setup baked at build time
    pub cached: ScriptSource,

    /// Setup executed in every task container
    pub run: ScriptSource,
}

/// Task workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root under which `<environment>/tasks/<task>/` directories live
    pub root: Option<PathBuf>,

    /// Days a failed task's workspace is kept for diagnosis
    pub failed_retention_days: u32,

    /// Backstop sweep threshold in days regardless of outcome (0 = disabled)
    pub sweep_after_days: u32,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            failed_retention_days: 3,
            sweep_after_days: 7,
        }
    }
}
