//! Configuration management for strata

pub mod schema;

pub use schema::{ChainFailurePolicy, Config, ScriptSource};

use crate::error::{StrataError, StrataResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name of the project-local config
pub const LOCAL_CONFIG_NAME: &str = ".strata.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strata")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strata")
    }

    /// Default root for task workspaces
    pub fn workspaces_dir() -> PathBuf {
        Self::state_dir().join("environments")
    }

    /// Directory holding per-key build lock files
    pub fn locks_dir() -> PathBuf {
        Self::state_dir().join("locks")
    }

    /// Scratch directory for build contexts
    pub fn builds_dir() -> PathBuf {
        Self::state_dir().join("builds")
    }

    /// Get the event log path
    pub fn audit_log_path() -> PathBuf {
        Self::state_dir().join("events.log")
    }

    /// Walk up from `start` looking for a `.strata.toml`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> StrataResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load the global config with an optional local config merged over it.
    ///
    /// Tables merge key by key; any scalar or array in the local file
    /// replaces the global value.
    pub async fn load_merged(&self, local: Option<&Path>) -> StrataResult<Config> {
        let mut merged = if self.config_path.exists() {
            read_toml_value(&self.config_path).await?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let mut base_dir = self.config_path.parent().map(Path::to_path_buf);

        if let Some(local_path) = local {
            let overlay = read_toml_value(local_path).await?;
            merge_values(&mut merged, overlay);
            base_dir = local_path.parent().map(Path::to_path_buf);
        }

        let path = local.unwrap_or(&self.config_path).to_path_buf();
        let mut config: Config = merged.try_into().map_err(|e: toml::de::Error| {
            StrataError::ConfigInvalid {
                path,
                reason: e.to_string(),
            }
        })?;

        if let Some(dir) = base_dir {
            resolve_script_paths(&mut config, &dir);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> StrataResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StrataError::io(format!("reading config from {}", path.display()), e))?;

        let mut config: Config =
            toml::from_str(&content).map_err(|e| StrataError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Some(dir) = path.parent() {
            resolve_script_paths(&mut config, dir);
        }
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> StrataResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            StrataError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> StrataResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StrataError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> StrataResult<()> {
        let dirs = [Self::state_dir(), Self::locks_dir(), Self::builds_dir()];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                StrataError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_toml_value(path: &Path) -> StrataResult<toml::Value> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| StrataError::io(format!("reading config from {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| StrataError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn resolve_script_paths(config: &mut Config, base_dir: &Path) {
    for source in [
        &mut config.preflight.desktop_cached,
        &mut config.preflight.cached,
        &mut config.preflight.run,
    ] {
        if let Some(path) = source.path.as_mut() {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }
}

/// Read a configured script body. Missing sources read as empty.
pub async fn read_script(source: &ScriptSource) -> StrataResult<String> {
    if let Some(ref inline) = source.inline {
        return Ok(inline.clone());
    }
    match source.path {
        Some(ref path) => fs::read_to_string(path)
            .await
            .map_err(|e| StrataError::io(format!("reading script {}", path.display()), e)),
        None => Ok(String::new()),
    }
}
