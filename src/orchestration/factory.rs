//! Runtime factory
//!
//! Picks the engine named in configuration and wraps it for shared use
//! across concurrently running tasks.

use crate::config::{Config, ConfigManager};
use crate::error::StrataResult;
use crate::orchestration::cli_runtime::{CliRuntime, Engine};
use crate::orchestration::runtime::ContainerRuntime;
use std::sync::Arc;

/// Create the container runtime configured in `runtime.engine`
pub fn create_runtime(config: &Config) -> StrataResult<Arc<dyn ContainerRuntime>> {
    let engine = Engine::parse(&config.runtime.engine)?;
    Ok(Arc::new(CliRuntime::new(engine, ConfigManager::builds_dir())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_runtime_default_is_podman() {
        let runtime = create_runtime(&Config::default()).unwrap();
        assert_eq!(runtime.runtime_name(), "Podman");
    }

    #[test]
    fn create_runtime_rejects_unknown_engine() {
        let mut config = Config::default();
        config.runtime.engine = "containerd".to_string();
        assert!(create_runtime(&config).is_err());
    }
}
