//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_NAME};
use crate::error::{StrataError, StrataResult};
use crate::ui::{self, UiContext};
use std::path::{Path, PathBuf};
use tokio::fs;
use toml_edit::DocumentMut;

/// Type of a settable key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Bool,
    Integer,
    Text,
}

const SETTABLE_KEYS: &[(&str, KeyKind)] = &[
    ("general.log_format", KeyKind::Text),
    ("general.audit_log", KeyKind::Bool),
    ("runtime.engine", KeyKind::Text),
    ("runtime.base_image", KeyKind::Text),
    ("runtime.namespace", KeyKind::Text),
    ("runtime.build_timeout_secs", KeyKind::Integer),
    ("runtime.workdir", KeyKind::Text),
    ("cache.enabled", KeyKind::Bool),
    ("cache.desktop", KeyKind::Bool),
    ("cache.environment", KeyKind::Bool),
    ("cache.on_failure", KeyKind::Text),
    ("cache.cross_process_lock", KeyKind::Bool),
    ("preflight.desktop_cached.inline", KeyKind::Text),
    ("preflight.desktop_cached.path", KeyKind::Text),
    ("preflight.cached.inline", KeyKind::Text),
    ("preflight.cached.path", KeyKind::Text),
    ("preflight.run.inline", KeyKind::Text),
    ("preflight.run.path", KeyKind::Text),
    ("workspace.root", KeyKind::Text),
    ("workspace.failed_retention_days", KeyKind::Integer),
    ("workspace.sweep_after_days", KeyKind::Integer),
];

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> StrataResult<()> {
    let ctx = UiContext::detect();

    match args.action {
        None | Some(ConfigAction::Show) => {
            println!("{}", toml::to_string_pretty(config)?);
        }
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => {
            let path = manager.path();
            if path.exists() && !force {
                ui::step_warn_hint(
                    &ctx,
                    &format!("Config already exists at {}", path.display()),
                    "Use --force to overwrite",
                );
                return Ok(());
            }
            manager.save(&Config::default()).await?;
            ui::step_ok(&ctx, &format!("Wrote {}", path.display()));
        }
        Some(ConfigAction::Set { key, value, local }) => {
            let path = if local {
                local_config_path()?
            } else {
                manager.path().to_path_buf()
            };
            set_value(&path, &key, &value).await?;
            ui::step_ok(&ctx, &format!("Set {} = {} in {}", key, value, path.display()));
        }
    }

    Ok(())
}

fn local_config_path() -> StrataResult<PathBuf> {
    let cwd =
        std::env::current_dir().map_err(|e| StrataError::io("getting current directory", e))?;
    Ok(cwd.join(LOCAL_CONFIG_NAME))
}

/// Edit one key in place, keeping the rest of the file (comments included)
async fn set_value(path: &Path, key: &str, value: &str) -> StrataResult<()> {
    let existing = if path.exists() {
        fs::read_to_string(path)
            .await
            .map_err(|e| StrataError::io(format!("reading {}", path.display()), e))?
    } else {
        String::new()
    };

    let mut doc: DocumentMut = existing.parse()?;
    set_in_document(&mut doc, key, value)?;

    let content = doc.to_string();
    toml::from_str::<Config>(&content).map_err(|e| StrataError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StrataError::io(format!("creating {}", parent.display()), e))?;
    }
    fs::write(path, content)
        .await
        .map_err(|e| StrataError::io(format!("writing {}", path.display()), e))
}

fn set_in_document(doc: &mut DocumentMut, key: &str, value: &str) -> StrataResult<()> {
    let kind = SETTABLE_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, kind)| *kind)
        .ok_or_else(|| StrataError::ConfigKeyUnknown(key.to_string()))?;

    let item = match kind {
        KeyKind::Bool => toml_edit::value(parse_bool(value)?),
        KeyKind::Integer => toml_edit::value(
            value
                .parse::<i64>()
                .map_err(|_| StrataError::User(format!("Invalid number: {}", value)))?,
        ),
        KeyKind::Text => toml_edit::value(value),
    };

    let parts: Vec<&str> = key.split('.').collect();
    let Some((leaf, tables)) = parts.split_last() else {
        return Err(StrataError::ConfigKeyUnknown(key.to_string()));
    };

    let mut table = doc.as_table_mut();
    for part in tables {
        table = table
            .entry(part)
            .or_insert(toml_edit::table())
            .as_table_mut()
            .ok_or_else(|| StrataError::User(format!("{} is not a table", part)))?;
    }
    table.insert(leaf, item);
    Ok(())
}

fn parse_bool(value: &str) -> StrataResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(StrataError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}
