//! strata - layered build cache and per-task execution
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use strata::cli::{commands, Cli, Commands};
use strata::config::ConfigManager;
use strata::error::{StrataError, StrataResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> StrataResult<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        commands::completions(shell);
        return Ok(());
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| StrataError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config.general.log_format);
    log_config_sources(&config_manager, cli.no_local, local_config_path);

    ConfigManager::ensure_state_dirs().await?;

    match cli.command {
        Commands::Completions { .. } => Ok(()),
        Commands::Run(args) => commands::run(args, &config).await,
        Commands::Build(args) => commands::build(args, &config).await,
        Commands::Plan(args) => commands::plan(args, &config).await,
        Commands::Classify(args) => commands::classify(args, &config).await,
        Commands::Key(args) => commands::key(args, &config).await,
        Commands::Workspace(args) => commands::workspace(args, &config).await,
        Commands::Context(args) => commands::context(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug. Logs go to stderr so stdout stays parseable.
fn init_logging(verbose: u8, format: &str) {
    let filter = match verbose {
        0 => EnvFilter::new("strata=warn"),
        1 => EnvFilter::new("strata=info"),
        _ => EnvFilter::new("strata=debug"),
    };

    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }
}

fn log_config_sources(manager: &ConfigManager, no_local: bool, local: Option<PathBuf>) {
    debug!("Global config: {}", manager.path().display());
    match local {
        Some(path) => debug!("Local config: {}", path.display()),
        None if no_local => debug!("Local config discovery disabled (--no-local)"),
        None => {}
    }
}
