//! CLI argument definitions using clap derive

use crate::workspace::TaskOutcome;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// strata - layered build cache and isolated task runner
///
/// Bakes expensive setup into reusable image layers and runs every task
/// in its own workspace on top of them.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .strata.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a task in a fresh workspace on the cached image
    Run(RunArgs),

    /// Resolve (and build if needed) the cached image chain
    Build(BuildArgs),

    /// Show what runs at build time and what runs in the task
    Plan(PlanArgs),

    /// Suggest a cached/run split for a setup script
    Classify(ClassifyArgs),

    /// Compute a layer cache key
    Key(KeyArgs),

    /// Manage task workspaces
    Workspace(WorkspaceArgs),

    /// Inspect repository context descriptors
    Context(ContextArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Task id (generated if omitted)
    #[arg(short, long)]
    pub task: Option<String>,

    /// Environment the task belongs to
    #[arg(long, default_value = "default")]
    pub env_id: String,

    /// Repository to check out
    #[arg(short, long)]
    pub repo: Option<String>,

    /// Branch to check out
    #[arg(short, long, default_value = "main")]
    pub branch: String,

    /// Task branch name (defaults to strata/<task>)
    #[arg(long)]
    pub task_branch: Option<String>,

    /// Title hint for the context descriptor
    #[arg(long)]
    pub title: Option<String>,

    /// Body hint for the context descriptor
    #[arg(long)]
    pub body: Option<String>,

    /// Additional environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Bypass layer caching for this task
    #[arg(long)]
    pub no_cache: bool,

    /// Command and arguments to run
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Print the resolution as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,

    /// Plan as if caching were disabled
    #[arg(long)]
    pub no_cache: bool,

    /// Job command to render after the run phase
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ClassifyArgs {
    /// Script to classify ("-" reads stdin)
    pub script: PathBuf,

    /// Write the suggested cached phase here
    #[arg(long)]
    pub cached_out: Option<PathBuf>,

    /// Write the suggested run phase here
    #[arg(long)]
    pub run_out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Cached-phase script ("-" reads stdin)
    pub script: PathBuf,

    /// Content id of the base image (inspects runtime.base_image if omitted)
    #[arg(long, conflicts_with = "parent")]
    pub base_id: Option<String>,

    /// Key of the parent layer
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Parser, Debug)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub action: WorkspaceAction,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceAction {
    /// List task workspaces
    List {
        /// Only this environment
        #[arg(long)]
        env_id: Option<String>,

        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove workspaces older than a number of days
    Sweep {
        /// Only this environment
        #[arg(long)]
        env_id: Option<String>,

        /// Age threshold (default: workspace.sweep_after_days)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Dispose of one task's workspace according to its outcome
    Reclaim {
        task: String,

        #[arg(long, default_value = "default")]
        env_id: String,

        #[arg(long, value_enum, default_value = "success")]
        outcome: OutcomeArg,
    },
}

#[derive(Parser, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub action: ContextAction,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// Print a descriptor
    Show {
        /// Descriptor file or workspace directory
        path: PathBuf,
    },

    /// Exit non-zero unless the repository section is populated
    Verify {
        /// Descriptor file or workspace directory
        path: PathBuf,
    },
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.desktop)
        key: String,
        value: String,
        /// Write to project-local .strata.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    /// One path per line
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutcomeArg {
    Success,
    Failure,
    Cancelled,
}

impl From<OutcomeArg> for TaskOutcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Success => TaskOutcome::Success,
            OutcomeArg::Failure => TaskOutcome::Failure,
            OutcomeArg::Cancelled => TaskOutcome::Cancelled,
        }
    }
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE format: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
