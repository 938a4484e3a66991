//! CLI command implementations

pub mod build;
pub mod classify;
pub mod config;
pub mod context;
pub mod key;
pub mod plan;
pub mod run;
pub mod workspace;

pub use build::execute as build;
pub use classify::execute as classify;
pub use config::execute as config;
pub use context::execute as context;
pub use key::execute as key;
pub use plan::execute as plan;
pub use run::execute as run;
pub use workspace::execute as workspace;

use crate::cli::Cli;
use crate::error::{StrataError, StrataResult};
use clap::CommandFactory;
use clap_complete::Shell;
use std::path::Path;

/// Print completions for `shell` to stdout
pub fn completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}

/// Read a script argument, where "-" means stdin
pub(crate) async fn read_script_arg(path: &Path) -> StrataResult<String> {
    if path == Path::new("-") {
        let mut content = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut content)
            .await
            .map_err(|e| StrataError::io("reading script from stdin", e))?;
        return Ok(content);
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StrataError::io(format!("reading script {}", path.display()), e))
}
