//! Context command - inspect repository context descriptors

use crate::cli::args::{ContextAction, ContextArgs};
use crate::config::Config;
use crate::context::{self, descriptor_path};
use crate::error::{StrataError, StrataResult};
use std::path::{Path, PathBuf};

/// Execute the context command
pub async fn execute(args: ContextArgs, _config: &Config) -> StrataResult<()> {
    match args.action {
        ContextAction::Show { path } => {
            let descriptor = context::read(&resolve(&path)).await?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(())
        }
        ContextAction::Verify { path } => {
            let path = resolve(&path);
            if context::verify_populated(&path).await {
                println!("populated");
                Ok(())
            } else {
                Err(StrataError::User(format!(
                    "Repository context at {} is not populated",
                    path.display()
                )))
            }
        }
    }
}

/// Accept a workspace directory as well as the descriptor itself
fn resolve(path: &Path) -> PathBuf {
    if path.is_dir() {
        descriptor_path(path)
    } else {
        path.to_path_buf()
    }
}
