//! Classify command - suggest which setup lines can be cached

use crate::cli::args::ClassifyArgs;
use crate::cli::commands::read_script_arg;
use crate::config::Config;
use crate::error::{StrataError, StrataResult};
use crate::preflight::{classify, LineClass};
use crate::ui::{self, UiContext};
use std::path::Path;

/// Execute the classify command
pub async fn execute(args: ClassifyArgs, _config: &Config) -> StrataResult<()> {
    let script = read_script_arg(&args.script).await?;
    let classification = classify(&script);

    print!("{}", classification.diff());

    let (cached, run) = classification.split();
    if let Some(ref path) = args.cached_out {
        write_phase(path, &cached).await?;
    }
    if let Some(ref path) = args.run_out {
        write_phase(path, &run).await?;
    }

    let ctx = UiContext::detect();
    ui::remark(
        &ctx,
        &format!(
            "{} cached, {} per-task. Review before moving lines: unrecognized commands stay per-task.",
            classification.count(LineClass::CacheStable),
            classification.count(LineClass::PerTask)
        ),
    );
    Ok(())
}

async fn write_phase(path: &Path, body: &str) -> StrataResult<()> {
    tokio::fs::write(path, body)
        .await
        .map_err(|e| StrataError::io(format!("writing {}", path.display()), e))
}
