//! Build command - resolve the cached image chain ahead of any task

use crate::checkout::GitCheckout;
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::StrataResult;
use crate::layer::ResolvedImage;
use crate::orchestration::{create_runtime, OutputFn};
use crate::task::{PreflightScripts, TaskRunner};
use crate::ui::{self, BuildProgress, TaskSpinner, UiContext};
use serde_json::json;
use std::sync::Arc;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> StrataResult<()> {
    let ctx = if args.json {
        UiContext::plain()
    } else {
        UiContext::detect()
    };

    let runtime = create_runtime(config)?;
    let scripts = PreflightScripts::load(config).await?;

    let progress = Arc::new(BuildProgress::new(&ctx));
    let observer: Arc<OutputFn> = {
        let progress = Arc::clone(&progress);
        Arc::new(move |line: String| progress.on_line(&line))
    };
    let runner = TaskRunner::new(config.clone(), runtime, Arc::new(GitCheckout::new()))
        .with_build_output(observer);

    let mut spinner = TaskSpinner::new(&ctx);
    if !args.json {
        spinner.start("Resolving layer chain");
    }
    let (plan, resolved) = runner.prepare(&scripts).await;
    progress.finish();

    if args.json {
        let output = json!({
            "image": resolved,
            "run_phase": plan.run.body,
            "warnings": plan.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if resolved.degradation.is_some() {
        spinner.stop_warn(&format!("Falling back to {}", resolved.image_ref));
    } else {
        spinner.stop(&format!("Resolved {}", resolved.image_ref));
    }
    print_layers(&ctx, &resolved);
    Ok(())
}

fn print_layers(ctx: &UiContext, resolved: &ResolvedImage) {
    ui::section(ctx, "Layers");
    for layer in &resolved.layers {
        let key = layer
            .key
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let line = format!("{} {} ({:?})", layer.name, key, layer.status).to_lowercase();
        if layer.baked {
            ui::step_ok(ctx, &line);
        } else if layer.is_noop() {
            ui::remark(ctx, &format!("{}: nothing to bake", layer.name));
        } else {
            ui::step_warn_hint(ctx, &line, "runs at task start");
        }
    }

    if let Some(ref degradation) = resolved.degradation {
        ui::step_warn(ctx, &degradation.to_string());
    }
}
