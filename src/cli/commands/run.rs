//! Run command - execute one task end to end

use crate::checkout::GitCheckout;
use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::context::SyncOutcome;
use crate::error::{StrataError, StrataResult};
use crate::orchestration::{create_runtime, OutputFn};
use crate::task::{PreflightScripts, TaskOutcome, TaskReport, TaskRunner, TaskSpec};
use crate::ui::{self, BuildProgress, UiContext};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config) -> StrataResult<()> {
    let ctx = UiContext::detect();

    let mut config = config.clone();
    if args.no_cache {
        config.cache.enabled = false;
    }

    let runtime = create_runtime(&config)?;
    debug!("Using runtime: {}", runtime.runtime_name());

    let scripts = PreflightScripts::load(&config).await?;
    let spec = task_spec(args);

    let progress = Arc::new(BuildProgress::new(&ctx));
    let build_output: Arc<OutputFn> = {
        let progress = Arc::clone(&progress);
        Arc::new(move |line: String| progress.on_line(&line))
    };
    let task_output: Arc<OutputFn> = Arc::new(|line: String| println!("{}", line));

    let runner = TaskRunner::new(config, runtime, Arc::new(GitCheckout::new()))
        .with_build_output(build_output);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_tx.send(true).ok();
        }
    });

    ui::intro(&ctx, &format!("strata run {}", spec.task_id));
    let result = runner.run(&spec, &scripts, cancel_rx, task_output).await;
    progress.finish();

    let report = result?;
    print_report(&ctx, &report);

    match report.outcome {
        TaskOutcome::Success => Ok(()),
        TaskOutcome::Cancelled => Err(StrataError::TaskCancelled(report.task_id)),
        TaskOutcome::Failure => Err(StrataError::User(match (report.exit_code, report.error) {
            (Some(code), _) => format!("Task {} exited with code {}", report.task_id, code),
            (None, Some(error)) => format!("Task {} failed: {}", report.task_id, error),
            (None, None) => format!("Task {} failed", report.task_id),
        })),
    }
}

fn task_spec(args: RunArgs) -> TaskSpec {
    let task_id = args.task.unwrap_or_else(TaskSpec::generate_id);
    let mut spec = TaskSpec::new(task_id, args.env_id);
    spec.remote_url = args.repo;
    spec.base_branch = args.branch;
    spec.task_branch = args.task_branch;
    spec.title = args.title;
    spec.body = args.body;
    spec.command = args.command;
    spec.env = args.env.into_iter().collect();
    spec
}

fn print_report(ctx: &UiContext, report: &TaskReport) {
    ui::section(ctx, "Task");
    ui::key_value(ctx, "image", &report.image.image_ref);
    ui::key_value(ctx, "cached", if report.image.used_cache { "yes" } else { "no" });
    ui::key_value(ctx, "workspace", &report.workspace.display().to_string());
    if let Some(action) = report.reclaim {
        ui::key_value(ctx, "reclaim", &format!("{:?}", action).to_lowercase());
    }
    ui::key_value(ctx, "duration", &format!("{:.1}s", report.duration.as_secs_f64()));

    if let Some(ref degradation) = report.image.degradation {
        ui::step_warn(ctx, &degradation.to_string());
    }
    for warning in &report.warnings {
        ui::step_warn_hint(ctx, &warning.to_string(), "move it to the run phase");
    }
    match report.context {
        Some(SyncOutcome::Populated(_)) | None => {}
        Some(ref outcome) => ui::step_warn(ctx, &format!("Repository context {}", outcome)),
    }

    match report.outcome {
        TaskOutcome::Success => ui::outro_success(ctx, "Task succeeded"),
        TaskOutcome::Failure => ui::outro_error(ctx, "Task failed"),
        TaskOutcome::Cancelled => ui::outro_error(ctx, "Task cancelled"),
    }
}
