//! Plan command - show the build-time / task-time split without building

use crate::cli::args::PlanArgs;
use crate::config::Config;
use crate::error::StrataResult;
use crate::layer::DESKTOP_TIER;
use crate::preflight::{self, ExecutionPlan};
use crate::task::PreflightScripts;
use crate::ui::{self, UiContext};
use serde_json::json;

/// Execute the plan command
pub async fn execute(args: PlanArgs, config: &Config) -> StrataResult<()> {
    let scripts = PreflightScripts::load(config).await?;
    let caching = config.cache.enabled && !args.no_cache;
    let desktop_cached = caching && config.cache.tier_enabled(DESKTOP_TIER);

    let mut plan = preflight::plan(&scripts.cached, &scripts.run, caching);
    if !desktop_cached {
        plan = plan.with_fallback(&[scripts.desktop.as_str()]);
    }
    let commands = plan.render_commands(&args.command);

    if args.json {
        let output = json!({
            "desktop": desktop_cached.then_some(scripts.desktop.as_str()),
            "plan": plan,
            "commands": commands,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let ctx = UiContext::detect();
    print_plan(&ctx, desktop_cached.then_some(scripts.desktop.as_str()), &plan);
    ui::section(&ctx, "Task command");
    for arg in &commands {
        println!("{}", arg);
    }
    Ok(())
}

fn print_plan(ctx: &UiContext, desktop: Option<&str>, plan: &ExecutionPlan) {
    ui::section(ctx, "Build time");
    let mut baked = false;
    if let Some(desktop) = desktop.filter(|s| !s.trim().is_empty()) {
        ui::step_info(ctx, "desktop tier");
        println!("{}", desktop.trim_end());
        baked = true;
    }
    if let Some(ref cached) = plan.cached {
        ui::step_info(ctx, "environment tier");
        println!("{}", cached.body.trim_end());
        baked = true;
    }
    if !baked {
        ui::remark(ctx, "nothing is cached");
    }

    ui::section(ctx, "Task start");
    if plan.run.is_noop() {
        ui::remark(ctx, "no setup");
    } else {
        println!("{}", plan.run.body.trim_end());
    }

    for warning in &plan.warnings {
        ui::step_warn(ctx, &warning.to_string());
    }
}
