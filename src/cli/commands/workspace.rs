//! Workspace command - list, sweep and reclaim task workspaces

use crate::audit::{events, AuditLog};
use crate::cli::args::{OutputFormat, WorkspaceAction, WorkspaceArgs};
use crate::config::Config;
use crate::error::StrataResult;
use crate::workspace::{ReclaimAction, TaskOutcome, TaskWorkspace, WorkspaceManager};
use crate::ui::{self, UiContext};
use console::style;
use serde_json::json;

/// Execute the workspace command
pub async fn execute(args: WorkspaceArgs, config: &Config) -> StrataResult<()> {
    let manager = WorkspaceManager::from_config(config);

    match args.action {
        WorkspaceAction::List { env_id, format } => {
            let workspaces = collect(&manager, env_id).await?;
            match format {
                OutputFormat::Table => print_table(&workspaces),
                OutputFormat::Json => print_json(&workspaces)?,
                OutputFormat::Plain => {
                    for ws in &workspaces {
                        println!("{}", ws.path().display());
                    }
                }
            }
        }
        WorkspaceAction::Sweep { env_id, days } => {
            let days = days.unwrap_or(config.workspace.sweep_after_days);
            sweep(&manager, &AuditLog::new(config), env_id, days).await?;
        }
        WorkspaceAction::Reclaim {
            task,
            env_id,
            outcome,
        } => {
            let ctx = UiContext::detect();
            let outcome = TaskOutcome::from(outcome);
            match manager.reclaim(&env_id, &task, outcome).await? {
                ReclaimAction::Removed => ui::step_ok(&ctx, &format!("Removed workspace for {}", task)),
                ReclaimAction::Retained => ui::step_info(
                    &ctx,
                    &format!(
                        "Keeping workspace for {} ({} days after a {:?} outcome)",
                        task, config.workspace.failed_retention_days, outcome
                    ),
                ),
                ReclaimAction::Absent => ui::remark(&ctx, &format!("No workspace for {}", task)),
            }
        }
    }

    Ok(())
}

async fn environments(manager: &WorkspaceManager, env_id: Option<String>) -> StrataResult<Vec<String>> {
    match env_id {
        Some(env) => Ok(vec![env]),
        None => manager.environments().await,
    }
}

async fn collect(manager: &WorkspaceManager, env_id: Option<String>) -> StrataResult<Vec<TaskWorkspace>> {
    let mut all = vec![];
    for env in environments(manager, env_id).await? {
        all.extend(manager.list(&env).await?);
    }
    all.sort_by(|a, b| b.record.last_activity.cmp(&a.record.last_activity));
    Ok(all)
}

async fn sweep(
    manager: &WorkspaceManager,
    audit: &AuditLog,
    env_id: Option<String>,
    days: u32,
) -> StrataResult<()> {
    let ctx = UiContext::detect();
    if days == 0 {
        ui::remark(&ctx, "Sweep disabled (workspace.sweep_after_days = 0)");
        return Ok(());
    }

    let mut removed = 0;
    for env in environments(manager, env_id).await? {
        let report = manager.sweep_older_than(&env, days).await?;
        for dir in &report.skipped {
            ui::step_warn(&ctx, &format!("Could not remove {}", dir.display()));
        }
        if !report.removed.is_empty() {
            audit
                .log(
                    events::WORKSPACE_SWEPT,
                    &json!({
                        "environment_id": env,
                        "max_age_days": days,
                        "removed": report.removed,
                        "skipped": report.skipped,
                    }),
                )
                .await;
        }
        removed += report.removed.len();
    }

    ui::step_ok(&ctx, &format!("Removed {} workspace(s) older than {} days", removed, days));
    Ok(())
}

fn print_table(workspaces: &[TaskWorkspace]) {
    if workspaces.is_empty() {
        println!("No task workspaces");
        return;
    }

    println!(
        "{:<32} {:<16} {:<10} {:<17}",
        style("TASK").bold(),
        style("ENVIRONMENT").bold(),
        style("STATUS").bold(),
        style("LAST ACTIVE").bold()
    );
    for ws in workspaces {
        let record = &ws.record;
        let status = format!("{:?}", record.status).to_lowercase();
        println!(
            "{:<32} {:<16} {:<10} {:<17}",
            record.task_id,
            record.environment_id,
            status,
            record.last_activity.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    println!("{} workspace(s)", workspaces.len());
}

fn print_json(workspaces: &[TaskWorkspace]) -> StrataResult<()> {
    let entries: Vec<_> = workspaces
        .iter()
        .map(|ws| json!({ "path": ws.path(), "record": ws.record }))
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
