//! Spinners and layer build progress

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner for one long step, printed as plain lines outside a terminal
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    fancy: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            fancy: ctx.use_fancy_output(),
        }
    }

    pub fn start(&mut self, message: &str) {
        if self.fancy {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    pub fn stop(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.stop(message),
            None => eprintln!("{} {}", style("[OK]").green(), message),
        }
    }

    pub fn stop_warn(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.stop(style(message).yellow()),
            None => eprintln!("{} {}", style("[WARN]").yellow(), message),
        }
    }
}

/// Build progress for image layers.
///
/// Understands `STEP N/M: ...` (podman) and `Step N/M : ...` (docker) lines.
/// Usable as an output observer from any thread.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext) -> Self {
        if !ctx.use_fancy_output() {
            return Self { bar: None };
        }

        let bar = ProgressBar::new(0);
        let bar_style = ProgressStyle::default_bar()
            .template("  {spinner:.cyan} layer {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .progress_chars("━╸─");
        bar.set_style(bar_style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar: Some(bar) }
    }

    /// Feed one line of build output
    pub fn on_line(&self, line: &str) {
        let step = parse_step(line);
        match (&self.bar, step) {
            (Some(bar), Some((n, total, instruction))) => {
                bar.set_length(total);
                bar.set_position(n);
                bar.set_message(clip(instruction, 60));
            }
            (Some(bar), None) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !is_noise(trimmed) {
                    bar.set_message(clip(trimmed, 60));
                }
            }
            (None, Some((n, total, instruction))) => {
                eprintln!("  step {}/{}: {}", n, total, instruction);
            }
            (None, None) => {}
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Shorten to at most `max` characters
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}

fn is_noise(line: &str) -> bool {
    line.starts_with("-->")
        || line.starts_with("--->")
        || line.starts_with("COMMIT")
        || line.starts_with("Removing intermediate")
        || line.starts_with("Successfully tagged")
}

/// Parse `STEP 3/5: RUN ...` or `Step 3/5 : RUN ...`
fn parse_step(line: &str) -> Option<(u64, u64, &str)> {
    let rest = line
        .strip_prefix("STEP ")
        .or_else(|| line.strip_prefix("Step "))?;
    let (counts, instruction) = rest.split_once(':')?;
    let (n, total) = counts.trim().split_once('/')?;
    Some((n.parse().ok()?, total.parse().ok()?, instruction.trim()))
}
