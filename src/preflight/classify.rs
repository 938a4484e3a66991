//! Advisory split of a single setup script
//!
//! Sorts each line into cache-stable (safe to bake into an image) or
//! per-task (must run in every container). Anything unrecognized is kept at
//! run time. The result is a proposal meant to be reviewed through
//! [`Classification::diff`], never applied silently.

use serde::Serialize;
use std::fmt;

/// Where a line belongs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    CacheStable,
    PerTask,
}

/// One line of the input with its class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedLine {
    /// 1-based line number
    pub number: usize,
    pub text: String,
    pub class: LineClass,
    pub reason: &'static str,
}

/// Result of [`classify`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    pub lines: Vec<ClassifiedLine>,
}

impl Classification {
    /// Proposed `(cached, run)` scripts
    pub fn split(&self) -> (String, String) {
        let mut cached = vec![];
        let mut run = vec![];
        for line in &self.lines {
            match line.class {
                LineClass::CacheStable => cached.push(line.text.as_str()),
                LineClass::PerTask => run.push(line.text.as_str()),
            }
        }
        (cached.join("\n"), run.join("\n"))
    }

    /// Reviewable listing: `C` marks cached lines, `R` run-time lines
    pub fn diff(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let tag = match line.class {
                LineClass::CacheStable => 'C',
                LineClass::PerTask => 'R',
            };
            if line.text.trim().is_empty() {
                out.push_str(&format!("{} {:>4}\n", tag, line.number));
            } else {
                out.push_str(&format!(
                    "{} {:>4}  {:<60}  # {}\n",
                    tag, line.number, line.text, line.reason
                ));
            }
        }
        out
    }

    pub fn count(&self, class: LineClass) -> usize {
        self.lines
            .iter()
            .filter(|l| l.class == class && !is_filler(&l.text))
            .count()
    }
}

/// A cached-phase line that refers to per-task state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanWarning {
    pub line: usize,
    pub text: String,
    pub reason: &'static str,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.text.trim(), self.reason)
    }
}

const TASK_MARKERS: &[&str] = &[
    "TASK_ID",
    "TASK_BRANCH",
    "$TASK",
    "${TASK",
    "{{task",
    "{{ task",
    "$WORKSPACE",
    "${WORKSPACE",
];

const PACKAGE_MANAGERS: &[&str] = &["apt", "apt-get", "dnf", "yum", "apk", "zypper", "pacman", "brew"];

const LANGUAGE_INSTALLERS: &[&str] = &[
    "pip", "pip3", "pipx", "npm", "yarn", "pnpm", "cargo", "gem", "go", "uv", "rustup",
];

const BLOCK_OPEN: &[&str] = &["if", "for", "while", "until", "case"];
const BLOCK_CLOSE: &[&str] = &["fi", "done", "esac"];
const CONTROL_WORDS: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "while", "until", "do", "done", "case", "esac",
];

fn is_filler(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn is_temp_path(path: &str) -> bool {
    path.starts_with("/tmp") || path.starts_with("/var/tmp") || path.starts_with("/dev/shm")
}

/// Reason a line references per-task state, if it does
fn per_task_reason(line: &str) -> Option<&'static str> {
    if TASK_MARKERS.iter().any(|m| line.contains(m)) {
        return Some("references a task identifier");
    }
    if line.contains("/tmp/") || line.contains("mktemp") {
        return Some("uses a temporary path");
    }

    let first = line.split_whitespace().next().unwrap_or("");
    match first {
        "cd" | "pushd" => Some("changes directory for the task"),
        "export" => Some("exports into the task environment"),
        "source" | "." => Some("sources into the task environment"),
        _ => None,
    }
}

/// Strip `sudo` and leading `VAR=value` assignments
fn command_words(line: &str) -> Vec<&str> {
    line.split_whitespace()
        .skip_while(|w| *w == "sudo" || (w.contains('=') && !w.starts_with('-')))
        .collect()
}

/// Target of the last `>` or `>>` redirection on the line
fn redirect_target(line: &str) -> Option<&str> {
    let idx = line.rfind('>')?;
    line[idx + 1..].split_whitespace().next()
}

/// Reason a line is safe to bake into an image, if it is
fn cache_stable_reason(line: &str) -> Option<&'static str> {
    let words = command_words(line);
    let (cmd, args) = words.split_first()?;
    let has = |w: &str| args.iter().any(|a| *a == w);

    if PACKAGE_MANAGERS.contains(cmd) {
        return Some("system package install");
    }
    if LANGUAGE_INSTALLERS.contains(cmd) && (has("install") || has("add") || has("toolchain")) {
        return Some("toolchain or package install");
    }
    if matches!(*cmd, "curl" | "wget") {
        return Some("download");
    }
    if *cmd == "git" && has("clone") {
        return Some("download");
    }
    if *cmd == "mkdir" {
        let paths: Vec<&&str> = args.iter().filter(|a| !a.starts_with('-')).collect();
        if !paths.is_empty() && paths.iter().all(|p| p.starts_with('/') && !is_temp_path(p)) {
            return Some("creates a static directory");
        }
    }
    if matches!(*cmd, "cat" | "echo" | "printf" | "tee") {
        let target = if *cmd == "tee" {
            args.iter().find(|a| !a.starts_with('-')).copied()
        } else {
            redirect_target(line)
        };
        if target.is_some_and(|t| t.starts_with('/') && !is_temp_path(t)) {
            return Some("writes a static file");
        }
    }
    if *cmd == "chmod" || (*cmd == "ln" && args.iter().any(|a| a.starts_with("-s"))) {
        return Some("static filesystem setup");
    }
    if matches!(*cmd, "useradd" | "groupadd" | "locale-gen" | "update-alternatives" | "update-ca-certificates") {
        return Some("system configuration");
    }
    None
}

fn classify_command(line: &str) -> (LineClass, &'static str) {
    if let Some(reason) = per_task_reason(line) {
        return (LineClass::PerTask, reason);
    }
    match cache_stable_reason(line) {
        Some(reason) => (LineClass::CacheStable, reason),
        None => (LineClass::PerTask, "unrecognized, kept at run time"),
    }
}

/// Delimiter of a heredoc opened on this line
fn heredoc_delimiter(line: &str) -> Option<String> {
    let idx = line.find("<<")?;
    if line[idx + 2..].starts_with('<') {
        // Here-string, no body follows
        return None;
    }
    let rest = line[idx + 2..].trim_start_matches('-').trim_start();
    let word = rest.split_whitespace().next()?;
    let word = word.trim_matches(|c| c == '\'' || c == '"');
    (!word.is_empty()).then(|| word.to_string())
}

fn control_depth_change(line: &str) -> i32 {
    let mut change = 0;
    for word in line.split(|c: char| c.is_whitespace() || c == ';') {
        if BLOCK_OPEN.contains(&word) {
            change += 1;
        } else if BLOCK_CLOSE.contains(&word) {
            change -= 1;
        }
    }
    change
}

fn is_control_line(line: &str) -> bool {
    line.split(|c: char| c.is_whitespace() || c == ';')
        .find(|w| !w.is_empty())
        .is_some_and(|w| CONTROL_WORDS.contains(&w))
}

/// Group lines that must stay together: continuations, heredocs and
/// control blocks.
fn logical_units(lines: &[&str]) -> Vec<std::ops::Range<usize>> {
    let mut units = vec![];
    let mut i = 0;
    while i < lines.len() {
        let start = i;
        let mut depth = control_depth_change(lines[i]).max(0);
        let mut heredoc = heredoc_delimiter(lines[i]);
        let mut continued = lines[i].trim_end().ends_with('\\');
        i += 1;

        while i < lines.len() && (depth > 0 || heredoc.is_some() || continued) {
            let line = lines[i];
            if let Some(delim) = &heredoc {
                if line.trim() == delim {
                    heredoc = None;
                }
            } else {
                depth += control_depth_change(line);
                if heredoc.is_none() {
                    heredoc = heredoc_delimiter(line);
                }
            }
            continued = heredoc.is_none() && line.trim_end().ends_with('\\');
            i += 1;
        }
        units.push(start..i);
    }
    units
}

/// Classify every line of `script`.
///
/// Blank and comment lines follow the line before them; leading ones are
/// treated as cache-stable.
pub fn classify(script: &str) -> Classification {
    let lines: Vec<&str> = script.lines().collect();
    let mut classified = Vec::with_capacity(lines.len());
    let mut previous = LineClass::CacheStable;

    for unit in logical_units(&lines) {
        let body = &lines[unit.clone()];
        let head = body[0];

        if body.len() == 1 && is_filler(head) {
            classified.push(ClassifiedLine {
                number: unit.start + 1,
                text: head.to_string(),
                class: previous,
                reason: "follows previous line",
            });
            continue;
        }

        let (class, reason) = if body.len() == 1 {
            classify_command(head)
        } else if is_control_line(head) {
            // A block bakes only if every command inside it would
            let commands: Vec<&str> = body
                .iter()
                .copied()
                .filter(|l| !is_filler(l) && !is_control_line(l))
                .collect();
            let all_stable = commands
                .iter()
                .all(|l| classify_command(l).0 == LineClass::CacheStable);
            if all_stable && !commands.is_empty() {
                (LineClass::CacheStable, "block of cache-stable commands")
            } else {
                (LineClass::PerTask, "block with per-task or unrecognized commands")
            }
        } else {
            let joined = body.join("\n");
            match per_task_reason(&joined) {
                Some(reason) => (LineClass::PerTask, reason),
                None => classify_command(head),
            }
        };

        for (offset, text) in body.iter().enumerate() {
            classified.push(ClassifiedLine {
                number: unit.start + offset + 1,
                text: text.to_string(),
                class,
                reason,
            });
        }
        previous = class;
    }

    Classification { lines: classified }
}

/// Flag cached-phase lines that reference per-task values
pub fn lint_cached(script: &str) -> Vec<PlanWarning> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| !is_filler(line))
        .filter_map(|(i, line)| {
            per_task_reason(line).map(|reason| PlanWarning {
                line: i + 1,
                text: line.to_string(),
                reason,
            })
        })
        .collect()
}
