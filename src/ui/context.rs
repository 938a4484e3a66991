//! Terminal detection

use std::io::IsTerminal;

/// Variables whose presence means we are running under CI
const CI_MARKERS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    "TF_BUILD",
];

/// Set to force plain output even on a terminal
pub const PLAIN_ENV: &str = "STRATA_PLAIN";

/// How output should be rendered
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    fancy: bool,
}

impl UiContext {
    /// Fancy output only on an interactive terminal outside CI
    pub fn detect() -> Self {
        Self {
            fancy: detect_fancy(|name| std::env::var_os(name).is_some()),
        }
    }

    /// Plain line-oriented output
    pub fn plain() -> Self {
        Self { fancy: false }
    }

    /// Whether to draw spinners, bars and cliclack frames
    pub fn use_fancy_output(&self) -> bool {
        self.fancy
    }
}

fn detect_fancy(env_set: impl Fn(&str) -> bool) -> bool {
    if !std::io::stdout().is_terminal() || !std::io::stderr().is_terminal() {
        return false;
    }
    !env_set(PLAIN_ENV) && !CI_MARKERS.iter().any(|name| env_set(name))
}
