//! Terminal output
//!
//! `cliclack` frames, `indicatif` bars and `console` styling on a
//! terminal, with plain tagged lines under CI or when output is piped.

mod context;
mod output;
mod progress;

pub use context::{UiContext, PLAIN_ENV};
pub use output::{
    intro, key_value, outro_error, outro_success, remark, section, step_info,
    step_ok, step_warn, step_warn_hint,
};
pub use progress::{BuildProgress, TaskSpinner};
