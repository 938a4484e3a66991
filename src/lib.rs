//! strata - layered build cache and per-task execution
//!
//! Expensive one-time setup is baked into content-addressed image layers;
//! each task then runs in its own workspace (checkout plus repository
//! context descriptor) on the cached image, with any setup that could not
//! be baked executed at task start.

pub mod audit;
pub mod cache;
pub mod checkout;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod layer;
pub mod orchestration;
pub mod preflight;
pub mod task;
pub mod ui;
pub mod workspace;

pub use error::{StrataError, StrataResult};
