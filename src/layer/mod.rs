//! Layered image cache
//!
//! A chain of cached layers (base, then desktop, then environment) is baked
//! into content-addressed images. Each layer's tag is derived from its
//! parent, its cached script and the build template, so an existing image
//! is reused as-is and a change anywhere below rebuilds everything above.

pub mod chain;
pub mod flight;
pub mod orchestrator;
pub mod template;

pub use chain::{
    BuildLayer, LayerChainSpec, LayerSpec, LayerStatus, DESKTOP_TIER, ENVIRONMENT_TIER,
    MAX_CHAIN_DEPTH,
};
pub use flight::{BuildFailure, BuildLock, SingleFlight};
pub use orchestrator::{
    Degradation, DegradationKind, LayerOrchestrator, OrchestratorOptions, ResolvedImage,
};
pub use template::LAYER_TEMPLATE;
