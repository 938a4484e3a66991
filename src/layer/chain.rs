//! Layer chain description and per-layer state

use crate::cache::{is_noop_script, CacheKey};
use crate::config::schema::CacheConfig;
use serde::Serialize;
use tracing::warn;

/// Most layers a chain may bake above its base image
pub const MAX_CHAIN_DEPTH: usize = 8;

/// Tier names in chain order
pub const DESKTOP_TIER: &str = "desktop";
pub const ENVIRONMENT_TIER: &str = "environment";

/// Build status of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Unbuilt,
    Building,
    Ready,
    Failed,
}

impl LayerStatus {
    /// Whether `self -> next` is a legal transition
    pub fn can_become(self, next: LayerStatus) -> bool {
        matches!(
            (self, next),
            (Self::Unbuilt, Self::Ready)
                | (Self::Unbuilt, Self::Building)
                | (Self::Building, Self::Ready)
                | (Self::Building, Self::Failed)
        )
    }
}

/// One requested layer
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub name: String,
    /// Cached-phase script
    pub script: String,
    /// False when configuration turns this tier off
    pub enabled: bool,
}

/// A base image plus the layers to bake on top of it, base outward
#[derive(Debug, Clone)]
pub struct LayerChainSpec {
    pub base_image: String,
    pub layers: Vec<LayerSpec>,
}

impl LayerChainSpec {
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            layers: vec![],
        }
    }

    /// Append a layer
    pub fn layer(mut self, name: impl Into<String>, script: impl Into<String>, enabled: bool) -> Self {
        self.layers.push(LayerSpec {
            name: name.into(),
            script: script.into(),
            enabled,
        });
        self
    }

    /// Standard chain: base, then desktop, then environment
    pub fn tiers(base_image: &str, cache: &CacheConfig, desktop: &str, environment: &str) -> Self {
        Self::new(base_image)
            .layer(DESKTOP_TIER, desktop, cache.tier_enabled(DESKTOP_TIER))
            .layer(ENVIRONMENT_TIER, environment, cache.tier_enabled(ENVIRONMENT_TIER))
    }
}

/// A layer as resolved by the orchestrator
#[derive(Debug, Clone, Serialize)]
pub struct BuildLayer {
    pub name: String,
    /// Image this layer is (or would be) built on
    pub parent: String,
    pub key: Option<CacheKey>,
    /// Valid only when `status` is `Ready`
    pub image_ref: Option<String>,
    pub status: LayerStatus,
    /// Whether the returned image contains this layer
    pub baked: bool,
    #[serde(skip)]
    pub script: String,
}

impl BuildLayer {
    pub(crate) fn new(spec: &LayerSpec, parent: &str) -> Self {
        Self {
            name: spec.name.clone(),
            parent: parent.to_string(),
            key: None,
            image_ref: None,
            status: LayerStatus::Unbuilt,
            baked: false,
            script: spec.script.clone(),
        }
    }

    /// Move to `next`, refusing illegal transitions
    pub(crate) fn transition(&mut self, next: LayerStatus) -> bool {
        if !self.status.can_become(next) {
            warn!(
                "Ignoring illegal layer transition {:?} -> {:?} for {}",
                self.status, next, self.name
            );
            return false;
        }
        self.status = next;
        true
    }

    /// True when there is nothing to bake
    pub fn is_noop(&self) -> bool {
        is_noop_script(&self.script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LayerSpec {
        LayerSpec {
            name: "environment".to_string(),
            script: "apt-get install -y git".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn legal_transitions() {
        let mut layer = BuildLayer::new(&spec(), "base");
        assert!(layer.transition(LayerStatus::Building));
        assert!(layer.transition(LayerStatus::Ready));
        assert!(!layer.transition(LayerStatus::Failed));
        assert_eq!(layer.status, LayerStatus::Ready);
    }

    #[test]
    fn no_transition_out_of_failed() {
        let mut layer = BuildLayer::new(&spec(), "base");
        layer.transition(LayerStatus::Building);
        layer.transition(LayerStatus::Failed);
        assert!(!layer.transition(LayerStatus::Ready));
        assert!(!layer.transition(LayerStatus::Building));
        assert_eq!(layer.status, LayerStatus::Failed);
    }

    #[test]
    fn unbuilt_cannot_fail_directly() {
        assert!(!LayerStatus::Unbuilt.can_become(LayerStatus::Failed));
    }

    #[test]
    fn tiers_follow_config() {
        let mut cache = CacheConfig::default();
        cache.desktop = false;
        let chain = LayerChainSpec::tiers("ubuntu:24.04", &cache, "apt-get install -y xfce4", "pip install ruff");

        assert_eq!(chain.layers.len(), 2);
        assert_eq!(chain.layers[0].name, DESKTOP_TIER);
        assert!(!chain.layers[0].enabled);
        assert!(chain.layers[1].enabled);
    }
}
