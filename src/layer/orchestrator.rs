//! Layer chain resolution
//!
//! Walks a chain base outward, reusing images whose key already exists and
//! building the rest. Resolution never fails: any runtime problem degrades
//! to an image that is safe to run, and the caller executes whatever could
//! not be baked at task start.

use crate::audit::{events, AuditLog};
use crate::cache::{compute_key, CacheKey, KeyParent};
use crate::config::{ChainFailurePolicy, Config, ConfigManager};
use crate::error::StrataError;
use crate::layer::chain::{BuildLayer, LayerChainSpec, LayerStatus, MAX_CHAIN_DEPTH};
use crate::layer::flight::{BuildFailure, BuildLock, BuildResult, SingleFlight};
use crate::layer::template::{self, LAYER_TEMPLATE, SCRIPT_NAME};
use crate::orchestration::{BuildRequest, ContainerRuntime, ImageInfo, OutputFn};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs for resolution
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Repository part of image tags
    pub namespace: String,
    /// Bound on one layer build, including waiting for the lock
    pub build_timeout: Duration,
    pub on_failure: ChainFailurePolicy,
    /// Lock directory for cross-process coordination, if enabled
    pub lock_dir: Option<PathBuf>,
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.runtime.namespace.clone(),
            build_timeout: Duration::from_secs(config.runtime.build_timeout_secs),
            on_failure: config.cache.on_failure,
            lock_dir: config
                .cache
                .cross_process_lock
                .then(ConfigManager::locks_dir),
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What went wrong while resolving a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    BuildFailed,
    BuildTimeout,
    /// The runtime could not answer whether the image exists, or could not
    /// inspect the base image
    RuntimeUnavailable,
    DepthExceeded,
}

/// Explanation of a fallback, meant for humans
#[derive(Debug, Clone, Serialize)]
pub struct Degradation {
    pub kind: DegradationKind,
    pub layer: String,
    pub key: Option<CacheKey>,
    pub detail: String,
    /// Image the task runs on instead
    pub fallback_image: String,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self
            .key
            .as_ref()
            .map(|k| format!(" ({})", k))
            .unwrap_or_default();
        let what = match self.kind {
            DegradationKind::BuildFailed => "failed to build",
            DegradationKind::BuildTimeout => "timed out while building",
            DegradationKind::RuntimeUnavailable => "could not be checked",
            DegradationKind::DepthExceeded => "exceeds the maximum chain depth",
        };
        write!(
            f,
            "layer '{}'{} {}: {}. Using {} and running the skipped setup at task start; startup will be slower",
            self.layer, key, what, self.detail, self.fallback_image
        )
    }
}

/// Result of [`LayerOrchestrator::resolve_image`]
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedImage {
    /// Image the task container should run
    pub image_ref: String,
    /// False when some cached setup was not baked and must run at task start
    pub used_cache: bool,
    pub layers: Vec<BuildLayer>,
    pub degradation: Option<Degradation>,
}

impl ResolvedImage {
    /// Cached scripts missing from `image_ref`, in chain order
    pub fn uncached_scripts(&self) -> Vec<&str> {
        self.layers
            .iter()
            .filter(|l| !l.baked && !l.is_noop())
            .map(|l| l.script.as_str())
            .collect()
    }
}

/// Resolves layer chains against a container runtime
#[derive(Clone)]
pub struct LayerOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    options: OrchestratorOptions,
    flights: SingleFlight,
    audit: AuditLog,
}

impl fmt::Debug for LayerOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerOrchestrator")
            .field("runtime", &self.runtime.runtime_name())
            .field("options", &self.options)
            .field("flights", &self.flights)
            .finish()
    }
}

impl LayerOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, options: OrchestratorOptions) -> Self {
        Self {
            runtime,
            options,
            flights: SingleFlight::new(),
            audit: AuditLog::disabled(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Resolve `chain`, sending build output to the debug log
    pub async fn resolve_image(&self, chain: &LayerChainSpec) -> ResolvedImage {
        let observer: Arc<OutputFn> = Arc::new(|line: String| debug!(target: "strata::build", "{}", line));
        self.resolve_image_with(chain, observer).await
    }

    /// Resolve `chain`, streaming build output to `on_output`.
    ///
    /// When this call joins a build another caller started, output goes to
    /// that caller's observer.
    pub async fn resolve_image_with(
        &self,
        chain: &LayerChainSpec,
        on_output: Arc<OutputFn>,
    ) -> ResolvedImage {
        let mut layers = Vec::with_capacity(chain.layers.len());
        let mut parent_ref = chain.base_image.clone();
        let mut parent_key: Option<CacheKey> = None;
        let mut base: Option<ImageInfo> = None;
        let mut degradation: Option<Degradation> = None;
        let mut halted = false;
        let mut depth = 0;

        for spec in &chain.layers {
            let mut layer = BuildLayer::new(spec, &parent_ref);

            if layer.is_noop() {
                debug!("Layer {} has nothing to bake", spec.name);
                layers.push(layer);
                continue;
            }
            if halted {
                layers.push(layer);
                continue;
            }
            if !spec.enabled {
                info!("Caching disabled for {}, its setup runs at task start", spec.name);
                halted = true;
                layers.push(layer);
                continue;
            }
            if depth == MAX_CHAIN_DEPTH {
                degradation = Some(Degradation {
                    kind: DegradationKind::DepthExceeded,
                    layer: spec.name.clone(),
                    key: None,
                    detail: format!("at most {} layers are baked", MAX_CHAIN_DEPTH),
                    fallback_image: parent_ref.clone(),
                });
                halted = true;
                layers.push(layer);
                continue;
            }
            depth += 1;

            // Keys follow the base's content id, not its tag
            let base_info = match base.clone() {
                Some(info) => info,
                None => match self.runtime.inspect_image(&chain.base_image).await {
                    Ok(info) => {
                        debug!("Base image {} is {}", chain.base_image, info.id);
                        base = Some(info.clone());
                        info
                    }
                    Err(e) => {
                        warn!("Could not inspect base image {}: {}", chain.base_image, e);
                        degradation = Some(Degradation {
                            kind: DegradationKind::RuntimeUnavailable,
                            layer: spec.name.clone(),
                            key: None,
                            detail: e.to_string(),
                            fallback_image: parent_ref.clone(),
                        });
                        halted = true;
                        layers.push(layer);
                        continue;
                    }
                },
            };

            let parent = match &parent_key {
                Some(key) => KeyParent::Layer(key),
                None => KeyParent::BaseImage(&base_info.id),
            };
            let key = compute_key(parent, &spec.script, LAYER_TEMPLATE);
            let tag = key.image_tag(&self.options.namespace);
            layer.key = Some(key.clone());

            match self.runtime.image_exists(&tag).await {
                Ok(true) => {
                    info!("Cache hit for {} ({})", spec.name, key);
                    layer.transition(LayerStatus::Ready);
                    layer.image_ref = Some(tag.clone());
                    self.audit
                        .log(events::LAYER_HIT, &serde_json::json!({"layer": spec.name, "key": key}))
                        .await;
                }
                Ok(false) => {
                    info!("Cache miss for {} ({}), building fresh", spec.name, key);
                    layer.transition(LayerStatus::Building);

                    let request = BuildRequest {
                        base_ref: parent_ref.clone(),
                        tag: tag.clone(),
                        instructions: template::render(&parent_ref, &key, &spec.name, &base_info.user),
                        context_files: vec![(SCRIPT_NAME.to_string(), spec.script.clone())],
                    };
                    match self.build_layer(&key, request, Arc::clone(&on_output)).await {
                        Ok(image) => {
                            layer.transition(LayerStatus::Ready);
                            layer.image_ref = Some(image);
                            self.audit
                                .log(events::LAYER_BUILT, &serde_json::json!({"layer": spec.name, "key": key}))
                                .await;
                        }
                        Err(failure) => {
                            layer.transition(LayerStatus::Failed);
                            let kind = match failure {
                                BuildFailure::TimedOut { .. } => DegradationKind::BuildTimeout,
                                BuildFailure::Failed(_) => DegradationKind::BuildFailed,
                            };
                            warn!("Build of layer {} ({}) failed: {}", spec.name, key, failure);
                            self.audit
                                .log(
                                    events::LAYER_FAILED,
                                    &serde_json::json!({
                                        "layer": spec.name,
                                        "key": key,
                                        "error": failure.to_string(),
                                    }),
                                )
                                .await;
                            degradation = Some(Degradation {
                                kind,
                                layer: spec.name.clone(),
                                key: Some(key.clone()),
                                detail: failure.to_string(),
                                fallback_image: parent_ref.clone(),
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("Could not query image {} for {}: {}", tag, spec.name, e);
                    degradation = Some(Degradation {
                        kind: DegradationKind::RuntimeUnavailable,
                        layer: spec.name.clone(),
                        key: Some(key.clone()),
                        detail: e.to_string(),
                        fallback_image: parent_ref.clone(),
                    });
                }
            }

            match &layer.image_ref {
                Some(image) if layer.status == LayerStatus::Ready => {
                    layer.baked = true;
                    parent_ref = image.clone();
                    parent_key = Some(key);
                }
                _ => halted = true,
            }
            layers.push(layer);
        }

        let failed = degradation
            .as_ref()
            .is_some_and(|d| d.kind != DegradationKind::DepthExceeded);
        if failed && self.options.on_failure == ChainFailurePolicy::BaseImage {
            for layer in &mut layers {
                layer.baked = false;
            }
            parent_ref = chain.base_image.clone();
            if let Some(d) = degradation.as_mut() {
                d.fallback_image = parent_ref.clone();
            }
        }

        let used_cache = layers.iter().all(|l| l.baked || l.is_noop());

        if let Some(d) = &degradation {
            warn!("{}", d);
            self.audit
                .log(events::CHAIN_DEGRADED, &serde_json::to_value(d).unwrap_or_default())
                .await;
        }

        ResolvedImage {
            image_ref: parent_ref,
            used_cache,
            layers,
            degradation,
        }
    }

    /// Build one layer, sharing the build with concurrent callers
    async fn build_layer(
        &self,
        key: &CacheKey,
        request: BuildRequest,
        on_output: Arc<OutputFn>,
    ) -> BuildResult {
        let runtime = Arc::clone(&self.runtime);
        let lock_dir = self.options.lock_dir.clone();
        let timeout = self.options.build_timeout;
        let owned_key = key.clone();

        self.flights
            .run(key, move || async move {
                let build = build_locked(runtime, request, lock_dir, owned_key, on_output);
                match tokio::time::timeout(timeout, build).await {
                    Ok(result) => result,
                    Err(_) => Err(BuildFailure::TimedOut {
                        secs: timeout.as_secs(),
                    }),
                }
            })
            .await
    }
}

/// Take the cross-process lock (if configured), re-check the image, then build
async fn build_locked(
    runtime: Arc<dyn ContainerRuntime>,
    request: BuildRequest,
    lock_dir: Option<PathBuf>,
    key: CacheKey,
    on_output: Arc<OutputFn>,
) -> BuildResult {
    let _lock = match &lock_dir {
        Some(dir) => match BuildLock::acquire(dir, &key).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!("Building {} without a cross-process lock: {}", key, e);
                None
            }
        },
        None => None,
    };

    // Another build of this key may have finished since the caller looked
    if let Ok(true) = runtime.image_exists(&request.tag).await {
        info!("Image {} appeared before its build started", request.tag);
        return Ok(request.tag);
    }

    runtime
        .build_image(&request, &*on_output)
        .await
        .map_err(|e| match e {
            StrataError::ImageBuild { .. } => BuildFailure::Failed(e.to_string()),
            other => BuildFailure::Failed(
                StrataError::ImageBuild {
                    tag: request.tag.clone(),
                    reason: other.to_string(),
                }
                .to_string(),
            ),
        })
}
