//! The ordered multi-layer validation pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use qflow_core::ValidationLayerId;
use serde_json::Value;

use crate::cache::{CacheKey, SignedCache};
use crate::layer::{LayerResult, LayerStatus, ValidationLayer};

/// One layer's contribution to a [`PipelineReport`].
#[derive(Debug, Clone)]
pub struct LayerOutcome {
    /// Which layer produced this.
    pub layer_id: ValidationLayerId,
    /// The verdict, cached or freshly computed.
    pub result: LayerResult,
    /// `true` if this verdict came from the [`SignedCache`] rather than a
    /// live call to [`ValidationLayer::validate`].
    pub from_cache: bool,
}

/// The pipeline's overall decision plus a per-layer breakdown.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// The worst status across every layer that ran (`Failed` >
    /// `Warning` > `Passed`), or `Passed` if no layer ran.
    pub overall_status: LayerStatus,
    /// One entry per layer that ran, in priority order.
    pub per_layer_results: Vec<LayerOutcome>,
    /// Wall-clock time spent across every layer.
    pub total_duration: Duration,
    /// Cache hits across every layer.
    pub cache_hits: u32,
    /// Cache misses across every layer.
    pub cache_misses: u32,
    /// `true` if a required layer failed and later layers were skipped.
    pub short_circuited: bool,
}

/// An ordered set of validation layers sharing one signed result cache.
pub struct ValidationPipeline {
    layers: Vec<Arc<dyn ValidationLayer>>,
    cache: SignedCache,
    policy_version: u32,
}

impl ValidationPipeline {
    /// Build a pipeline from an unordered set of layers, sorting them by
    /// priority once up front.
    #[must_use]
    pub fn new(mut layers: Vec<Arc<dyn ValidationLayer>>, cache: SignedCache, policy_version: u32) -> Self {
        layers.sort_by_key(|layer| layer.priority());
        Self {
            layers,
            cache,
            policy_version,
        }
    }

    /// The layers registered, in the priority order they run.
    #[must_use]
    pub fn layers(&self) -> &[Arc<dyn ValidationLayer>] {
        &self.layers
    }

    /// Run every layer against `data` in priority order.
    ///
    /// Unknown requested layers are not representable here (the pipeline
    /// only knows the layers it was built with) — skipping unregistered
    /// names is the caller's responsibility at the layer-selection step,
    /// matching the "unknown layers contribute nothing" rule.
    pub async fn validate(&self, data: &Value) -> PipelineReport {
        let started = Instant::now();
        let mut per_layer_results = Vec::with_capacity(self.layers.len());
        let mut overall_status = LayerStatus::Passed;
        let mut cache_hits = 0;
        let mut cache_misses = 0;
        let mut short_circuited = false;

        for layer in &self.layers {
            let key = CacheKey::new(layer.id(), self.policy_version, data);

            let (result, from_cache) = if layer.cacheable() {
                if let Some(cached) = self.cache.get(&key) {
                    cache_hits += 1;
                    (cached, true)
                } else {
                    cache_misses += 1;
                    let result = Self::run_with_timeout(layer.as_ref(), data).await;
                    self.cache.set(key, result.clone());
                    (result, false)
                }
            } else {
                (Self::run_with_timeout(layer.as_ref(), data).await, false)
            };

            if result.status > overall_status {
                overall_status = result.status;
            }

            let is_failure = result.status == LayerStatus::Failed;
            per_layer_results.push(LayerOutcome {
                layer_id: layer.id(),
                result,
                from_cache,
            });

            if is_failure && layer.required() {
                short_circuited = true;
                break;
            }
        }

        PipelineReport {
            overall_status,
            per_layer_results,
            total_duration: started.elapsed(),
            cache_hits,
            cache_misses,
            short_circuited,
        }
    }

    async fn run_with_timeout(layer: &dyn ValidationLayer, data: &Value) -> LayerResult {
        match tokio::time::timeout(layer.timeout(), layer.validate(data)).await {
            Ok(result) => result,
            Err(_) => LayerResult::failed("layer timed out", layer.timeout()),
        }
    }
}
