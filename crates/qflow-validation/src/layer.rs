//! A single pipeline layer: its verdict shape and the trait it implements.

use std::time::Duration;

use async_trait::async_trait;
use qflow_core::ValidationLayerId;
use serde_json::Value;

/// A layer's verdict on one piece of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerStatus {
    /// The layer approved the data outright.
    Passed,
    /// The layer has a concern but does not block the pipeline.
    Warning,
    /// The layer rejects the data.
    Failed,
}

/// What a layer decided, plus why.
#[derive(Debug, Clone)]
pub struct LayerResult {
    /// The verdict.
    pub status: LayerStatus,
    /// Human-readable detail, present for `Warning`/`Failed`.
    pub message: Option<String>,
    /// How long the layer took to decide.
    pub duration: Duration,
}

impl LayerResult {
    /// A passing verdict with no message.
    #[must_use]
    pub fn passed(duration: Duration) -> Self {
        Self {
            status: LayerStatus::Passed,
            message: None,
            duration,
        }
    }

    /// A warning verdict.
    #[must_use]
    pub fn warning(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: LayerStatus::Warning,
            message: Some(message.into()),
            duration,
        }
    }

    /// A failing verdict.
    #[must_use]
    pub fn failed(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: LayerStatus::Failed,
            message: Some(message.into()),
            duration,
        }
    }
}

/// One validation layer in the pipeline.
///
/// Layers are registered as `Arc<dyn ValidationLayer>` and sorted by
/// [`ValidationLayer::priority`] once, at pipeline-build time, not on
/// every call.
#[async_trait]
pub trait ValidationLayer: Send + Sync {
    /// Stable identity of this layer, used as part of the cache key.
    fn id(&self) -> ValidationLayerId;

    /// Sort key; lower runs first.
    fn priority(&self) -> u32;

    /// If `true`, a `Failed` verdict from this layer short-circuits the
    /// pipeline. If `false`, a `Failed` verdict degrades the overall
    /// status but does not stop later layers from running.
    fn required(&self) -> bool;

    /// How long the pipeline waits before treating this layer as failed.
    fn timeout(&self) -> Duration;

    /// Whether this layer's verdicts may be cached at all (some layers —
    /// e.g. ones that read live rate-limit state — must always run).
    fn cacheable(&self) -> bool {
        true
    }

    /// Run the layer's check against `data`.
    async fn validate(&self, data: &Value) -> LayerResult;
}
