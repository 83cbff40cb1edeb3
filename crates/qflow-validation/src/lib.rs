//! The universal validation pipeline and its signed result cache.
//!
//! - [`layer`] — [`layer::ValidationLayer`], the async trait each pipeline
//!   stage implements, plus its [`layer::LayerResult`] verdict shape.
//! - [`cache`] — [`cache::SignedCache`], a content-addressed,
//!   policy-version-scoped, HMAC-signed cache of layer verdicts with LRU
//!   or LFU eviction.
//! - [`pipeline`] — [`pipeline::ValidationPipeline`], the priority-ordered
//!   runner: short-circuits on a required layer's failure, otherwise
//!   degrades the overall verdict and keeps going.
//! - [`error`] — conversion from a [`pipeline::PipelineReport`] into
//!   [`qflow_error::QflowError`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod layer;
pub mod pipeline;

pub use cache::{CacheConfig, CacheKey, CacheStats, EvictionStrategy, SignedCache};
pub use layer::{LayerResult, LayerStatus, ValidationLayer};
pub use pipeline::{LayerOutcome, PipelineReport, ValidationPipeline};
