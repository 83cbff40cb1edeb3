//! Flow document model, two-encoding parser, and step dependency graph.
//!
//! - [`document`] — the normalized [`Flow`]/[`Step`] model with spec
//!   defaults (300s timeout, 3-attempt exponential-backoff retry).
//! - [`parse`] — format auto-detection plus the JSON-mapping and
//!   structured-text DSL parsers, producing a [`parse::ParseOutcome`].
//! - [`graph`] — the success/failure/dataflow dependency graph: cycle
//!   detection, entry/exit nodes, parallel-dispatch levels.
//! - [`error`] — the crate-local [`error::FlowError`] taxonomy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod document;
pub mod error;
pub mod graph;
pub mod parse;

pub use document::{
    Flow, FlowMetadata, ResourceLimits, RetryPolicy, Step, StepKind, StepStatus, Visibility,
};
pub use error::FlowError;
pub use graph::{DependencyGraph, EdgeKind};
pub use parse::{Format, ParseOutcome, detect_format, parse, validate_structure};
