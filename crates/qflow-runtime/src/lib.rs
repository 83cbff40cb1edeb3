//! The Qflow composition root.
//!
//! Wires the port-based [`qflow_execution::Engine`] together with concrete
//! drivers, the [`qflow_ledger::Ledger`], a [`qflow_ports::SandboxRunner`],
//! an optional [`qflow_validation::ValidationPipeline`], and the
//! [`qflow_adaptive::AdaptiveController`] behind one [`Qflow`] facade —
//! the Flow submission API and Execution API a surrounding REST/CLI layer
//! would call.
//!
//! - [`builder`] — [`builder::QflowBuilder`], the explicit construction
//!   order for every collaborator.
//! - [`config`] — [`config::EngineConfig`] and [`config::DataPassingPolicy`],
//!   the enumerated settings replacing `any`-typed config objects.
//! - [`runtime`] — [`Qflow`] itself.
//! - [`error`] — the crate-local [`error::RuntimeError`] taxonomy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod config;
pub mod error;
pub mod runtime;

pub use builder::QflowBuilder;
pub use config::{DataPassingPolicy, EngineConfig, FailureStrategy, LargeDataStrategy, ResourceAllocation};
pub use error::RuntimeError;
pub use runtime::{FlowSummary, FlowValidation, Qflow};
