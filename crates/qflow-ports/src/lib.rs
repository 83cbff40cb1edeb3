//! Port traits for every external collaborator the Qflow core depends on
//! but does not itself implement: flow/execution storage, task dispatch,
//! sandboxed module execution, fleet membership, and content-addressed
//! blob storage.
//!
//! Hexagonal ports-and-drivers: these traits are the seam between
//! "the engine" and "the surrounding distributed system." `qflow-runtime`
//! wires a concrete driver (in-process or eventually networked) behind
//! each one; nothing upstream of this crate knows or cares which.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod blob;
pub mod error;
pub mod execution;
pub mod flow;
pub mod membership;
pub mod queue;
pub mod sandbox;

pub use blob::BlobStore;
pub use error::PortsError;
pub use execution::ExecutionRepo;
pub use flow::FlowStore;
pub use membership::NodeMembership;
pub use queue::TaskQueue;
pub use sandbox::{ModuleInvocation, ModuleOutcome, SandboxRunner};
