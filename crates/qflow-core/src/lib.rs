//! Core identifiers, scope system, content-addressing, and vector clocks
//! shared by every other Qflow crate.
//!
//! - [`id`] — strongly-typed UUID newtypes (`FlowId`, `ExecutionId`, ...).
//! - [`scope`] — the `Global`/`Flow`/`Execution`/`Step` lifecycle hierarchy
//!   resources (sandboxes, tokens, cache entries) are bound to.
//! - [`digest`] — SHA-256 content addresses used by the ledger, the
//!   validation cache, and blob storage.
//! - [`vector_clock`] — per-node vector clocks backing the ledger's causal
//!   ordering across the fleet.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod digest;
pub mod id;
pub mod scope;
pub mod vector_clock;

pub use digest::Digest;
pub use id::{
    ExecutionId, FlowId, LedgerRecordId, NodeId, PrincipalId, SandboxId, StepId, TokenId,
    TriggerIdMarker, UuidParseError, ValidationLayerId,
};
pub use scope::{HasContext, ScopeLevel, Scoped};
pub use vector_clock::VectorClock;
