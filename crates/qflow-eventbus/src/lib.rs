//! Structured, versioned event bus for flow and execution lifecycle events.
//!
//! Every state transition in the engine publishes a [`QflowEvent`] on a
//! stable [`Topic`] via [`EventBus`]. Delivery is broadcast, best-effort,
//! and fire-and-forget — the event bus is a projection surface for
//! observability and out-of-scope front-ends, never the system of record
//! (the execution ledger is).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod event;
pub mod topic;

pub use bus::{EventBus, EventSubscriber};
pub use event::QflowEvent;
pub use topic::Topic;
