//! The structured event envelope every topic carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::topic::Topic;

/// Envelope wrapping every event published on the bus.
///
/// Projections only — the ledger, not this envelope, is the source of
/// truth. Subscribers that need a durable record must read the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QflowEvent {
    /// Unique id for this event instance (not the entity it describes).
    pub event_id: Uuid,
    /// Stable topic name, `q.qflow.<domain>.<verb>.vN`.
    pub topic: String,
    /// Wall-clock time the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Node that emitted the event.
    pub source: String,
    /// Principal or node acting, when applicable (the dispatching node, the
    /// token's principal, ...).
    pub actor: Option<String>,
    /// Topic-specific payload.
    pub data: serde_json::Value,
}

impl QflowEvent {
    /// Build a new event for `topic`, stamping `event_id`/`timestamp`.
    ///
    /// `now` is injected rather than read from the clock so the event bus
    /// stays independent of wall-clock access at the call site; callers
    /// pass `Utc::now()` in production and a fixed instant in tests.
    #[must_use]
    pub fn new(topic: Topic, source: impl Into<String>, now: DateTime<Utc>, data: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            topic: topic.as_str().to_string(),
            timestamp: now,
            source: source.into(),
            actor: None,
            data,
        }
    }

    /// Attach an acting principal/node.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}
