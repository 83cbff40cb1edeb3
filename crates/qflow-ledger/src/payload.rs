//! The event payload carried by each ledger record.

use chrono::{DateTime, Utc};
use qflow_core::{NodeId, StepId};
use serde::{Deserialize, Serialize};

/// What happened, recorded inside a [`crate::record::LedgerRecord`].
///
/// Generalizes the execution engine's journal entries into ledger payload
/// shape: a flow-level event (no `step_id` on the record) or a step-level
/// event (the record's `step_id` names the step this payload is about).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerPayload {
    /// The execution was started.
    ExecutionStarted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
    },

    /// A step was scheduled for dispatch to a node.
    StepScheduled {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node the step was scheduled on.
        node_id: NodeId,
    },

    /// A step started executing.
    StepStarted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node executing the step.
        node_id: NodeId,
        /// Which attempt number (0-indexed).
        attempt: u32,
    },

    /// A step completed successfully.
    StepCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that completed the step.
        node_id: NodeId,
        /// Output size in bytes.
        output_bytes: u64,
    },

    /// A step failed.
    StepFailed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that observed the failure.
        node_id: NodeId,
        /// Error message.
        error: String,
    },

    /// A step was skipped (its condition did not hold, or an upstream
    /// branch was not taken).
    StepSkipped {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Reason for skipping.
        reason: String,
    },

    /// A step is being retried after a failed attempt.
    StepRetrying {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node the retry is scheduled on.
        node_id: NodeId,
        /// Which attempt is about to run (0-indexed).
        attempt: u32,
    },

    /// Ownership of the execution moved to a new node (orphan takeover).
    TakeoverOccurred {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that took over.
        node_id: NodeId,
        /// The node whose lease expired, if known.
        previous_node_id: Option<NodeId>,
    },

    /// The entire execution completed successfully.
    ExecutionCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
    },

    /// The entire execution failed.
    ExecutionFailed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Error message.
        error: String,
    },

    /// A cancellation was requested.
    CancellationRequested {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Reason for cancellation.
        reason: String,
    },
}

impl LedgerPayload {
    /// The timestamp carried by every variant.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ExecutionStarted { timestamp }
            | Self::StepScheduled { timestamp, .. }
            | Self::StepStarted { timestamp, .. }
            | Self::StepCompleted { timestamp, .. }
            | Self::StepFailed { timestamp, .. }
            | Self::StepSkipped { timestamp, .. }
            | Self::StepRetrying { timestamp, .. }
            | Self::TakeoverOccurred { timestamp, .. }
            | Self::ExecutionCompleted { timestamp }
            | Self::ExecutionFailed { timestamp, .. }
            | Self::CancellationRequested { timestamp, .. } => *timestamp,
        }
    }

    /// `true` for payloads that describe a single step rather than the
    /// whole execution.
    #[must_use]
    pub fn is_step_event(&self) -> bool {
        matches!(
            self,
            Self::StepScheduled { .. }
                | Self::StepStarted { .. }
                | Self::StepCompleted { .. }
                | Self::StepFailed { .. }
                | Self::StepSkipped { .. }
                | Self::StepRetrying { .. }
        )
    }

    /// Canonical bytes fed into the payload digest and, in turn, the
    /// record hash. Uses the same JSON encoding as the wire format so the
    /// digest is reproducible from a stored record.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("LedgerPayload serializes infallibly")
    }
}

/// A step-scoped payload paired with the step it is about, used by
/// [`crate::ledger::Ledger::append`] to populate a record's `step_id`.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The step this payload concerns, or `None` for an execution-level
    /// event.
    pub step_id: Option<StepId>,
    /// The payload itself.
    pub payload: LedgerPayload,
}

impl Entry {
    /// An execution-level entry (no associated step).
    #[must_use]
    pub fn execution(payload: LedgerPayload) -> Self {
        Self {
            step_id: None,
            payload,
        }
    }

    /// A step-scoped entry.
    #[must_use]
    pub fn step(step_id: StepId, payload: LedgerPayload) -> Self {
        Self {
            step_id: Some(step_id),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn step_events_are_distinguished_from_execution_events() {
        let step = LedgerPayload::StepStarted {
            timestamp: ts(),
            node_id: NodeId::v4(),
            attempt: 0,
        };
        let exec = LedgerPayload::ExecutionStarted { timestamp: ts() };
        assert!(step.is_step_event());
        assert!(!exec.is_step_event());
    }

    #[test]
    fn canonical_bytes_are_deterministic() {
        let a = LedgerPayload::ExecutionStarted { timestamp: ts() };
        let b = LedgerPayload::ExecutionStarted { timestamp: ts() };
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn serde_roundtrip_all_variants() {
        let nid = NodeId::v4();
        let entries = vec![
            LedgerPayload::ExecutionStarted { timestamp: ts() },
            LedgerPayload::StepScheduled {
                timestamp: ts(),
                node_id: nid,
            },
            LedgerPayload::StepStarted {
                timestamp: ts(),
                node_id: nid,
                attempt: 0,
            },
            LedgerPayload::StepCompleted {
                timestamp: ts(),
                node_id: nid,
                output_bytes: 512,
            },
            LedgerPayload::StepFailed {
                timestamp: ts(),
                node_id: nid,
                error: "err".into(),
            },
            LedgerPayload::StepSkipped {
                timestamp: ts(),
                reason: "skip".into(),
            },
            LedgerPayload::StepRetrying {
                timestamp: ts(),
                node_id: nid,
                attempt: 1,
            },
            LedgerPayload::TakeoverOccurred {
                timestamp: ts(),
                node_id: nid,
                previous_node_id: None,
            },
            LedgerPayload::ExecutionCompleted { timestamp: ts() },
            LedgerPayload::ExecutionFailed {
                timestamp: ts(),
                error: "fatal".into(),
            },
            LedgerPayload::CancellationRequested {
                timestamp: ts(),
                reason: "shutdown".into(),
            },
        ];

        for entry in &entries {
            let json = serde_json::to_string(entry).unwrap();
            let back: LedgerPayload = serde_json::from_str(&json).unwrap();
            assert_eq!(entry.timestamp(), back.timestamp());
        }
    }
}
