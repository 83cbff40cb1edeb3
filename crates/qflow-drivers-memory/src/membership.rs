//! In-memory `NodeMembership` driver: a fixed candidate set plus a
//! heartbeat-timestamp liveness window.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use qflow_core::NodeId;
use qflow_ports::error::PortsError;
use qflow_ports::membership::NodeMembership;

/// In-memory fleet membership. Candidates are fixed at construction
/// (there is no gossip/discovery protocol behind this driver); liveness is
/// purely a function of how recently [`NodeMembership::observe_heartbeat`]
/// was called for a node.
pub struct MemoryMembership {
    candidates: Vec<NodeId>,
    heartbeats: RwLock<HashMap<NodeId, chrono::DateTime<Utc>>>,
    liveness_window: Duration,
}

impl MemoryMembership {
    /// Build membership over a fixed candidate set, with `liveness_window`
    /// as how long a node stays reachable after its last observed
    /// heartbeat.
    #[must_use]
    pub fn new(candidates: Vec<NodeId>, liveness_window: Duration) -> Self {
        Self {
            candidates,
            heartbeats: RwLock::new(HashMap::new()),
            liveness_window,
        }
    }
}

#[async_trait]
impl NodeMembership for MemoryMembership {
    async fn candidates(&self) -> Result<Vec<NodeId>, PortsError> {
        Ok(self.candidates.clone())
    }

    async fn observe_heartbeat(&self, node: NodeId) -> Result<(), PortsError> {
        self.heartbeats.write().insert(node, Utc::now());
        Ok(())
    }

    async fn is_reachable(&self, node: NodeId) -> Result<bool, PortsError> {
        let Some(last_seen) = self.heartbeats.read().get(&node).copied() else {
            return Ok(false);
        };
        let age = Utc::now().signed_duration_since(last_seen);
        Ok(age
            .to_std()
            .map(|age| age <= self.liveness_window)
            .unwrap_or(true))
    }
}
