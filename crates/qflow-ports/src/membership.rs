//! The fleet membership/liveness port.
//!
//! The actual gossip protocol nodes use to discover and health-check each
//! other is out of scope; this port is the seam the execution engine's
//! node-selection and takeover logic is written against, backed here by a
//! static/in-memory driver for this scope.

use async_trait::async_trait;
use qflow_core::NodeId;

use crate::error::PortsError;

/// Observes which nodes exist and appear live.
#[async_trait]
pub trait NodeMembership: Send + Sync {
    /// Nodes currently considered eligible to take on new work.
    async fn candidates(&self) -> Result<Vec<NodeId>, PortsError>;

    /// Record a heartbeat observed from `node`, refreshing its liveness.
    async fn observe_heartbeat(&self, node: NodeId) -> Result<(), PortsError>;

    /// Whether `node`'s last heartbeat is still within the liveness window.
    async fn is_reachable(&self, node: NodeId) -> Result<bool, PortsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_object_safe(_: &dyn NodeMembership) {}

    struct Noop;

    #[async_trait]
    impl NodeMembership for Noop {
        async fn candidates(&self) -> Result<Vec<NodeId>, PortsError> {
            Ok(Vec::new())
        }
        async fn observe_heartbeat(&self, _node: NodeId) -> Result<(), PortsError> {
            Ok(())
        }
        async fn is_reachable(&self, _node: NodeId) -> Result<bool, PortsError> {
            Ok(true)
        }
    }

    #[test]
    fn is_object_safe() {
        assert_object_safe(&Noop);
    }
}
