//! Node selection: which worker node should run a given step.
//!
//! [`qflow_ports::NodeMembership`] only tells us which nodes exist and
//! whether they're reachable — it carries no capability, load, or latency
//! data, because gossiping and aggregating that is a fleet concern outside
//! this crate's scope. Selection instead takes a snapshot of that data as
//! a plain argument, built by whatever's aggregating it (the composition
//! root, typically), and narrows it to the reachable candidate set the
//! membership port currently reports.

use std::collections::{HashMap, HashSet};

use qflow_core::NodeId;
use qflow_ports::NodeMembership;

use crate::error::ExecutionEngineError;

/// What's known about one node at selection time.
#[derive(Debug, Clone, Default)]
pub struct NodeProfile {
    pub capability_tags: HashSet<String>,
    pub dao_subnet: Option<String>,
    /// Fraction of the node's declared capacity currently in use, `0.0..=1.0`.
    pub current_load: f64,
    pub p95_latency_ms: u64,
}

/// What a step's dispatch needs from the node it lands on.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub required_capability: String,
    pub dao_subnet: Option<String>,
    /// Nodes to exclude — typically ones already tried and found
    /// unreachable for this same step.
    pub exclude: HashSet<NodeId>,
}

/// Pick the best eligible node from a known profile snapshot: filter by
/// capability tag and DAO subnet, then rank by lowest current load,
/// breaking ties by lowest observed p95 latency and finally by node id for
/// determinism.
#[must_use]
pub fn rank_candidates(
    candidates: &[NodeId],
    profiles: &HashMap<NodeId, NodeProfile>,
    request: &SelectionRequest,
) -> Vec<NodeId> {
    let mut eligible: Vec<NodeId> = candidates
        .iter()
        .copied()
        .filter(|id| !request.exclude.contains(id))
        .filter(|id| {
            profiles.get(id).is_some_and(|profile| {
                profile.capability_tags.contains(&request.required_capability)
                    && match (&request.dao_subnet, &profile.dao_subnet) {
                        (Some(wanted), Some(actual)) => wanted == actual,
                        (Some(_), None) => false,
                        (None, _) => true,
                    }
            })
        })
        .collect();

    eligible.sort_by(|a, b| {
        let pa = &profiles[a];
        let pb = &profiles[b];
        pa.current_load
            .partial_cmp(&pb.current_load)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(pa.p95_latency_ms.cmp(&pb.p95_latency_ms))
            .then(a.cmp(b))
    });

    eligible
}

/// Select a node for dispatch, consulting the membership port for current
/// reachability before returning it. Used both for initial placement and
/// for re-selection after a pre-acknowledgement dispatch failure (the
/// failed node should already be in `request.exclude`).
pub async fn select_node(
    membership: &dyn NodeMembership,
    profiles: &HashMap<NodeId, NodeProfile>,
    request: &SelectionRequest,
) -> Result<NodeId, ExecutionEngineError> {
    let candidates = membership.candidates().await?;
    let ranked = rank_candidates(&candidates, profiles, request);

    for node in ranked {
        if membership.is_reachable(node).await? {
            return Ok(node);
        }
    }

    Err(ExecutionEngineError::NoEligibleNode(qflow_core::StepId::nil()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qflow_ports::PortsError;

    fn profile(tag: &str, subnet: Option<&str>, load: f64, latency: u64) -> NodeProfile {
        NodeProfile {
            capability_tags: [tag.to_string()].into_iter().collect(),
            dao_subnet: subnet.map(str::to_string),
            current_load: load,
            p95_latency_ms: latency,
        }
    }

    fn request(capability: &str) -> SelectionRequest {
        SelectionRequest {
            required_capability: capability.to_string(),
            dao_subnet: None,
            exclude: HashSet::new(),
        }
    }

    #[test]
    fn filters_by_capability_tag() {
        let matching = NodeId::v4();
        let other = NodeId::v4();
        let mut profiles = HashMap::new();
        profiles.insert(matching, profile("crypto", None, 0.1, 10));
        profiles.insert(other, profile("mail", None, 0.0, 1));

        let ranked = rank_candidates(&[matching, other], &profiles, &request("crypto"));
        assert_eq!(ranked, vec![matching]);
    }

    #[test]
    fn ranks_by_lowest_load_then_lowest_latency() {
        let busy = NodeId::v4();
        let idle = NodeId::v4();
        let mut profiles = HashMap::new();
        profiles.insert(busy, profile("crypto", None, 0.8, 5));
        profiles.insert(idle, profile("crypto", None, 0.1, 50));

        let ranked = rank_candidates(&[busy, idle], &profiles, &request("crypto"));
        assert_eq!(ranked, vec![idle, busy]);
    }

    #[test]
    fn excluded_nodes_are_never_ranked() {
        let a = NodeId::v4();
        let mut profiles = HashMap::new();
        profiles.insert(a, profile("crypto", None, 0.0, 1));
        let mut req = request("crypto");
        req.exclude.insert(a);

        assert!(rank_candidates(&[a], &profiles, &req).is_empty());
    }

    #[test]
    fn dao_subnet_mismatch_excludes_node() {
        let a = NodeId::v4();
        let mut profiles = HashMap::new();
        profiles.insert(a, profile("crypto", Some("subnet-a"), 0.0, 1));
        let mut req = request("crypto");
        req.dao_subnet = Some("subnet-b".to_string());

        assert!(rank_candidates(&[a], &profiles, &req).is_empty());
    }

    struct TwoNodeMembership {
        reachable: NodeId,
        unreachable: NodeId,
    }

    #[async_trait]
    impl NodeMembership for TwoNodeMembership {
        async fn candidates(&self) -> Result<Vec<NodeId>, PortsError> {
            Ok(vec![self.unreachable, self.reachable])
        }
        async fn observe_heartbeat(&self, _node: NodeId) -> Result<(), PortsError> {
            Ok(())
        }
        async fn is_reachable(&self, node: NodeId) -> Result<bool, PortsError> {
            Ok(node == self.reachable)
        }
    }

    #[tokio::test]
    async fn select_node_skips_unreachable_candidates() {
        let reachable = NodeId::v4();
        let unreachable = NodeId::v4();
        let mut profiles = HashMap::new();
        profiles.insert(reachable, profile("crypto", None, 0.0, 1));
        profiles.insert(unreachable, profile("crypto", None, 0.0, 1));
        let membership = TwoNodeMembership {
            reachable,
            unreachable,
        };

        let selected = select_node(&membership, &profiles, &request("crypto"))
            .await
            .unwrap();
        assert_eq!(selected, reachable);
    }
}
