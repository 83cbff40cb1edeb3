//! Per-node vector clocks for the execution ledger's causal ordering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// A vector clock mapping each node that has appended to a ledger chain to
/// its per-node monotonic counter.
///
/// `BTreeMap` keeps the canonical encoding byte-deterministic (sorted keys),
/// which the ledger's hash computation depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<NodeId, u64>);

impl VectorClock {
    /// An empty clock (no node has appended yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter recorded for `node`, or zero if it has never appended.
    #[must_use]
    pub fn get(&self, node: NodeId) -> u64 {
        self.0.get(&node).copied().unwrap_or(0)
    }

    /// Increment `node`'s counter and return the new clock.
    ///
    /// Strictly monotonic per node: the returned counter for `node` is
    /// always one greater than whatever [`VectorClock::get`] returned
    /// before the call.
    pub fn increment(&mut self, node: NodeId) -> u64 {
        let counter = self.0.entry(node).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Iterate `(node, counter)` pairs in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// `true` if every entry in `self` is `<=` the corresponding entry in
    /// `other` and at least one is strictly less — i.e. `self`
    /// happens-before `other`.
    #[must_use]
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        let mut strictly_less = false;
        for (node, count) in &self.0 {
            let other_count = other.get(*node);
            if *count > other_count {
                return false;
            }
            if *count < other_count {
                strictly_less = true;
            }
        }
        strictly_less
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_is_strictly_monotonic_per_node() {
        let node = NodeId::v4();
        let mut clock = VectorClock::new();
        assert_eq!(clock.get(node), 0);
        assert_eq!(clock.increment(node), 1);
        assert_eq!(clock.increment(node), 2);
        assert_eq!(clock.get(node), 2);
    }

    #[test]
    fn independent_nodes_have_independent_counters() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let mut clock = VectorClock::new();
        clock.increment(a);
        clock.increment(a);
        clock.increment(b);
        assert_eq!(clock.get(a), 2);
        assert_eq!(clock.get(b), 1);
    }

    #[test]
    fn happens_before_detects_causal_order() {
        let node = NodeId::v4();
        let mut earlier = VectorClock::new();
        earlier.increment(node);
        let mut later = earlier.clone();
        later.increment(node);
        assert!(earlier.happens_before(&later));
        assert!(!later.happens_before(&earlier));
    }

    #[test]
    fn identical_clocks_do_not_happen_before_each_other() {
        let node = NodeId::v4();
        let mut a = VectorClock::new();
        a.increment(node);
        let b = a.clone();
        assert!(!a.happens_before(&b));
    }

    #[test]
    fn serde_roundtrip_preserves_all_entries() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let mut clock = VectorClock::new();
        clock.increment(a);
        clock.increment(b);
        let json = serde_json::to_string(&clock).unwrap();
        let back: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(clock, back);
    }
}
