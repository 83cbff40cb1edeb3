//! In-memory `FlowStore` driver.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use qflow_core::FlowId;
use qflow_ports::error::PortsError;
use qflow_ports::flow::FlowStore;

struct Entry {
    version: u64,
    document: serde_json::Value,
    order: usize,
}

/// In-memory, single-process [`FlowStore`]. Flow documents never leave
/// process memory, so this driver is only suitable for tests and
/// single-node deployments — durability across restarts is explicitly out
/// of scope for this crate.
#[derive(Default)]
pub struct MemoryFlowStore {
    entries: RwLock<HashMap<FlowId, Entry>>,
    next_order: std::sync::atomic::AtomicUsize,
}

impl MemoryFlowStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn get(&self, id: FlowId) -> Result<Option<(u64, serde_json::Value)>, PortsError> {
        Ok(self
            .entries
            .read()
            .get(&id)
            .map(|entry| (entry.version, entry.document.clone())))
    }

    async fn save(
        &self,
        id: FlowId,
        expected_version: u64,
        document: serde_json::Value,
    ) -> Result<(), PortsError> {
        let mut entries = self.entries.write();
        let actual_version = entries.get(&id).map_or(0, |entry| entry.version);
        if actual_version != expected_version {
            return Err(PortsError::conflict(
                "flow",
                id.to_string(),
                expected_version,
                actual_version,
            ));
        }
        let order = entries
            .get(&id)
            .map_or_else(|| self.next_order.fetch_add(1, std::sync::atomic::Ordering::Relaxed), |e| e.order);
        entries.insert(
            id,
            Entry {
                version: expected_version + 1,
                document,
                order,
            },
        );
        Ok(())
    }

    async fn delete(&self, id: FlowId) -> Result<bool, PortsError> {
        Ok(self.entries.write().remove(&id).is_some())
    }

    async fn list(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<(FlowId, serde_json::Value)>, PortsError> {
        let entries = self.entries.read();
        let mut all: Vec<_> = entries
            .iter()
            .map(|(id, entry)| (*id, entry.order, entry.document.clone()))
            .collect();
        all.sort_by_key(|(_, order, _)| *order);
        Ok(all
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(id, _, document)| (id, document))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = MemoryFlowStore::new();
        let id = FlowId::v4();
        store.save(id, 0, json!({"name": "v1"})).await.unwrap();
        let (version, doc) = store.get(id).await.unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(doc, json!({"name": "v1"}));
    }

    #[tokio::test]
    async fn save_with_stale_version_conflicts() {
        let store = MemoryFlowStore::new();
        let id = FlowId::v4();
        store.save(id, 0, json!({"name": "v1"})).await.unwrap();
        let err = store.save(id, 0, json!({"name": "v2"})).await.unwrap_err();
        assert!(matches!(err, PortsError::Conflict { .. }));
    }

    #[tokio::test]
    async fn list_preserves_insertion_order_and_paginates() {
        let store = MemoryFlowStore::new();
        let ids: Vec<_> = (0..3).map(|_| FlowId::v4()).collect();
        for id in &ids {
            store.save(*id, 0, json!({})).await.unwrap();
        }
        let page = store.list(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].0, ids[1]);
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let store = MemoryFlowStore::new();
        let id = FlowId::v4();
        store.save(id, 0, json!({})).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
        assert!(!store.delete(id).await.unwrap());
    }
}
