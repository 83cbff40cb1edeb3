//! The flow document store port.

use async_trait::async_trait;
use qflow_core::FlowId;

use crate::error::PortsError;

/// Persists registered flow documents.
///
/// `save` is optimistic-concurrency: the caller passes the version it last
/// read (`0` for a brand-new flow) and the store rejects the write with
/// [`PortsError::Conflict`] if a newer version has since been saved.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Fetch the current document and version for `id`, if it exists.
    async fn get(&self, id: FlowId) -> Result<Option<(u64, serde_json::Value)>, PortsError>;

    /// Create or update a flow document. `expected_version` must match the
    /// store's current version (`0` means "must not already exist").
    async fn save(
        &self,
        id: FlowId,
        expected_version: u64,
        document: serde_json::Value,
    ) -> Result<(), PortsError>;

    /// Remove a flow document. Returns `false` if it didn't exist.
    async fn delete(&self, id: FlowId) -> Result<bool, PortsError>;

    /// List flow ids and their current document, in storage order.
    async fn list(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<(FlowId, serde_json::Value)>, PortsError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_object_safe(_: &dyn FlowStore) {}

    struct Noop;

    #[async_trait]
    impl FlowStore for Noop {
        async fn get(&self, _id: FlowId) -> Result<Option<(u64, serde_json::Value)>, PortsError> {
            Ok(None)
        }
        async fn save(
            &self,
            _id: FlowId,
            _expected_version: u64,
            _document: serde_json::Value,
        ) -> Result<(), PortsError> {
            Ok(())
        }
        async fn delete(&self, _id: FlowId) -> Result<bool, PortsError> {
            Ok(false)
        }
        async fn list(
            &self,
            _offset: usize,
            _limit: usize,
        ) -> Result<Vec<(FlowId, serde_json::Value)>, PortsError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn is_object_safe() {
        assert_object_safe(&Noop);
    }

    #[tokio::test]
    async fn works_as_arc_dyn() {
        let store: Arc<dyn FlowStore> = Arc::new(Noop);
        assert!(store.get(FlowId::v4()).await.unwrap().is_none());
    }
}
