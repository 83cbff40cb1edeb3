//! In-memory content-addressed `BlobStore` driver.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use qflow_core::Digest;
use qflow_ports::blob::BlobStore;
use qflow_ports::error::PortsError;

/// In-memory content-addressed store. Writing the same bytes twice is a
/// no-op (the digest is already present); the second write's bytes are
/// simply discarded since they are, by construction, identical.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<Digest, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<Digest, PortsError> {
        let digest = Digest::of(&bytes);
        self.blobs.write().entry(digest).or_insert(bytes);
        Ok(digest)
    }

    async fn get(&self, digest: Digest) -> Result<Option<Vec<u8>>, PortsError> {
        Ok(self.blobs.read().get(&digest).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_content_addressed_and_idempotent() {
        let store = MemoryBlobStore::new();
        let digest_a = store.put(b"hello".to_vec()).await.unwrap();
        let digest_b = store.put(b"hello".to_vec()).await.unwrap();
        assert_eq!(digest_a, digest_b);
        assert_eq!(store.get(digest_a).await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn get_of_unknown_digest_is_none() {
        let store = MemoryBlobStore::new();
        assert!(store.get(Digest::GENESIS).await.unwrap().is_none());
    }
}
