//! The content-addressed blob storage port, used for step result payloads.

use async_trait::async_trait;
use qflow_core::Digest;

use crate::error::PortsError;

/// Content-addressed blob store: step output payloads are written once and
/// referenced everywhere else by their digest.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes`, returning its content digest. Writing the same bytes
    /// twice is a no-op that returns the same digest.
    async fn put(&self, bytes: Vec<u8>) -> Result<Digest, PortsError>;

    /// Fetch bytes previously stored under `digest`. `None` if absent.
    async fn get(&self, digest: Digest) -> Result<Option<Vec<u8>>, PortsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_object_safe(_: &dyn BlobStore) {}

    struct Noop;

    #[async_trait]
    impl BlobStore for Noop {
        async fn put(&self, bytes: Vec<u8>) -> Result<Digest, PortsError> {
            Ok(Digest::of(&bytes))
        }
        async fn get(&self, _digest: Digest) -> Result<Option<Vec<u8>>, PortsError> {
            Ok(None)
        }
    }

    #[test]
    fn is_object_safe() {
        assert_object_safe(&Noop);
    }

    #[tokio::test]
    async fn put_is_content_addressed() {
        let store = Noop;
        let digest = store.put(b"payload".to_vec()).await.unwrap();
        assert_eq!(digest, Digest::of(b"payload"));
    }
}
