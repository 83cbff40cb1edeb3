//! Content-addressing primitives shared across the ledger, validation
//! cache, and capability token subsystems.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-byte SHA-256 digest, hex-encoded on the wire.
///
/// Used as the payload digest in ledger records, the cache key component
/// in the validation cache, and the content address for blob storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// The all-zero digest used as the ledger's genesis `prevHash`.
    pub const GENESIS: Digest = Digest([0u8; 32]);

    /// Wrap a raw 32-byte digest.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary bytes with SHA-256.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        use sha2::{Digest as _, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(data);
        let out = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&out);
        Self(bytes)
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `true` for the all-zero genesis digest.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
