//! The hash-chained, signed, vector-clocked ledger record.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use qflow_core::{Digest, ExecutionId, LedgerRecordId, NodeId, StepId, VectorClock};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::payload::LedgerPayload;

type HmacSha256 = Hmac<Sha256>;

/// A single append-only ledger entry.
///
/// Every record's `record_hash` is computed from every other field,
/// including `prev_hash`, so the chain forms a Merkle list: altering any
/// past record invalidates every `record_hash` after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    /// Unique id of this record.
    pub id: LedgerRecordId,
    /// The execution this record belongs to.
    pub execution_id: ExecutionId,
    /// The step this record is about, or `None` for an execution-level
    /// event.
    pub step_id: Option<StepId>,
    /// Content digest of [`Self::payload`]'s canonical bytes.
    pub payload_digest: Digest,
    /// The event payload.
    pub payload: LedgerPayload,
    /// Who caused this record — a principal id, or the literal `"system"`
    /// for engine-driven events.
    pub actor: String,
    /// Which node appended this record.
    pub node_id: NodeId,
    /// When this record was appended.
    pub timestamp: DateTime<Utc>,
    /// The previous record's `record_hash`, or [`Digest::GENESIS`] for the
    /// first record in the chain.
    pub prev_hash: Digest,
    /// `SHA256(execution_id ∥ step_id ∥ payload_digest ∥ prev_hash ∥
    /// canonical(vector_clock) ∥ timestamp ∥ actor)`.
    pub record_hash: Digest,
    /// `HMAC-SHA256(ledger_key, record_hash)`.
    pub signature: Vec<u8>,
    /// The node's vector clock immediately after this record was appended.
    pub vector_clock: VectorClock,
}

impl LedgerRecord {
    /// Canonical bytes hashed into `record_hash`. Field order is fixed so
    /// the computation is reproducible from a stored record.
    fn hash_input(
        execution_id: ExecutionId,
        step_id: Option<StepId>,
        payload_digest: Digest,
        prev_hash: Digest,
        vector_clock: &VectorClock,
        timestamp: DateTime<Utc>,
        actor: &str,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(execution_id.to_string().as_bytes());
        buf.push(0);
        buf.extend_from_slice(step_id.map(|s| s.to_string()).unwrap_or_default().as_bytes());
        buf.push(0);
        buf.extend_from_slice(payload_digest.as_bytes());
        buf.extend_from_slice(prev_hash.as_bytes());
        for (node, counter) in vector_clock.iter() {
            buf.extend_from_slice(node.to_string().as_bytes());
            buf.extend_from_slice(&counter.to_be_bytes());
        }
        buf.extend_from_slice(timestamp.to_rfc3339().as_bytes());
        buf.extend_from_slice(actor.as_bytes());
        buf
    }

    /// Append a new record after `prev_hash`, signing it with `ledger_key`.
    ///
    /// The caller (the [`crate::ledger::Ledger`]) owns advancing
    /// `vector_clock` and choosing `prev_hash` — this constructor only
    /// computes the digest, hash, and signature from the fields it is
    /// given.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: ExecutionId,
        step_id: Option<StepId>,
        payload: LedgerPayload,
        actor: impl Into<String>,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
        prev_hash: Digest,
        vector_clock: VectorClock,
        ledger_key: &[u8],
    ) -> Self {
        let actor = actor.into();
        let payload_digest = Digest::of(&payload.canonical_bytes());
        let hash_input = Self::hash_input(
            execution_id,
            step_id,
            payload_digest,
            prev_hash,
            &vector_clock,
            timestamp,
            &actor,
        );
        let record_hash = Digest::of(&hash_input);
        let signature = sign(ledger_key, record_hash);

        Self {
            id: LedgerRecordId::v4(),
            execution_id,
            step_id,
            payload_digest,
            payload,
            actor,
            node_id,
            timestamp,
            prev_hash,
            record_hash,
            signature,
            vector_clock,
        }
    }

    /// Recompute `record_hash` from this record's own fields and compare
    /// against the stored value.
    #[must_use]
    pub fn hash_is_valid(&self) -> bool {
        let hash_input = Self::hash_input(
            self.execution_id,
            self.step_id,
            self.payload_digest,
            self.prev_hash,
            &self.vector_clock,
            self.timestamp,
            &self.actor,
        );
        Digest::of(&hash_input) == self.record_hash
    }

    /// Verify `signature` against `record_hash` under `ledger_key`, in
    /// constant time.
    #[must_use]
    pub fn signature_is_valid(&self, ledger_key: &[u8]) -> bool {
        let expected = sign(ledger_key, self.record_hash);
        expected.ct_eq(&self.signature).into()
    }
}

fn sign(ledger_key: &[u8], record_hash: Digest) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(ledger_key).expect("HMAC accepts any key length");
    mac.update(record_hash.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::LedgerPayload;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn genesis_record_chains_from_the_all_zero_digest() {
        let record = LedgerRecord::new(
            ExecutionId::v4(),
            None,
            LedgerPayload::ExecutionStarted { timestamp: ts() },
            "system",
            NodeId::v4(),
            ts(),
            Digest::GENESIS,
            VectorClock::new(),
            b"test-key",
        );
        assert!(record.prev_hash.is_genesis());
        assert!(record.hash_is_valid());
    }

    #[test]
    fn tampering_with_actor_invalidates_the_hash() {
        let mut record = LedgerRecord::new(
            ExecutionId::v4(),
            None,
            LedgerPayload::ExecutionStarted { timestamp: ts() },
            "alice",
            NodeId::v4(),
            ts(),
            Digest::GENESIS,
            VectorClock::new(),
            b"test-key",
        );
        assert!(record.hash_is_valid());
        record.actor = "mallory".to_string();
        assert!(!record.hash_is_valid());
    }

    #[test]
    fn signature_verifies_only_under_the_signing_key() {
        let record = LedgerRecord::new(
            ExecutionId::v4(),
            None,
            LedgerPayload::ExecutionStarted { timestamp: ts() },
            "system",
            NodeId::v4(),
            ts(),
            Digest::GENESIS,
            VectorClock::new(),
            b"correct-key",
        );
        assert!(record.signature_is_valid(b"correct-key"));
        assert!(!record.signature_is_valid(b"wrong-key"));
    }

    #[test]
    fn record_hash_changes_when_prev_hash_changes() {
        let node = NodeId::v4();
        let exec = ExecutionId::v4();
        let a = LedgerRecord::new(
            exec,
            None,
            LedgerPayload::ExecutionStarted { timestamp: ts() },
            "system",
            node,
            ts(),
            Digest::GENESIS,
            VectorClock::new(),
            b"k",
        );
        let b = LedgerRecord::new(
            exec,
            None,
            LedgerPayload::ExecutionStarted { timestamp: ts() },
            "system",
            node,
            ts(),
            Digest::of(b"some-other-head"),
            VectorClock::new(),
            b"k",
        );
        assert_ne!(a.record_hash, b.record_hash);
    }
}
