//! The append-only, hash-chained, signed execution ledger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use qflow_core::{Digest, ExecutionId, NodeId, VectorClock};

use crate::error::LedgerError;
use crate::payload::Entry;
use crate::record::LedgerRecord;
use crate::validate::ValidationReport;

/// The result of validating a ledger chain. See [`crate::validate`].
pub use crate::validate::validate_chain;

/// An in-memory, hash-chained ledger keyed by execution.
///
/// Appends are single-writer per execution: the caller is expected to hold
/// the execution's lease (via `qflow-ports::ExecutionRepo`) before calling
/// [`Ledger::append`], so there is no internal locking here beyond what a
/// single `&mut Ledger` borrow already provides.
#[derive(Debug, Default)]
pub struct Ledger {
    chains: HashMap<ExecutionId, Vec<LedgerRecord>>,
    clocks: HashMap<ExecutionId, VectorClock>,
    ledger_key: Vec<u8>,
}

impl Ledger {
    /// A new, empty ledger signing with `ledger_key`.
    #[must_use]
    pub fn new(ledger_key: impl Into<Vec<u8>>) -> Self {
        Self {
            chains: HashMap::new(),
            clocks: HashMap::new(),
            ledger_key: ledger_key.into(),
        }
    }

    /// The current chain head's `record_hash`, or [`Digest::GENESIS`] if no
    /// record has been appended for this execution yet.
    #[must_use]
    pub fn head(&self, execution_id: ExecutionId) -> Digest {
        self.chains
            .get(&execution_id)
            .and_then(|chain| chain.last())
            .map_or(Digest::GENESIS, |record| record.record_hash)
    }

    /// Append a new record to `execution_id`'s chain, chaining from
    /// whatever the current head happens to be.
    ///
    /// This is the convenience path for a writer that already holds the
    /// execution's lease and isn't racing anyone. A writer that needs to
    /// detect a concurrent takeover should use
    /// [`Ledger::append_expecting`] instead.
    pub fn append(
        &mut self,
        execution_id: ExecutionId,
        node_id: NodeId,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
        entry: Entry,
    ) -> Result<LedgerRecord, LedgerError> {
        let prev_hash = self.head(execution_id);
        self.append_expecting(execution_id, prev_hash, node_id, actor, timestamp, entry)
    }

    /// Append a new record only if `execution_id`'s current head is still
    /// `expected_prev_hash`.
    ///
    /// Mirrors the compare-and-swap the [`qflow-ports`][ports]
    /// `ExecutionRepo::transition` performs on the execution's state: a
    /// takeover node that lost the lease race will find the head has
    /// moved and get [`LedgerError::PrevHashMismatch`] instead of forking
    /// the chain.
    ///
    /// [ports]: https://docs.rs/qflow-ports
    #[allow(clippy::too_many_arguments)]
    pub fn append_expecting(
        &mut self,
        execution_id: ExecutionId,
        expected_prev_hash: Digest,
        node_id: NodeId,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
        entry: Entry,
    ) -> Result<LedgerRecord, LedgerError> {
        let actual = self.head(execution_id);
        if actual != expected_prev_hash {
            return Err(LedgerError::PrevHashMismatch {
                execution_id,
                expected: expected_prev_hash.to_string(),
                actual: actual.to_string(),
            });
        }

        let mut clock = self.clocks.get(&execution_id).cloned().unwrap_or_default();
        clock.increment(node_id);

        let record = LedgerRecord::new(
            execution_id,
            entry.step_id,
            entry.payload,
            actor,
            node_id,
            timestamp,
            expected_prev_hash,
            clock.clone(),
            &self.ledger_key,
        );

        self.chains
            .entry(execution_id)
            .or_default()
            .push(record.clone());
        self.clocks.insert(execution_id, clock);

        Ok(record)
    }

    /// Every record appended for `execution_id`, in append order.
    #[must_use]
    pub fn records(&self, execution_id: ExecutionId) -> &[LedgerRecord] {
        self.chains
            .get(&execution_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Validate `execution_id`'s chain: hash continuity, signature
    /// validity, and vector-clock causal consistency.
    #[must_use]
    pub fn validate(&self, execution_id: ExecutionId) -> ValidationReport {
        validate_chain(self.records(execution_id), &self.ledger_key)
    }

    /// Export `execution_id`'s full chain for transfer to another node
    /// (e.g. to seed a replica, or to hand an execution to a takeover
    /// node alongside its lease).
    #[must_use]
    pub fn export(&self, execution_id: ExecutionId) -> Vec<LedgerRecord> {
        self.records(execution_id).to_vec()
    }

    /// Import a previously exported chain, replacing any existing chain
    /// for the same execution id. Rejects chains that don't validate.
    pub fn import(
        &mut self,
        execution_id: ExecutionId,
        records: Vec<LedgerRecord>,
    ) -> Result<(), LedgerError> {
        let report = validate_chain(&records, &self.ledger_key);
        if !report.is_valid {
            return Err(LedgerError::MalformedImport {
                execution_id,
                detail: report.errors.join("; "),
            });
        }

        let clock = records
            .last()
            .map(|r| r.vector_clock.clone())
            .unwrap_or_default();

        self.chains.insert(execution_id, records);
        self.clocks.insert(execution_id, clock);
        Ok(())
    }
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
    fn first_append_chains_from_genesis() {
        let mut ledger = Ledger::new(b"k".to_vec());
        let exec = ExecutionId::v4();
        let node = NodeId::v4();
        let record = ledger
            .append(
                exec,
                node,
                "system",
                ts(),
                Entry::execution(LedgerPayload::ExecutionStarted { timestamp: ts() }),
            )
            .unwrap();
        assert!(record.prev_hash.is_genesis());
        assert_eq!(ledger.head(exec), record.record_hash);
    }

    #[test]
    fn successive_appends_chain_and_advance_the_clock() {
        let mut ledger = Ledger::new(b"k".to_vec());
        let exec = ExecutionId::v4();
        let node = NodeId::v4();
        let first = ledger
            .append(
                exec,
                node,
                "system",
                ts(),
                Entry::execution(LedgerPayload::ExecutionStarted { timestamp: ts() }),
            )
            .unwrap();
        let second = ledger
            .append(
                exec,
                node,
                "system",
                ts(),
                Entry::execution(LedgerPayload::ExecutionCompleted { timestamp: ts() }),
            )
            .unwrap();
        assert_eq!(second.prev_hash, first.record_hash);
        assert_eq!(second.vector_clock.get(node), 2);
    }

    #[test]
    fn append_expecting_rejects_a_stale_head_after_a_concurrent_takeover() {
        let mut ledger = Ledger::new(b"k".to_vec());
        let exec = ExecutionId::v4();
        let stale_head = ledger.head(exec);

        ledger
            .append(
                exec,
                NodeId::v4(),
                "winner",
                ts(),
                Entry::execution(LedgerPayload::TakeoverOccurred {
                    timestamp: ts(),
                    node_id: NodeId::v4(),
                    previous_node_id: None,
                }),
            )
            .unwrap();

        let result = ledger.append_expecting(
            exec,
            stale_head,
            NodeId::v4(),
            "loser",
            ts(),
            Entry::execution(LedgerPayload::ExecutionStarted { timestamp: ts() }),
        );
        assert!(matches!(
            result,
            Err(LedgerError::PrevHashMismatch { .. })
        ));
        assert_eq!(ledger.records(exec).len(), 1);
    }

    #[test]
    fn validate_reports_clean_chain_as_valid() {
        let mut ledger = Ledger::new(b"k".to_vec());
        let exec = ExecutionId::v4();
        let node = NodeId::v4();
        ledger
            .append(
                exec,
                node,
                "system",
                ts(),
                Entry::execution(LedgerPayload::ExecutionStarted { timestamp: ts() }),
            )
            .unwrap();
        let report = ledger.validate(exec);
        assert!(report.is_valid);
        assert!(report.chain_integrity);
        assert!(report.signature_validity);
        assert!(report.causal_consistency);
    }

    #[test]
    fn export_then_import_round_trips_into_a_fresh_ledger() {
        let mut source = Ledger::new(b"shared-key".to_vec());
        let exec = ExecutionId::v4();
        let node = NodeId::v4();
        source
            .append(
                exec,
                node,
                "system",
                ts(),
                Entry::execution(LedgerPayload::ExecutionStarted { timestamp: ts() }),
            )
            .unwrap();
        let exported = source.export(exec);

        let mut target = Ledger::new(b"shared-key".to_vec());
        target.import(exec, exported).unwrap();
        assert_eq!(target.head(exec), source.head(exec));
        assert!(target.validate(exec).is_valid);
    }

    #[test]
    fn import_rejects_a_chain_signed_under_a_different_key() {
        let mut source = Ledger::new(b"key-a".to_vec());
        let exec = ExecutionId::v4();
        source
            .append(
                exec,
                NodeId::v4(),
                "system",
                ts(),
                Entry::execution(LedgerPayload::ExecutionStarted { timestamp: ts() }),
            )
            .unwrap();
        let exported = source.export(exec);

        let mut target = Ledger::new(b"key-b".to_vec());
        assert!(target.import(exec, exported).is_err());
    }
}
