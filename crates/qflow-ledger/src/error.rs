//! Crate-local error taxonomy, mapped onto [`qflow_error::QflowError`].

use qflow_core::{ExecutionId, LedgerRecordId};
use qflow_error::{ErrorKind, InfrastructureError, QflowError};
use thiserror::Error;

/// Errors raised by ledger append, validation, and replay.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// `append` was called with a `prev_hash` that does not match the
    /// current head of the chain — a concurrent writer won the race.
    #[error("execution {execution_id}: prev_hash mismatch, expected head {expected}, got {actual}")]
    PrevHashMismatch {
        /// The execution whose ledger was being appended to.
        execution_id: ExecutionId,
        /// The hash `append` expected as the chain head.
        expected: String,
        /// The hash actually supplied.
        actual: String,
    },

    /// A stored record's `record_hash` does not match the hash recomputed
    /// from its fields — the record was tampered with or corrupted.
    #[error("record {record_id} fails hash verification")]
    HashMismatch {
        /// The record that failed verification.
        record_id: LedgerRecordId,
    },

    /// A stored record's signature does not verify against its
    /// `record_hash`.
    #[error("record {record_id} fails signature verification")]
    SignatureInvalid {
        /// The record that failed verification.
        record_id: LedgerRecordId,
    },

    /// A record's vector clock did not advance relative to its
    /// predecessor on the same node, breaking causal consistency.
    #[error("record {record_id} vector clock did not advance for node {node_id}")]
    CausalViolation {
        /// The record with the non-monotonic clock.
        record_id: LedgerRecordId,
        /// The node whose clock entry failed to advance.
        node_id: String,
    },

    /// A replay session was advanced past its last record, or advanced
    /// without being started.
    #[error("no replay session in progress for execution {execution_id}")]
    NoActiveReplay {
        /// The execution that has no active replay session.
        execution_id: ExecutionId,
    },

    /// An imported ledger's record count does not match its declared
    /// length, or its records are not contiguous from genesis.
    #[error("imported ledger for execution {execution_id} is malformed: {detail}")]
    MalformedImport {
        /// The execution whose import failed.
        execution_id: ExecutionId,
        /// What was wrong with it.
        detail: String,
    },
}

impl From<LedgerError> for QflowError {
    fn from(err: LedgerError) -> Self {
        let detail = err.to_string();
        match &err {
            LedgerError::PrevHashMismatch { .. }
            | LedgerError::HashMismatch { .. }
            | LedgerError::SignatureInvalid { .. }
            | LedgerError::CausalViolation { .. } => QflowError::ledger_integrity(detail),
            LedgerError::NoActiveReplay { .. } | LedgerError::MalformedImport { .. } => {
                QflowError::new(ErrorKind::from(InfrastructureError::ReplayMismatch { detail }))
            }
        }
    }
}
