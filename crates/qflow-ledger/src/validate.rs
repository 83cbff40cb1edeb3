//! Whole-chain validation: hash continuity, signatures, causal consistency.

use qflow_core::Digest;

use crate::record::LedgerRecord;

/// The result of validating a ledger chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// `true` only if every sub-check below passed.
    pub is_valid: bool,
    /// Every record's `prev_hash` matches its predecessor's `record_hash`,
    /// the first record's `prev_hash` is genesis, and every record's own
    /// `record_hash` reproduces from its fields.
    pub chain_integrity: bool,
    /// Every record's signature verifies under the ledger key.
    pub signature_validity: bool,
    /// Each node's vector-clock entries are non-decreasing across the
    /// chain in append order.
    pub causal_consistency: bool,
    /// Fatal problems found — any non-empty list implies `is_valid == false`.
    pub errors: Vec<String>,
    /// Non-fatal anomalies (e.g. an unexpected actor) worth surfacing but
    /// not invalidating the chain over.
    pub warnings: Vec<String>,
}

/// Validate a chain of records in append order against `ledger_key`.
///
/// An empty chain validates trivially (`is_valid == true`, all sub-checks
/// `true`): there is nothing to contradict.
#[must_use]
pub fn validate_chain(records: &[LedgerRecord], ledger_key: &[u8]) -> ValidationReport {
    let mut errors = Vec::new();
    let mut chain_integrity = true;
    let mut signature_validity = true;
    let mut causal_consistency = true;

    let mut expected_prev = Digest::GENESIS;
    let mut last_clock: std::collections::HashMap<qflow_core::NodeId, u64> =
        std::collections::HashMap::new();

    for (index, record) in records.iter().enumerate() {
        if record.prev_hash != expected_prev {
            chain_integrity = false;
            errors.push(format!(
                "record {} (index {index}): prev_hash does not match predecessor",
                record.id
            ));
        }

        if !record.hash_is_valid() {
            chain_integrity = false;
            errors.push(format!(
                "record {} (index {index}): record_hash does not reproduce from its fields",
                record.id
            ));
        }

        if !record.signature_is_valid(ledger_key) {
            signature_validity = false;
            errors.push(format!(
                "record {} (index {index}): signature does not verify",
                record.id
            ));
        }

        for (node, counter) in record.vector_clock.iter() {
            let previous = last_clock.get(&node).copied().unwrap_or(0);
            if counter < previous {
                causal_consistency = false;
                errors.push(format!(
                    "record {} (index {index}): vector clock for node {node} went backwards",
                    record.id
                ));
            }
            last_clock.insert(node, counter);
        }

        expected_prev = record.record_hash;
    }

    let is_valid = chain_integrity && signature_validity && causal_consistency;

    ValidationReport {
        is_valid,
        chain_integrity,
        signature_validity,
        causal_consistency,
        errors,
        warnings: Vec::new(),
    }
}
