//! Deterministic replay of a recorded chain, record by record.
//!
//! Replay never re-derives state from anything but the ledger: the same
//! chain fed through the same step twice yields the same sequence of
//! records, which is what makes it useful for reconstructing an
//! execution's state after a crash or for audit.

use qflow_core::ExecutionId;

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::record::LedgerRecord;

/// A cursor over one execution's chain, advanced one record at a time.
#[derive(Debug)]
pub struct ReplaySession {
    execution_id: ExecutionId,
    records: Vec<LedgerRecord>,
    cursor: usize,
}

impl ReplaySession {
    /// Begin a replay session over `execution_id`'s full chain as it
    /// currently stands in `ledger`. The snapshot is taken at start time —
    /// records appended to the live ledger afterward are not observed by
    /// this session.
    #[must_use]
    pub fn start(ledger: &Ledger, execution_id: ExecutionId) -> Self {
        Self {
            execution_id,
            records: ledger.records(execution_id).to_vec(),
            cursor: 0,
        }
    }

    /// The execution this session is replaying.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// The next record in sequence, or `None` once every record has been
    /// returned.
    pub fn next_record(&mut self) -> Option<&LedgerRecord> {
        let record = self.records.get(self.cursor)?;
        self.cursor += 1;
        Some(record)
    }

    /// How many records remain.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.records.len() - self.cursor
    }

    /// `true` once every record has been consumed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.records.len()
    }

    /// Finish the session, asserting every record was consumed.
    ///
    /// Returns [`LedgerError::NoActiveReplay`] if the session was ended
    /// early — a half-finished replay cannot stand in for the execution's
    /// true terminal state.
    pub fn complete(self) -> Result<(), LedgerError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(LedgerError::NoActiveReplay {
                execution_id: self.execution_id,
            })
        }
    }
}
