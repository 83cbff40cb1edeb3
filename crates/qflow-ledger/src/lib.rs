//! The hash-chained, vector-clocked, signed execution ledger.
//!
//! - [`record`] — [`record::LedgerRecord`], the single append-only unit:
//!   hash-chained via `prev_hash`/`record_hash`, signed with HMAC-SHA256,
//!   vector-clocked for causal ordering across nodes.
//! - [`payload`] — [`payload::LedgerPayload`], what happened.
//! - [`ledger`] — [`ledger::Ledger`], the per-execution chain store:
//!   append, export/import, validation entry point.
//! - [`validate`] — whole-chain integrity/signature/causal-consistency
//!   checking, independent of any particular [`ledger::Ledger`] instance.
//! - [`replay`] — [`replay::ReplaySession`], deterministic record-by-record
//!   replay of an exported chain.
//! - [`error`] — the crate-local [`error::LedgerError`] taxonomy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ledger;
pub mod payload;
pub mod record;
pub mod replay;
pub mod validate;

pub use error::LedgerError;
pub use ledger::Ledger;
pub use payload::{Entry, LedgerPayload};
pub use record::LedgerRecord;
pub use replay::ReplaySession;
pub use validate::{ValidationReport, validate_chain};
