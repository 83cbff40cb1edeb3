//! Structured logging façade shared by every Qflow node process.
//!
//! Thin wrapper over `tracing` + `tracing-subscriber`: [`Config`] selects a
//! filter, output encoding, and target; [`LoggerBuilder`] builds and
//! installs the subscriber. Call sites log through `tracing`'s macros
//! directly (`tracing::info!(execution_id = %id, "..."`) — structured
//! fields, never string interpolation — this crate only owns subscriber
//! setup.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod config;
pub mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, Format, Writer};
pub use error::LogError;
