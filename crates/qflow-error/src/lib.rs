//! Workspace-wide error taxonomy.
//!
//! [`QflowError`] is the flattened error shape every public API returns.
//! Its [`ErrorKind`] groups faults by what kind of thing went wrong —
//! input, lookup, state, authorization, sandbox, validation,
//! infrastructure — not by which crate raised them. Individual crates keep
//! their own `thiserror` local error enum for crate-specific detail and
//! convert into this type at their API boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod kind;

pub use error::QflowError;
pub use kind::{
    AuthorizationError, ErrorKind, InfrastructureError, InputError, LookupError, SandboxError,
    StateError, ValidationError,
};

/// Convenience alias for fallible Qflow operations.
pub type Result<T> = std::result::Result<T, QflowError>;
