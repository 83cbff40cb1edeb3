//! The workspace-wide error type every public API returns.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kind::{
    AuthorizationError, ErrorKind, InfrastructureError, InputError, LookupError, SandboxError,
    StateError, ValidationError,
};

/// The error type returned from every Qflow crate's public API boundary.
///
/// Crates keep their own `thiserror`-derived local error enum for the
/// faults specific to what they do, and convert into `QflowError` via
/// `From` at the boundary — `QflowError` itself is the flattened,
/// cross-crate shape callers and the event bus deal in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QflowError {
    /// The specific kind/variant of error.
    pub kind: ErrorKind,
    /// Whether retrying the same call might succeed.
    pub retryable: bool,
    /// Suggested delay before retrying, if retryable.
    pub retry_after: Option<Duration>,
    /// Correlation id for cross-referencing with ledger/event-bus records.
    pub request_id: Option<String>,
    /// Human-readable message, safe to surface to a caller.
    pub message: String,
    /// Additional technical detail, not guaranteed stable across releases.
    pub details: Option<String>,
}

impl QflowError {
    /// Wrap a kind, deriving `retryable` and `message` from it.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        let retryable = kind.is_retryable();
        let message = kind.to_string();
        Self {
            kind,
            retryable,
            retry_after: None,
            request_id: None,
            message,
            details: None,
        }
    }

    /// Attach a request id for cross-correlation.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach technical detail.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Override retry info explicitly (e.g. a rate-limit error carrying a
    /// server-suggested backoff).
    #[must_use]
    pub fn with_retry_info(mut self, retryable: bool, retry_after: Option<Duration>) -> Self {
        self.retryable = retryable;
        self.retry_after = retry_after;
        self
    }

    /// `true` if this error must terminate the surrounding execution rather
    /// than retry or degrade.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// The stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    // -- convenience constructors, one per taxonomy entry in widest use --

    /// `INPUT::CIRCULAR_DEPENDENCY`
    #[must_use]
    pub fn circular_dependency(path: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(InputError::CircularDependency {
            path: path.into(),
        }))
    }

    /// `INPUT::PARSE_ERROR`
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(InputError::ParseError {
            message: message.into(),
        }))
    }

    /// `LOOKUP::FLOW_NOT_FOUND`
    #[must_use]
    pub fn flow_not_found(flow_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(LookupError::FlowNotFound {
            flow_id: flow_id.into(),
        }))
    }

    /// `LOOKUP::EXECUTION_NOT_FOUND`
    #[must_use]
    pub fn execution_not_found(execution_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(LookupError::ExecutionNotFound {
            execution_id: execution_id.into(),
        }))
    }

    /// `STATE::INVALID_TRANSITION`
    #[must_use]
    pub fn invalid_transition(action: impl Into<String>, from: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(StateError::InvalidTransition {
            action: action.into(),
            from: from.into(),
        }))
    }

    /// `AUTHORIZATION::CAPABILITY_DENIED`
    #[must_use]
    pub fn capability_denied(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(AuthorizationError::CapabilityDenied {
            reason: reason.into(),
        }))
    }

    /// `AUTHORIZATION::DAO_POLICY_DENY`
    #[must_use]
    pub fn dao_policy_deny(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(AuthorizationError::DaoPolicyDeny {
            reason: reason.into(),
        }))
    }

    /// `SANDBOX::ESCAPE_ATTEMPT`
    #[must_use]
    pub fn escape_attempt(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(SandboxError::EscapeAttempt {
            detail: detail.into(),
        }))
    }

    /// `VALIDATION::REQUIRED_LAYER_FAILED`
    #[must_use]
    pub fn required_layer_failed(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(ValidationError::RequiredLayerFailed {
            layer: layer.into(),
            reason: reason.into(),
        }))
    }

    /// `INFRASTRUCTURE::LEDGER_INTEGRITY`
    #[must_use]
    pub fn ledger_integrity(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(InfrastructureError::LedgerIntegrity {
            detail: detail.into(),
        }))
    }

    /// `INFRASTRUCTURE::NODE_UNREACHABLE`
    #[must_use]
    pub fn node_unreachable(node_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::from(InfrastructureError::NodeUnreachable {
            node_id: node_id.into(),
        }))
    }
}

impl fmt::Display for QflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for QflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for QflowError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_message_and_retryable_from_kind() {
        let err = QflowError::node_unreachable("node-1");
        assert!(err.retryable);
        assert_eq!(err.code(), "NODE_UNREACHABLE");
        assert!(err.message.contains("node-1"));
    }

    #[test]
    fn ledger_integrity_is_fatal_and_not_retryable() {
        let err = QflowError::ledger_integrity("chain broke at seq 42");
        assert!(err.is_fatal());
        assert!(!err.retryable);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = QflowError::flow_not_found("f-1").with_request_id("req-abc");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[FLOW_NOT_FOUND]"));
        assert_eq!(err.request_id.as_deref(), Some("req-abc"));
    }

    #[test]
    fn serde_roundtrip_preserves_kind_and_fields() {
        let err = QflowError::capability_denied("no matching token").with_details("token expired");
        let json = serde_json::to_string(&err).unwrap();
        let back: QflowError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code(), "CAPABILITY_DENIED");
        assert_eq!(back.details.as_deref(), Some("token expired"));
    }
}
