//! Error taxonomy, grouped by kind rather than by call site.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed or self-inconsistent input (a flow document, a request body).
/// Never retryable — the caller must fix the input.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum InputError {
    /// The document could not be parsed under either supported encoding.
    #[error("parse error: {message}")]
    ParseError { message: String },
    /// A schema-required field was absent.
    #[error("required field missing: {field}")]
    RequiredFieldMissing { field: String },
    /// A field had the wrong JSON/DSL type.
    #[error("invalid type for {field}: expected {expected}, got {actual}")]
    InvalidType {
        field: String,
        expected: String,
        actual: String,
    },
    /// A dataflow or edge expression referenced a step id that doesn't exist.
    #[error("invalid step reference: {step_id}")]
    InvalidStepReference { step_id: String },
    /// The step graph contains a cycle over success/failure/dataflow edges.
    #[error("circular dependency: {path}")]
    CircularDependency { path: String },
    /// Two steps in the same flow share an id.
    #[error("duplicate step id: {step_id}")]
    DuplicateStepIds { step_id: String },
    /// A document's declared id did not match the id it was stored/fetched under.
    #[error("id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },
}

/// The referenced entity does not exist. Never retryable.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum LookupError {
    /// No flow with this id is registered.
    #[error("flow not found: {flow_id}")]
    FlowNotFound { flow_id: String },
    /// No execution with this id exists.
    #[error("execution not found: {execution_id}")]
    ExecutionNotFound { execution_id: String },
    /// No capability token with this id exists (or it has been revoked).
    #[error("token not found: {token_id}")]
    TokenNotFound { token_id: String },
    /// No module with this name/version is registered.
    #[error("module not found: {module}")]
    ModuleNotFound { module: String },
}

/// The requested transition is illegal from the entity's current state.
/// Never retryable — the caller must observe the current state first.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum StateError {
    /// e.g. pausing a non-running execution, resuming a non-paused one.
    #[error("invalid transition: cannot {action} from state {from}")]
    InvalidTransition { action: String, from: String },
    /// The entity already exists and cannot be created again.
    #[error("duplicate: {entity} {id} already exists")]
    Duplicate { entity: String, id: String },
}

/// The caller lacks permission, or a capability-bounded constraint rejected
/// the call. Never retryable as-is (a new token / narrower request is
/// required), but callers may legitimately retry after acquiring one.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AuthorizationError {
    /// No token presented, wrong capability, expired, or budget exhausted.
    #[error("capability denied: {reason}")]
    CapabilityDenied { reason: String },
    /// An argument fell outside the token's declared bound for that argument.
    #[error("argument bound violation: {argument} — {reason}")]
    ArgumentBoundViolation { argument: String, reason: String },
    /// The token's or subnet's rate limit was exceeded.
    #[error("rate limited: {limit} per {window:?}")]
    RateLimited { limit: u64, window: Duration },
    /// The governing DAO/subnet policy denied the call outright.
    #[error("DAO policy deny: {reason}")]
    DaoPolicyDeny { reason: String },
}

/// A sandboxed module violated its resource or security contract.
/// `EscapeAttempt` is fatal to the step; the others retry under the
/// infrastructure budget once the sandbox is torn down.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum SandboxError {
    /// CPU, memory, or wall-clock budget exceeded.
    #[error("resource limit exceeded: {resource}")]
    ResourceLimitExceeded { resource: String },
    /// The module attempted an operation outside its import allowlist.
    #[error("sandbox violation: {detail}")]
    SandboxViolation { detail: String },
    /// The module attempted to break out of its isolation boundary. Fatal.
    #[error("escape attempt detected: {detail}")]
    EscapeAttempt { detail: String },
}

/// A validation pipeline layer failed or misbehaved.
/// `RequiredLayerFailed` is fatal to the operation; the others degrade to a
/// recorded warning.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ValidationError {
    /// An optional layer returned a failing verdict.
    #[error("validation layer {layer} failed: {reason}")]
    LayerFailed { layer: String, reason: String },
    /// A layer did not respond within its budget.
    #[error("validation layer {layer} timed out")]
    LayerTimeout { layer: String },
    /// A required (non-skippable) layer failed.
    #[error("required validation layer {layer} failed: {reason}")]
    RequiredLayerFailed { layer: String, reason: String },
}

/// Faults in the surrounding distributed system rather than in business
/// logic. Retryable except `LedgerIntegrity`, which is fatal to the
/// execution.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum InfrastructureError {
    /// A node expected to be reachable (for takeover or dispatch) was not.
    #[error("node unreachable: {node_id}")]
    NodeUnreachable { node_id: String },
    /// A required resource (queue slot, sandbox pool) was unavailable.
    #[error("resource unavailable: {resource}")]
    ResourceUnavailable { resource: String },
    /// The ledger's hash chain failed verification. Fatal; quarantines the chain.
    #[error("ledger integrity violation: {detail}")]
    LedgerIntegrity { detail: String },
    /// Replaying the ledger did not reproduce the recorded terminal state.
    #[error("replay mismatch: {detail}")]
    ReplayMismatch { detail: String },
}

/// The top-level error kind, grouping the taxonomy above.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`InputError`].
    #[error(transparent)]
    Input(#[from] InputError),
    /// See [`LookupError`].
    #[error(transparent)]
    Lookup(#[from] LookupError),
    /// See [`StateError`].
    #[error(transparent)]
    State(#[from] StateError),
    /// See [`AuthorizationError`].
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    /// See [`SandboxError`].
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See [`InfrastructureError`].
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

impl ErrorKind {
    /// `true` for faults expected to clear up on their own (infrastructure
    /// faults other than ledger integrity).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Infrastructure(
                InfrastructureError::NodeUnreachable { .. }
                    | InfrastructureError::ResourceUnavailable { .. }
                    | InfrastructureError::ReplayMismatch { .. }
            )
        )
    }

    /// `true` for faults that must terminate the execution rather than retry
    /// or degrade: ledger quarantine and sandbox escape attempts.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::Infrastructure(InfrastructureError::LedgerIntegrity { .. })
                | ErrorKind::Sandbox(SandboxError::EscapeAttempt { .. })
                | ErrorKind::Validation(ValidationError::RequiredLayerFailed { .. })
        )
    }

    /// A short machine-readable code, `SCREAMING_SNAKE_CASE`, stable across
    /// releases — the taxonomy entries in the error design are literally
    /// these strings.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Input(InputError::ParseError { .. }) => "PARSE_ERROR",
            ErrorKind::Input(InputError::RequiredFieldMissing { .. }) => {
                "REQUIRED_FIELD_MISSING"
            }
            ErrorKind::Input(InputError::InvalidType { .. }) => "INVALID_TYPE",
            ErrorKind::Input(InputError::InvalidStepReference { .. }) => {
                "INVALID_STEP_REFERENCE"
            }
            ErrorKind::Input(InputError::CircularDependency { .. }) => "CIRCULAR_DEPENDENCY",
            ErrorKind::Input(InputError::DuplicateStepIds { .. }) => "DUPLICATE_STEP_IDS",
            ErrorKind::Input(InputError::IdMismatch { .. }) => "ID_MISMATCH",
            ErrorKind::Lookup(LookupError::FlowNotFound { .. }) => "FLOW_NOT_FOUND",
            ErrorKind::Lookup(LookupError::ExecutionNotFound { .. }) => "EXECUTION_NOT_FOUND",
            ErrorKind::Lookup(LookupError::TokenNotFound { .. }) => "TOKEN_NOT_FOUND",
            ErrorKind::Lookup(LookupError::ModuleNotFound { .. }) => "MODULE_NOT_FOUND",
            ErrorKind::State(StateError::InvalidTransition { .. }) => "INVALID_TRANSITION",
            ErrorKind::State(StateError::Duplicate { .. }) => "DUPLICATE",
            ErrorKind::Authorization(AuthorizationError::CapabilityDenied { .. }) => {
                "CAPABILITY_DENIED"
            }
            ErrorKind::Authorization(AuthorizationError::ArgumentBoundViolation { .. }) => {
                "ARGUMENT_BOUND_VIOLATION"
            }
            ErrorKind::Authorization(AuthorizationError::RateLimited { .. }) => "RATE_LIMITED",
            ErrorKind::Authorization(AuthorizationError::DaoPolicyDeny { .. }) => {
                "DAO_POLICY_DENY"
            }
            ErrorKind::Sandbox(SandboxError::ResourceLimitExceeded { .. }) => {
                "RESOURCE_LIMIT_EXCEEDED"
            }
            ErrorKind::Sandbox(SandboxError::SandboxViolation { .. }) => "SANDBOX_VIOLATION",
            ErrorKind::Sandbox(SandboxError::EscapeAttempt { .. }) => "ESCAPE_ATTEMPT",
            ErrorKind::Validation(ValidationError::LayerFailed { .. }) => "LAYER_FAILED",
            ErrorKind::Validation(ValidationError::LayerTimeout { .. }) => "LAYER_TIMEOUT",
            ErrorKind::Validation(ValidationError::RequiredLayerFailed { .. }) => {
                "REQUIRED_LAYER_FAILED"
            }
            ErrorKind::Infrastructure(InfrastructureError::NodeUnreachable { .. }) => {
                "NODE_UNREACHABLE"
            }
            ErrorKind::Infrastructure(InfrastructureError::ResourceUnavailable { .. }) => {
                "RESOURCE_UNAVAILABLE"
            }
            ErrorKind::Infrastructure(InfrastructureError::LedgerIntegrity { .. }) => {
                "LEDGER_INTEGRITY"
            }
            ErrorKind::Infrastructure(InfrastructureError::ReplayMismatch { .. }) => {
                "REPLAY_MISMATCH"
            }
        }
    }
}
