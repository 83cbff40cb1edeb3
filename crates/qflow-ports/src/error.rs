//! Error type shared by every port trait.

use std::time::Duration;

use thiserror::Error;

/// Faults a port implementation (a driver) can raise.
///
/// Deliberately smaller than [`qflow_error::QflowError`] — drivers convert
/// into the workspace error at the crate boundary that calls them, adding
/// whatever domain context it has.
#[derive(Debug, Clone, Error)]
pub enum PortsError {
    /// The entity did not exist in the backing store.
    #[error("{entity} {id} not found")]
    NotFound {
        /// e.g. `"flow"`, `"execution"`.
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },
    /// A compare-and-set write lost the race: the caller's expected version
    /// no longer matches what's stored.
    #[error("{entity} {id} version conflict: expected {expected_version}, found {actual_version}")]
    Conflict {
        /// e.g. `"execution"`, `"flow"`.
        entity: &'static str,
        /// The id whose CAS failed.
        id: String,
        /// The version the caller expected to overwrite.
        expected_version: u64,
        /// The version actually stored.
        actual_version: u64,
    },
    /// The backing store could not be reached.
    #[error("connection error: {0}")]
    Connection(String),
    /// A stored value failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The operation did not complete within its budget.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// What was being attempted.
        operation: String,
        /// How long it was given.
        duration: Duration,
    },
    /// The execution lease is held by another node.
    #[error("lease unavailable for execution {execution_id}")]
    LeaseUnavailable {
        /// The contended execution id.
        execution_id: String,
    },
    /// Anything else; the message is for logs, not for dispatch logic.
    #[error("internal port error: {0}")]
    Internal(String),
}

impl PortsError {
    /// Build a [`PortsError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Build a [`PortsError::Conflict`].
    #[must_use]
    pub fn conflict(
        entity: &'static str,
        id: impl Into<String>,
        expected_version: u64,
        actual_version: u64,
    ) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
            expected_version,
            actual_version,
        }
    }

    /// Build a [`PortsError::Timeout`].
    #[must_use]
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether a caller should expect retrying the same call to help —
    /// `true` only for faults in reaching the backing store, not for
    /// logical conflicts or not-founds.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for PortsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_and_timeout_are_retryable() {
        assert!(PortsError::Connection("down".into()).is_retryable());
        assert!(PortsError::timeout("acquire_lease", Duration::from_secs(1)).is_retryable());
        assert!(!PortsError::not_found("flow", "f1").is_retryable());
        assert!(!PortsError::conflict("execution", "e1", 3, 4).is_retryable());
    }

    #[test]
    fn display_includes_entity_and_id() {
        let err = PortsError::not_found("flow", "f1");
        assert_eq!(err.to_string(), "flow f1 not found");
    }

    #[test]
    fn conflict_display_includes_both_versions() {
        let err = PortsError::conflict("execution", "e1", 3, 4);
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains('4'));
    }
}
