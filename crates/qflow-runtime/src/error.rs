//! Composition-root error type: wraps every collaborator's crate-local
//! error and adds the few faults that only exist at the wiring layer.

use qflow_error::{InfrastructureError, QflowError};
use thiserror::Error;

/// Errors raised by the [`crate::Qflow`] facade.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The supplied [`crate::config::EngineConfig`] is internally
    /// inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A step's output exceeded the configured data-passing limit and the
    /// policy is `Reject`.
    #[error("data limit exceeded: output {actual} bytes > limit {limit} bytes")]
    DataLimitExceeded {
        /// The configured ceiling.
        limit: u64,
        /// The output's actual serialized size.
        actual: u64,
    },

    /// Flow document parsing or structural validation failed.
    #[error("flow: {0}")]
    Flow(#[from] qflow_flow::FlowError),

    /// The execution engine rejected the operation.
    #[error("execution: {0}")]
    Execution(#[from] qflow_execution::ExecutionEngineError),

    /// The validation pipeline's verdict was `Failed`.
    #[error("validation: {0}")]
    Validation(QflowError),

    /// The ledger rejected an append (chain fork, integrity failure).
    #[error("ledger: {0}")]
    Ledger(#[from] qflow_ledger::LedgerError),

    /// A sandboxed module call faulted at the port boundary.
    #[error("sandbox: {0}")]
    Sandbox(#[from] qflow_ports::PortsError),

    /// The adaptive controller rejected a forced action.
    #[error("adaptive: {0}")]
    Adaptive(#[from] qflow_adaptive::AdaptiveError),
}

impl From<RuntimeError> for QflowError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::InvalidConfig(detail) => QflowError::new(qflow_error::ErrorKind::from(
                qflow_error::InputError::InvalidType {
                    field: "config".to_string(),
                    expected: "internally consistent EngineConfig".to_string(),
                    actual: detail.clone(),
                },
            ))
            .with_details(detail),
            RuntimeError::DataLimitExceeded { limit, actual } => {
                QflowError::new(qflow_error::ErrorKind::from(InfrastructureError::ResourceUnavailable {
                    resource: "data passing budget".to_string(),
                }))
                .with_details(format!("limit {limit} bytes, actual {actual} bytes"))
            }
            RuntimeError::Flow(err) => err.into(),
            RuntimeError::Execution(err) => err.into(),
            RuntimeError::Validation(err) => err,
            RuntimeError::Ledger(err) => err.into(),
            RuntimeError::Sandbox(err) => QflowError::new(qflow_error::ErrorKind::from(
                qflow_error::SandboxError::SandboxViolation {
                    detail: err.to_string(),
                },
            )),
            RuntimeError::Adaptive(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_limit_exceeded_maps_to_resource_unavailable() {
        let err: QflowError = RuntimeError::DataLimitExceeded { limit: 10, actual: 20 }.into();
        assert_eq!(err.code(), "RESOURCE_UNAVAILABLE");
    }

    #[test]
    fn invalid_config_maps_to_invalid_type() {
        let err: QflowError = RuntimeError::InvalidConfig("bad".to_string()).into();
        assert_eq!(err.code(), "INVALID_TYPE");
    }
}
