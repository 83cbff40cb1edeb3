//! Error types for the sandbox supervisor, capability tokens, and the WASM
//! host, and their conversion into the workspace-wide error taxonomy.

use thiserror::Error;

use crate::wasm::CancelOutcome;

/// Faults specific to loading or running a WASM module.
#[derive(Debug, Error)]
pub enum SandboxHostError {
    #[error("module is {size} bytes, exceeds the {max} byte cap")]
    ModuleTooLarge { size: usize, max: usize },
    #[error("module references a disallowed import: {0}")]
    DisallowedImport(String),
    #[error("module failed the security scan: score {score}, findings: {findings:?}")]
    ScanRejected { score: u8, findings: Vec<String> },
    #[error("module is invalid: {0}")]
    InvalidModule(String),
    #[error("wasmtime engine initialization failed: {0}")]
    EngineInit(String),
    #[error("module trapped during execution: {0}")]
    Trapped(String),
    #[error("module execution was cancelled: {0:?}")]
    Cancelled(CancelOutcome),
    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

impl From<SandboxHostError> for qflow_error::QflowError {
    fn from(err: SandboxHostError) -> Self {
        match err {
            SandboxHostError::DisallowedImport(detail) => qflow_error::QflowError::new(
                qflow_error::ErrorKind::from(qflow_error::SandboxError::SandboxViolation { detail }),
            ),
            SandboxHostError::Cancelled(CancelOutcome::Hard) => qflow_error::QflowError::new(
                qflow_error::ErrorKind::from(qflow_error::SandboxError::ResourceLimitExceeded {
                    resource: "wall_time".to_string(),
                }),
            ),
            SandboxHostError::InvalidConfig(detail) => qflow_error::QflowError::new(qflow_error::ErrorKind::from(
                qflow_error::InputError::InvalidType {
                    field: "sandbox_config".to_string(),
                    expected: "internally consistent SandboxConfig".to_string(),
                    actual: detail,
                },
            )),
            other => qflow_error::QflowError::new(qflow_error::ErrorKind::from(
                qflow_error::SandboxError::SandboxViolation {
                    detail: other.to_string(),
                },
            )),
        }
    }
}

impl From<SandboxHostError> for qflow_ports::PortsError {
    fn from(err: SandboxHostError) -> Self {
        qflow_ports::PortsError::Internal(err.to_string())
    }
}
