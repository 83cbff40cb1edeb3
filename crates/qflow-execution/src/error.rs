//! Execution-engine-local error type.

use qflow_core::{ExecutionId, FlowId, NodeId, StepId};
use qflow_error::{InfrastructureError, QflowError, StateError};
use thiserror::Error;

/// Errors raised while driving an execution.
#[derive(Debug, Error)]
pub enum ExecutionEngineError {
    /// No flow with this id/version is registered.
    #[error("flow not found: {0}")]
    FlowNotFound(FlowId),

    /// No execution with this id exists.
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// A state transition is not valid from the execution's current status.
    #[error("invalid transition: cannot {action} from {from}")]
    InvalidTransition { action: String, from: String },

    /// A referenced step does not exist in the flow's step graph.
    #[error("step not found: {0}")]
    StepNotFound(StepId),

    /// The flow's step graph failed structural validation.
    #[error("plan validation: {0}")]
    PlanValidation(String),

    /// This node lost (or never won) the compare-and-set race to drive an
    /// execution. The caller should back off and re-observe.
    #[error("lost takeover race for execution {0}")]
    LostTakeover(ExecutionId),

    /// The node currently assigned a step became unreachable before it
    /// acknowledged dispatch.
    #[error("node unreachable: {0}")]
    NodeUnreachable(NodeId),

    /// No membership candidate satisfies the step's selection constraints.
    #[error("no eligible node for step {0}")]
    NoEligibleNode(StepId),

    /// The underlying port returned an error.
    #[error("ports: {0}")]
    Ports(#[from] qflow_ports::error::PortsError),

    /// Serialization of persisted state failed.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ExecutionEngineError> for QflowError {
    fn from(err: ExecutionEngineError) -> Self {
        match &err {
            ExecutionEngineError::FlowNotFound(id) => {
                QflowError::flow_not_found(id.to_string())
            }
            ExecutionEngineError::ExecutionNotFound(id) => {
                QflowError::execution_not_found(id.to_string())
            }
            ExecutionEngineError::InvalidTransition { action, from } => {
                QflowError::invalid_transition(action.clone(), from.clone())
            }
            ExecutionEngineError::NodeUnreachable(node_id) => {
                QflowError::node_unreachable(node_id.to_string())
            }
            ExecutionEngineError::LostTakeover(exec_id) => QflowError::new(
                qflow_error::ErrorKind::from(StateError::InvalidTransition {
                    action: "takeover".to_string(),
                    from: format!("execution {exec_id}"),
                }),
            ),
            ExecutionEngineError::NoEligibleNode(_) => QflowError::new(qflow_error::ErrorKind::from(
                InfrastructureError::ResourceUnavailable {
                    resource: "eligible node".to_string(),
                },
            )),
            other => QflowError::new(qflow_error::ErrorKind::from(InfrastructureError::ReplayMismatch {
                detail: other.to_string(),
            })),
        }
        .with_details(err.to_string())
    }
}
