//! State-machine transition tables for executions and steps.
//!
//! Same idiom as the workspace's pre-existing `can_transition_execution`/
//! `can_transition_node` pure functions matched via `matches!` tuple
//! patterns, extended here to the flow-level statuses (§3) and the step
//! lifecycle already declared by [`qflow_flow::StepStatus`].

use qflow_flow::StepStatus;

use crate::error::ExecutionEngineError;
use crate::status::ExecutionStatus;

/// Returns `true` if the execution-level transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_execution(from: ExecutionStatus, to: ExecutionStatus) -> bool {
    matches!(
        (from, to),
        (ExecutionStatus::Pending, ExecutionStatus::Running)
            | (ExecutionStatus::Pending, ExecutionStatus::Aborted)
            | (ExecutionStatus::Running, ExecutionStatus::Paused)
            | (ExecutionStatus::Running, ExecutionStatus::Completed)
            | (ExecutionStatus::Running, ExecutionStatus::Failed)
            | (ExecutionStatus::Running, ExecutionStatus::Aborted)
            | (ExecutionStatus::Paused, ExecutionStatus::Running)
            | (ExecutionStatus::Paused, ExecutionStatus::Aborted)
    )
}

/// Validate an execution-level transition, returning an error if invalid.
pub fn validate_execution_transition(
    action: &str,
    from: ExecutionStatus,
    to: ExecutionStatus,
) -> Result<(), ExecutionEngineError> {
    if can_transition_execution(from, to) {
        Ok(())
    } else {
        Err(ExecutionEngineError::InvalidTransition {
            action: action.to_string(),
            from: from.to_string(),
        })
    }
}

/// Returns `true` if the step-level transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_step(from: StepStatus, to: StepStatus) -> bool {
    matches!(
        (from, to),
        (StepStatus::Pending, StepStatus::Ready)
            | (StepStatus::Pending, StepStatus::Skipped)
            | (StepStatus::Pending, StepStatus::Aborted)
            | (StepStatus::Ready, StepStatus::Dispatched)
            | (StepStatus::Ready, StepStatus::Skipped)
            | (StepStatus::Ready, StepStatus::Aborted)
            // a dispatched step whose chosen node never acknowledges is an
            // infrastructure fault: re-dispatch without consuming a business
            // retry attempt.
            | (StepStatus::Dispatched, StepStatus::Ready)
            | (StepStatus::Dispatched, StepStatus::Running)
            | (StepStatus::Dispatched, StepStatus::Aborted)
            | (StepStatus::Running, StepStatus::Completed)
            | (StepStatus::Running, StepStatus::Failed)
            | (StepStatus::Running, StepStatus::Aborted)
            // retry: re-enters the ready queue for re-dispatch.
            | (StepStatus::Failed, StepStatus::Ready)
            | (StepStatus::Failed, StepStatus::Aborted)
    )
}

/// Validate a step-level transition, returning an error if invalid.
pub fn validate_step_transition(
    from: StepStatus,
    to: StepStatus,
) -> Result<(), ExecutionEngineError> {
    if can_transition_step(from, to) {
        Ok(())
    } else {
        Err(ExecutionEngineError::InvalidTransition {
            action: format!("{to:?}"),
            from: format!("{from:?}"),
        })
    }
}
