//! Persistent execution and step state — the shape stored behind
//! `ExecutionRepo` and advanced under compare-and-set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use qflow_core::{ExecutionId, FlowId, NodeId, PrincipalId, StepId};
use qflow_flow::StepStatus;
use serde::{Deserialize, Serialize};

use crate::attempt::StepAttempt;
use crate::error::ExecutionEngineError;
use crate::output::StepOutput;
use crate::status::ExecutionStatus;
use crate::transition::{validate_execution_transition, validate_step_transition};

/// What triggered an execution and the context it carries throughout its
/// lifetime. Immutable once the execution starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrigger {
    pub principal: PrincipalId,
    pub trigger_type: String,
    pub input: serde_json::Value,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub dao_subnet: Option<String>,
    /// Opaque isolation-level tag consumed when a step's sandbox is
    /// created; this crate doesn't interpret it itself.
    pub isolation_level: String,
}

/// The execution state of a single step within a running flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionState {
    pub status: StepStatus,
    pub attempts: Vec<StepAttempt>,
    #[serde(default)]
    pub current_output: Option<StepOutput>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl StepExecutionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StepStatus::Pending,
            attempts: Vec::new(),
            current_output: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    #[must_use]
    pub fn latest_attempt(&self) -> Option<&StepAttempt> {
        self.attempts.last()
    }

    /// Transition to a new status, validating the transition against the
    /// step lifecycle table.
    pub fn transition_to(&mut self, new_status: StepStatus) -> Result<(), ExecutionEngineError> {
        validate_step_transition(self.status, new_status)?;
        self.status = new_status;

        match new_status {
            StepStatus::Ready => self.scheduled_at = Some(Utc::now()),
            StepStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            StepStatus::Completed | StepStatus::Failed | StepStatus::Aborted | StepStatus::Skipped => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Aborted | StepStatus::Skipped
        )
    }
}

impl Default for StepExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

/// The complete persisted state of one flow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: ExecutionId,
    pub flow_id: FlowId,
    pub status: ExecutionStatus,
    pub trigger: ExecutionTrigger,
    pub step_states: HashMap<StepId, StepExecutionState>,
    /// Ordered, prefix-preserving sequence of steps that have completed.
    pub completed_steps: Vec<StepId>,
    pub failed_steps: Vec<StepId>,
    /// `None` iff `status` is terminal.
    pub current_step: Option<StepId>,
    pub node_assignments: HashMap<StepId, NodeId>,
    /// Optimistic-concurrency version; bumped on every persisted change.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_retries: u32,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionState {
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        flow_id: FlowId,
        step_ids: &[StepId],
        trigger: ExecutionTrigger,
    ) -> Self {
        let now = Utc::now();
        let step_states = step_ids
            .iter()
            .map(|&id| (id, StepExecutionState::new()))
            .collect();

        Self {
            execution_id,
            flow_id,
            status: ExecutionStatus::Pending,
            trigger,
            step_states,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            current_step: None,
            node_assignments: HashMap::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            total_retries: 0,
            variables: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn step_state(&self, step_id: StepId) -> Option<&StepExecutionState> {
        self.step_states.get(&step_id)
    }

    #[must_use]
    pub fn all_steps_terminal(&self) -> bool {
        self.step_states.values().all(StepExecutionState::is_terminal)
    }

    /// Record a step's successful completion: moves it from `node_assignments`
    /// bookkeeping into `completed_steps`, preserving completion order.
    pub fn mark_step_completed(&mut self, step_id: StepId) {
        if !self.completed_steps.contains(&step_id) {
            self.completed_steps.push(step_id);
        }
    }

    pub fn mark_step_failed(&mut self, step_id: StepId) {
        if !self.failed_steps.contains(&step_id) {
            self.failed_steps.push(step_id);
        }
    }

    /// Transition the execution status, validating and bumping the version.
    pub fn transition_status(
        &mut self,
        action: &str,
        new_status: ExecutionStatus,
    ) -> Result<(), ExecutionEngineError> {
        validate_execution_transition(action, self.status, new_status)?;
        self.status = new_status;
        self.version += 1;
        self.updated_at = Utc::now();

        if new_status == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
            self.current_step = None;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> ExecutionTrigger {
        ExecutionTrigger {
            principal: PrincipalId::v4(),
            trigger_type: "manual".to_string(),
            input: serde_json::json!({}),
            permissions: vec![],
            dao_subnet: None,
            isolation_level: "isolated".to_string(),
        }
    }

    fn make_state() -> (ExecutionState, StepId, StepId) {
        let s1 = StepId::v4();
        let s2 = StepId::v4();
        let state = ExecutionState::new(ExecutionId::v4(), FlowId::v4(), &[s1, s2], trigger());
        (state, s1, s2)
    }

    #[test]
    fn new_execution_state_starts_pending() {
        let (state, s1, _s2) = make_state();
        assert_eq!(state.status, ExecutionStatus::Pending);
        assert_eq!(state.version, 0);
        assert_eq!(
            state.step_state(s1).unwrap().status,
            StepStatus::Pending
        );
    }

    #[test]
    fn step_transition_sets_timestamps() {
        let mut step = StepExecutionState::new();
        step.transition_to(StepStatus::Ready).unwrap();
        assert!(step.scheduled_at.is_some());
        step.transition_to(StepStatus::Dispatched).unwrap();
        step.transition_to(StepStatus::Running).unwrap();
        assert!(step.started_at.is_some());
        step.transition_to(StepStatus::Completed).unwrap();
        assert!(step.completed_at.is_some());
        assert!(step.is_terminal());
    }

    #[test]
    fn invalid_step_transition_errors() {
        let mut step = StepExecutionState::new();
        assert!(step.transition_to(StepStatus::Completed).is_err());
    }

    #[test]
    fn transition_status_bumps_version_and_sets_started_at() {
        let (mut state, _s1, _s2) = make_state();
        state
            .transition_status("start", ExecutionStatus::Running)
            .unwrap();
        assert_eq!(state.version, 1);
        assert!(state.started_at.is_some());
    }

    #[test]
    fn terminal_transition_clears_current_step() {
        let (mut state, s1, _s2) = make_state();
        state.current_step = Some(s1);
        state
            .transition_status("start", ExecutionStatus::Running)
            .unwrap();
        state
            .transition_status("complete", ExecutionStatus::Completed)
            .unwrap();
        assert!(state.current_step.is_none());
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn invalid_transition_does_not_bump_version() {
        let (mut state, _s1, _s2) = make_state();
        let err = state
            .transition_status("complete", ExecutionStatus::Completed)
            .unwrap_err();
        assert!(err.to_string().contains("complete"));
        assert_eq!(state.version, 0);
    }

    #[test]
    fn mark_step_completed_is_append_only_and_idempotent() {
        let (mut state, s1, _s2) = make_state();
        state.mark_step_completed(s1);
        state.mark_step_completed(s1);
        assert_eq!(state.completed_steps, vec![s1]);
    }

    #[test]
    fn serde_roundtrip() {
        let (state, _s1, _s2) = make_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.execution_id, state.execution_id);
        assert_eq!(back.step_states.len(), state.step_states.len());
    }
}
