//! Step advancement: which pending steps just became ready or unreachable,
//! and which of the ready steps may be dispatched in the same parallel
//! batch.

use std::collections::HashMap;

use qflow_core::StepId;
use qflow_flow::{EdgeKind, Step, StepStatus};

use crate::plan::ExecutionPlan;
use crate::state::ExecutionState;

/// What an inbound edge resolves to, given its predecessor's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeOutcome {
    /// The predecessor settled in a way that satisfies this edge.
    Satisfied,
    /// The predecessor settled in a way that can never satisfy this edge —
    /// the step downstream of it is unreachable.
    Unreachable,
    /// The predecessor hasn't reached a terminal state yet.
    Waiting,
}

fn classify_edge(kind: EdgeKind, predecessor_status: StepStatus) -> EdgeOutcome {
    use StepStatus::{Aborted, Completed, Failed, Skipped};

    match kind {
        EdgeKind::Success | EdgeKind::Dataflow => match predecessor_status {
            Completed => EdgeOutcome::Satisfied,
            Failed | Aborted | Skipped => EdgeOutcome::Unreachable,
            _ => EdgeOutcome::Waiting,
        },
        EdgeKind::Failure => match predecessor_status {
            Failed => EdgeOutcome::Satisfied,
            Completed | Aborted | Skipped => EdgeOutcome::Unreachable,
            _ => EdgeOutcome::Waiting,
        },
    }
}

/// Pending steps that just became eligible, and pending steps that just
/// became permanently unreachable, given the current step states.
#[derive(Debug, Default)]
pub struct AdvancementResult {
    pub newly_ready: Vec<StepId>,
    pub newly_skipped: Vec<StepId>,
}

/// Re-evaluate every still-`Pending` step's inbound edges against the
/// current state snapshot.
#[must_use]
pub fn advance(plan: &ExecutionPlan, state: &ExecutionState) -> AdvancementResult {
    let mut result = AdvancementResult::default();

    for step in &plan.flow.steps {
        let Some(step_state) = state.step_state(step.id) else {
            continue;
        };
        if step_state.status != StepStatus::Pending {
            continue;
        }

        let edges = plan.graph.incoming_edges(step.id);
        if edges.is_empty() {
            result.newly_ready.push(step.id);
            continue;
        }

        let mut all_satisfied = true;
        let mut any_unreachable = false;
        for (predecessor, kind) in edges {
            let pred_status = state
                .step_state(predecessor)
                .map(|s| s.status)
                .unwrap_or(StepStatus::Pending);
            match classify_edge(kind, pred_status) {
                EdgeOutcome::Satisfied => {}
                EdgeOutcome::Unreachable => any_unreachable = true,
                EdgeOutcome::Waiting => all_satisfied = false,
            }
        }

        if any_unreachable {
            result.newly_skipped.push(step.id);
        } else if all_satisfied {
            result.newly_ready.push(step.id);
        }
    }

    result
}

/// Whether `a` and `b` may be dispatched in the same parallel batch: no
/// dataflow edge between them, and no shared exclusive resource tag or
/// state key.
#[must_use]
pub fn can_run_concurrently(a: &Step, b: &Step, plan: &ExecutionPlan) -> bool {
    if a.id == b.id {
        return false;
    }

    let connected = plan
        .graph
        .incoming_edges(a.id)
        .iter()
        .any(|(pred, _)| *pred == b.id)
        || plan
            .graph
            .incoming_edges(b.id)
            .iter()
            .any(|(pred, _)| *pred == a.id);
    if connected {
        return false;
    }

    if let (Some(tag_a), Some(tag_b)) = (&a.resource_tag, &b.resource_tag) {
        if tag_a == tag_b {
            return false;
        }
    }
    if let (Some(key_a), Some(key_b)) = (&a.state_key, &b.state_key) {
        if key_a == key_b {
            return false;
        }
    }

    true
}

/// Greedily select a maximal subset of `ready` steps that can all run
/// concurrently, in step-id order so the choice is deterministic.
#[must_use]
pub fn dispatch_batch(ready: &[StepId], plan: &ExecutionPlan) -> Vec<StepId> {
    let by_id: HashMap<StepId, &Step> = plan.flow.steps.iter().map(|s| (s.id, s)).collect();
    let mut ordered = ready.to_vec();
    ordered.sort();

    let mut batch: Vec<StepId> = Vec::new();
    for candidate_id in ordered {
        let Some(candidate) = by_id.get(&candidate_id) else {
            continue;
        };
        let conflicts = batch.iter().any(|picked_id| {
            let picked = by_id[picked_id];
            !can_run_concurrently(candidate, picked, plan)
        });
        if !conflicts {
            batch.push(candidate_id);
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExecutionTrigger;
    use qflow_core::{ExecutionId, FlowId, PrincipalId};
    use qflow_flow::{Flow, FlowMetadata, ResourceLimits, RetryPolicy, StepKind};
    use std::time::Duration;

    fn task(id: StepId, on_success: Option<StepId>, on_failure: Option<StepId>) -> Step {
        Step {
            id,
            kind: StepKind::Task {
                action: "noop".into(),
            },
            params: serde_json::json!({}),
            timeout: Duration::from_secs(300),
            retry_policy: RetryPolicy::default(),
            resource_limits: ResourceLimits::default(),
            on_success,
            on_failure,
            resource_tag: None,
            state_key: None,
        }
    }

    fn trigger() -> ExecutionTrigger {
        ExecutionTrigger {
            principal: PrincipalId::v4(),
            trigger_type: "manual".into(),
            input: serde_json::json!({}),
            permissions: vec![],
            dao_subnet: None,
            isolation_level: "isolated".into(),
        }
    }

    #[test]
    fn entry_step_is_ready_immediately() {
        let a = StepId::v4();
        let flow = Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![task(a, None, None)],
            metadata: FlowMetadata::default(),
        };
        let plan = ExecutionPlan::from_flow(flow).unwrap();
        let state = ExecutionState::new(ExecutionId::v4(), FlowId::v4(), &[a], trigger());
        let result = advance(&plan, &state);
        assert_eq!(result.newly_ready, vec![a]);
        assert!(result.newly_skipped.is_empty());
    }

    #[test]
    fn successor_ready_only_after_predecessor_completes() {
        let a = StepId::v4();
        let b = StepId::v4();
        let flow = Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![task(a, Some(b), None), task(b, None, None)],
            metadata: FlowMetadata::default(),
        };
        let plan = ExecutionPlan::from_flow(flow).unwrap();
        let mut state = ExecutionState::new(ExecutionId::v4(), FlowId::v4(), &[a, b], trigger());
        let result = advance(&plan, &state);
        assert_eq!(result.newly_ready, vec![a]);

        state.step_states.get_mut(&a).unwrap().status = StepStatus::Completed;
        let result = advance(&plan, &state);
        assert_eq!(result.newly_ready, vec![b]);
    }

    #[test]
    fn failed_predecessor_skips_its_success_target() {
        let a = StepId::v4();
        let b = StepId::v4();
        let flow = Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![task(a, Some(b), None), task(b, None, None)],
            metadata: FlowMetadata::default(),
        };
        let plan = ExecutionPlan::from_flow(flow).unwrap();
        let mut state = ExecutionState::new(ExecutionId::v4(), FlowId::v4(), &[a, b], trigger());
        state.step_states.get_mut(&a).unwrap().status = StepStatus::Failed;
        let result = advance(&plan, &state);
        assert_eq!(result.newly_skipped, vec![b]);
    }

    #[test]
    fn failed_predecessor_readies_its_failure_handler() {
        let a = StepId::v4();
        let handler = StepId::v4();
        let flow = Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![task(a, None, Some(handler)), task(handler, None, None)],
            metadata: FlowMetadata::default(),
        };
        let plan = ExecutionPlan::from_flow(flow).unwrap();
        let mut state =
            ExecutionState::new(ExecutionId::v4(), FlowId::v4(), &[a, handler], trigger());
        state.step_states.get_mut(&a).unwrap().status = StepStatus::Failed;
        let result = advance(&plan, &state);
        assert_eq!(result.newly_ready, vec![handler]);
    }

    #[test]
    fn steps_sharing_a_resource_tag_cannot_run_concurrently() {
        let a = StepId::v4();
        let b = StepId::v4();
        let mut step_a = task(a, None, None);
        step_a.resource_tag = Some("account-42".into());
        let mut step_b = task(b, None, None);
        step_b.resource_tag = Some("account-42".into());
        let flow = Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![step_a, step_b],
            metadata: FlowMetadata::default(),
        };
        let plan = ExecutionPlan::from_flow(flow).unwrap();
        let batch = dispatch_batch(&[a, b], &plan);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn independent_steps_batch_together() {
        let a = StepId::v4();
        let b = StepId::v4();
        let flow = Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![task(a, None, None), task(b, None, None)],
            metadata: FlowMetadata::default(),
        };
        let plan = ExecutionPlan::from_flow(flow).unwrap();
        let batch = dispatch_batch(&[a, b], &plan);
        assert_eq!(batch.len(), 2);
    }
}
