//! A flow's execution plan: the dependency graph plus the precomputed
//! parallel-dispatch levels and entry/exit steps, generalizing the
//! teacher's `ExecutionPlan::from_workflow`.

use qflow_core::StepId;
use qflow_flow::{DependencyGraph, Flow};

use crate::error::ExecutionEngineError;

/// A validated, ready-to-run flow plan.
pub struct ExecutionPlan {
    pub flow: Flow,
    pub graph: DependencyGraph,
    /// Steps grouped into parallel-eligible dependency levels.
    pub levels: Vec<Vec<StepId>>,
    pub entry_steps: Vec<StepId>,
    pub exit_steps: Vec<StepId>,
}

impl ExecutionPlan {
    /// Build a plan from a flow, validating that its step graph is acyclic
    /// and every reference resolves.
    pub fn from_flow(flow: Flow) -> Result<Self, ExecutionEngineError> {
        let graph = DependencyGraph::from_flow(&flow)
            .map_err(|e| ExecutionEngineError::PlanValidation(e.to_string()))?;
        let levels = graph
            .compute_levels()
            .map_err(|e| ExecutionEngineError::PlanValidation(e.to_string()))?;
        let entry_steps = graph.entry_nodes();
        let exit_steps = graph.exit_nodes();

        Ok(Self {
            flow,
            graph,
            levels,
            entry_steps,
            exit_steps,
        })
    }

    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&qflow_flow::Step> {
        self.flow.steps.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qflow_flow::{FlowMetadata, RetryPolicy, ResourceLimits, Step, StepKind};
    use qflow_core::FlowId;
    use std::time::Duration;

    fn task(id: StepId, on_success: Option<StepId>) -> Step {
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
            on_failure: None,
            resource_tag: None,
            state_key: None,
        }
    }

    #[test]
    fn plan_computes_levels_entries_and_exits() {
        let a = StepId::v4();
        let b = StepId::v4();
        let flow = Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![task(a, Some(b)), task(b, None)],
            metadata: FlowMetadata::default(),
        };
        let plan = ExecutionPlan::from_flow(flow).unwrap();
        assert_eq!(plan.total_steps(), 2);
        assert_eq!(plan.entry_steps, vec![a]);
        assert_eq!(plan.exit_steps, vec![b]);
        assert_eq!(plan.levels.len(), 2);
    }

    #[test]
    fn cyclic_flow_fails_plan_validation() {
        let a = StepId::v4();
        let b = StepId::v4();
        let mut step_a = task(a, Some(b));
        step_a.on_success = Some(b);
        let mut step_b = task(b, None);
        step_b.on_success = Some(a);
        let flow = Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![step_a, step_b],
            metadata: FlowMetadata::default(),
        };
        assert!(matches!(
            ExecutionPlan::from_flow(flow),
            Err(ExecutionEngineError::PlanValidation(_))
        ));
    }
}
