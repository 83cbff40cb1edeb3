//! The step dependency graph: cycle detection, entry/exit nodes, and
//! parallel-execution levels.

use std::collections::{HashMap, HashSet};

use petgraph::graphmap::DiGraphMap;
use qflow_core::StepId;
use regex::Regex;
use std::sync::LazyLock;

use crate::document::Flow;
use crate::error::FlowError;

/// Why one step depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// `onSuccess` control-flow edge.
    Success,
    /// `onFailure` control-flow edge.
    Failure,
    /// A `${stepId.result}` reference in a param value.
    Dataflow,
}

static DATAFLOW_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9-]+)\.result\}").unwrap());

/// The step graph for one flow: success/failure control edges plus
/// dataflow edges inferred from `${stepId.result}` references in params.
pub struct DependencyGraph {
    graph: DiGraphMap<StepId, EdgeKind>,
    ids: HashSet<StepId>,
}

impl DependencyGraph {
    /// Build the graph from a flow's steps, resolving every step id
    /// referenced by an edge or dataflow expression against the flow's own
    /// step ids.
    ///
    /// A step naming itself as its own `on_failure` target is permitted
    /// (it models retrying under the step's own retry policy) and is not
    /// added as a graph edge, so it can never register as a cycle.
    pub fn from_flow(flow: &Flow) -> Result<Self, FlowError> {
        let mut graph = DiGraphMap::new();
        let mut ids = HashSet::new();

        for step in &flow.steps {
            if !ids.insert(step.id) {
                return Err(FlowError::DuplicateStepIds(step.id));
            }
            graph.add_node(step.id);
        }

        for step in &flow.steps {
            if let crate::document::StepKind::Parallel { branches } = &step.kind {
                for branch in branches {
                    Self::check_reference(&ids, step.id, *branch)?;
                    graph.add_edge(step.id, *branch, EdgeKind::Success);
                }
            }
            if let Some(target) = step.on_success {
                Self::check_reference(&ids, step.id, target)?;
                graph.add_edge(step.id, target, EdgeKind::Success);
            }
            if let Some(target) = step.on_failure {
                Self::check_reference(&ids, step.id, target)?;
                if target != step.id {
                    graph.add_edge(step.id, target, EdgeKind::Failure);
                }
            }
            for referenced in Self::dataflow_references(step) {
                let target = ids
                    .iter()
                    .find(|id| id.to_string() == referenced)
                    .copied()
                    .ok_or_else(|| FlowError::InvalidStepReference {
                        from: step.id,
                        target: StepId::nil(),
                    })?;
                graph.add_edge(target, step.id, EdgeKind::Dataflow);
            }
        }

        Ok(Self { graph, ids })
    }

    fn check_reference(
        ids: &HashSet<StepId>,
        from: StepId,
        target: StepId,
    ) -> Result<(), FlowError> {
        if ids.contains(&target) {
            Ok(())
        } else {
            Err(FlowError::InvalidStepReference { from, target })
        }
    }

    fn dataflow_references(step: &crate::document::Step) -> Vec<String> {
        let rendered = step.params.to_string();
        DATAFLOW_REF
            .captures_iter(&rendered)
            .map(|cap| cap[1].to_string())
            .collect()
    }

    /// Number of steps in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    /// Steps with no inbound edge of any kind.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<StepId> {
        self.ids
            .iter()
            .copied()
            .filter(|id| {
                self.graph
                    .neighbors_directed(*id, petgraph::Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// A step's inbound edges as `(predecessor, edge_kind)` pairs.
    #[must_use]
    pub fn incoming_edges(&self, node: StepId) -> Vec<(StepId, EdgeKind)> {
        self.graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .map(|pred| (pred, *self.graph.edge_weight(pred, node).expect("edge exists")))
            .collect()
    }

    /// Steps with no outbound edge of any kind.
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<StepId> {
        self.ids
            .iter()
            .copied()
            .filter(|id| {
                self.graph
                    .neighbors_directed(*id, petgraph::Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// Detect a cycle over success + failure + dataflow edges via DFS
    /// vertex coloring. Returns the cycle as a step-id path if one exists.
    #[must_use]
    pub fn detect_cycle(&self) -> Option<Vec<StepId>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<StepId, Color> =
            self.ids.iter().map(|id| (*id, Color::White)).collect();
        let mut path = Vec::new();

        fn visit(
            graph: &DiGraphMap<StepId, EdgeKind>,
            node: StepId,
            color: &mut HashMap<StepId, Color>,
            path: &mut Vec<StepId>,
        ) -> Option<Vec<StepId>> {
            color.insert(node, Color::Gray);
            path.push(node);

            for neighbor in graph.neighbors_directed(node, petgraph::Direction::Outgoing) {
                match color.get(&neighbor).copied().unwrap_or(Color::White) {
                    Color::White => {
                        if let Some(cycle) = visit(graph, neighbor, color, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Gray => {
                        let start = path.iter().position(|id| *id == neighbor).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(neighbor);
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            }

            path.pop();
            color.insert(node, Color::Black);
            None
        }

        for id in self.ids.iter().copied() {
            if color.get(&id).copied() == Some(Color::White) {
                if let Some(cycle) = visit(&self.graph, id, &mut color, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Group steps into levels such that every step in level `n` depends
    /// only on steps in levels `< n`, and steps within the same level share
    /// no ordering constraint — a valid parallel-dispatch schedule.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::CircularDependency`] if the graph isn't a DAG.
    pub fn compute_levels(&self) -> Result<Vec<Vec<StepId>>, FlowError> {
        if let Some(cycle) = self.detect_cycle() {
            let path = cycle
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(FlowError::CircularDependency(path));
        }

        let mut in_degree: HashMap<StepId, usize> = self
            .ids
            .iter()
            .map(|id| {
                (
                    *id,
                    self.graph
                        .neighbors_directed(*id, petgraph::Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let mut levels = Vec::new();
        let mut remaining = self.ids.len();

        while remaining > 0 {
            let mut current_level: Vec<StepId> = in_degree
                .iter()
                .filter(|(_, degree)| **degree == 0)
                .map(|(id, _)| *id)
                .collect();
            current_level.sort();

            if current_level.is_empty() {
                // Unreachable given the upfront cycle check, but avoids an
                // infinite loop if that invariant is ever violated.
                break;
            }

            for id in &current_level {
                in_degree.remove(id);
                remaining -= 1;
                for neighbor in self.graph.neighbors_directed(*id, petgraph::Direction::Outgoing)
                {
                    if let Some(degree) = in_degree.get_mut(&neighbor) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }

            levels.push(current_level);
        }

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Flow, FlowMetadata, Step, StepKind};
    use qflow_core::FlowId;

    fn task(id: StepId, on_success: Option<StepId>, on_failure: Option<StepId>) -> Step {
        Step {
            id,
            kind: StepKind::Task {
                action: "noop".into(),
            },
            params: serde_json::json!({}),
            timeout: std::time::Duration::from_secs(300),
            retry_policy: crate::document::RetryPolicy::default(),
            resource_limits: crate::document::ResourceLimits::default(),
            on_success,
            on_failure,
            resource_tag: None,
            state_key: None,
        }
    }

    fn flow(steps: Vec<Step>) -> Flow {
        Flow {
            id: FlowId::v4(),
            name: "test".into(),
            version: 1,
            owner: "owner".into(),
            steps,
            metadata: FlowMetadata::default(),
        }
    }

    #[test]
    fn linear_flow_has_one_entry_one_exit_and_n_levels() {
        let a = StepId::v4();
        let b = StepId::v4();
        let c = StepId::v4();
        let f = flow(vec![
            task(a, Some(b), None),
            task(b, Some(c), None),
            task(c, None, None),
        ]);
        let graph = DependencyGraph::from_flow(&f).unwrap();
        assert_eq!(graph.entry_nodes(), vec![a]);
        assert_eq!(graph.exit_nodes(), vec![c]);
        assert_eq!(graph.compute_levels().unwrap().len(), 3);
    }

    #[test]
    fn diamond_flow_has_two_parallel_steps_in_middle_level() {
        let a = StepId::v4();
        let b = StepId::v4();
        let c = StepId::v4();
        let d = StepId::v4();
        let mut fan_out = task(a, None, None);
        fan_out.kind = StepKind::Parallel {
            branches: vec![b, c],
        };
        let f = flow(vec![
            fan_out,
            task(b, Some(d), None),
            task(c, Some(d), None),
            task(d, None, None),
        ]);
        let graph = DependencyGraph::from_flow(&f).unwrap();
        assert_eq!(graph.entry_nodes(), vec![a]);
        assert_eq!(graph.exit_nodes(), vec![d]);
        let levels = graph.compute_levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[1].len(), 2);
    }

    #[test]
    fn cycle_over_success_edges_is_detected() {
        let a = StepId::v4();
        let b = StepId::v4();
        let f = flow(vec![task(a, Some(b), None), task(b, Some(a), None)]);
        let graph = DependencyGraph::from_flow(&f).unwrap();
        assert!(graph.detect_cycle().is_some());
        assert!(matches!(
            graph.compute_levels(),
            Err(FlowError::CircularDependency(_))
        ));
    }

    #[test]
    fn self_referencing_failure_handler_is_not_a_cycle() {
        let a = StepId::v4();
        let f = flow(vec![task(a, None, Some(a))]);
        let graph = DependencyGraph::from_flow(&f).unwrap();
        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn dangling_step_reference_is_rejected() {
        let a = StepId::v4();
        let ghost = StepId::v4();
        let f = flow(vec![task(a, Some(ghost), None)]);
        assert!(matches!(
            DependencyGraph::from_flow(&f),
            Err(FlowError::InvalidStepReference { .. })
        ));
    }

    #[test]
    fn duplicate_step_ids_are_rejected() {
        let a = StepId::v4();
        let f = flow(vec![task(a, None, None), task(a, None, None)]);
        assert!(matches!(
            DependencyGraph::from_flow(&f),
            Err(FlowError::DuplicateStepIds(_))
        ));
    }

    #[test]
    fn incoming_edges_reports_predecessor_and_kind() {
        let a = StepId::v4();
        let b = StepId::v4();
        let f = flow(vec![task(a, Some(b), None), task(b, None, None)]);
        let graph = DependencyGraph::from_flow(&f).unwrap();
        assert_eq!(graph.incoming_edges(b), vec![(a, EdgeKind::Success)]);
        assert!(graph.incoming_edges(a).is_empty());
    }

    #[test]
    fn dataflow_reference_in_params_creates_an_edge() {
        let a = StepId::v4();
        let b = StepId::v4();
        let mut steps = vec![task(a, None, None), task(b, None, None)];
        steps[1].params = serde_json::json!({ "input": format!("${{{a}.result}}") });
        let f = flow(steps);
        let graph = DependencyGraph::from_flow(&f).unwrap();
        assert_eq!(graph.entry_nodes(), vec![a]);
        assert_eq!(graph.exit_nodes(), vec![b]);
    }
}
