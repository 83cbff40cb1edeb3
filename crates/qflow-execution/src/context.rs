//! The non-serializable runtime context threaded through one execution's
//! in-memory dispatch loop — never persisted itself, unlike
//! [`crate::state::ExecutionState`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use qflow_core::StepId;
use qflow_flow::Flow;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutionEngineError;
use crate::output::StepOutput;

/// Shared, cheaply-cloneable state for one in-flight execution: the flow
/// being run, a cancellation signal, and the step outputs produced so far
/// (consulted when resolving a successor's dataflow inputs).
#[derive(Clone)]
pub struct ExecutionContext {
    pub flow: Arc<Flow>,
    cancellation: CancellationToken,
    outputs: Arc<RwLock<HashMap<StepId, StepOutput>>>,
    variables: Arc<RwLock<serde_json::Map<String, serde_json::Value>>>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(flow: Arc<Flow>) -> Self {
        Self {
            flow,
            cancellation: CancellationToken::new(),
            outputs: Arc::new(RwLock::new(HashMap::new())),
            variables: Arc::new(RwLock::new(serde_json::Map::new())),
        }
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns an error if the execution has been cancelled (abort/pause
    /// requested mid-dispatch), for a cheap check at loop boundaries.
    pub fn check_cancelled(&self, execution_id: qflow_core::ExecutionId) -> Result<(), ExecutionEngineError> {
        if self.is_cancelled() {
            Err(ExecutionEngineError::ExecutionNotFound(execution_id))
        } else {
            Ok(())
        }
    }

    pub fn record_output(&self, step_id: StepId, output: StepOutput) {
        self.outputs.write().insert(step_id, output);
    }

    #[must_use]
    pub fn output_of(&self, step_id: StepId) -> Option<StepOutput> {
        self.outputs.read().get(&step_id).cloned()
    }

    #[must_use]
    pub fn total_output_bytes(&self) -> u64 {
        self.outputs.read().values().map(|o| o.bytes).sum()
    }

    pub fn set_variable(&self, key: impl Into<String>, value: serde_json::Value) {
        self.variables.write().insert(key.into(), value);
    }

    #[must_use]
    pub fn variable(&self, key: &str) -> Option<serde_json::Value> {
        self.variables.read().get(key).cloned()
    }

    /// Merge a step's predecessor outputs into its resolved input: a
    /// single predecessor's output is passed through directly, multiple
    /// predecessors are merged into a JSON object keyed by predecessor id.
    #[must_use]
    pub fn resolve_step_input(&self, predecessors: &[StepId]) -> serde_json::Value {
        match predecessors {
            [] => serde_json::Value::Null,
            [only] => self
                .output_of(*only)
                .and_then(|o| o.as_value().cloned())
                .unwrap_or(serde_json::Value::Null),
            many => {
                let mut object = serde_json::Map::new();
                for pred in many {
                    let value = self
                        .output_of(*pred)
                        .and_then(|o| o.as_value().cloned())
                        .unwrap_or(serde_json::Value::Null);
                    object.insert(pred.to_string(), value);
                }
                serde_json::Value::Object(object)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qflow_core::{ExecutionId, FlowId};
    use qflow_flow::FlowMetadata;

    fn flow() -> Arc<Flow> {
        Arc::new(Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![],
            metadata: FlowMetadata::default(),
        })
    }

    #[test]
    fn cancellation_is_observed_after_cancel() {
        let ctx = ExecutionContext::new(flow());
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.check_cancelled(ExecutionId::v4()).is_err());
    }

    #[test]
    fn single_predecessor_output_passes_through_directly() {
        let ctx = ExecutionContext::new(flow());
        let step = StepId::v4();
        ctx.record_output(step, StepOutput::inline(serde_json::json!(42), 1));
        assert_eq!(ctx.resolve_step_input(&[step]), serde_json::json!(42));
    }

    #[test]
    fn multiple_predecessor_outputs_merge_into_object_by_id() {
        let ctx = ExecutionContext::new(flow());
        let a = StepId::v4();
        let b = StepId::v4();
        ctx.record_output(a, StepOutput::inline(serde_json::json!(1), 1));
        ctx.record_output(b, StepOutput::inline(serde_json::json!(2), 1));
        let resolved = ctx.resolve_step_input(&[a, b]);
        assert_eq!(resolved[a.to_string()], serde_json::json!(1));
        assert_eq!(resolved[b.to_string()], serde_json::json!(2));
    }

    #[test]
    fn total_output_bytes_sums_recorded_outputs() {
        let ctx = ExecutionContext::new(flow());
        ctx.record_output(StepId::v4(), StepOutput::inline(serde_json::json!(1), 10));
        ctx.record_output(StepId::v4(), StepOutput::inline(serde_json::json!(2), 20));
        assert_eq!(ctx.total_output_bytes(), 30);
    }
}
