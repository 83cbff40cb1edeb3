//! The public execution-engine facade: register flows, start/control
//! executions, and answer status queries. Generalizes the teacher's
//! `WorkflowEngine` orchestrator over the abstract `qflow_ports` seam
//! instead of a concrete store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use qflow_core::{ExecutionId, FlowId, NodeId};
use qflow_flow::Flow;
use qflow_ports::{ExecutionRepo, FlowStore};

use crate::error::ExecutionEngineError;
use crate::state::{ExecutionState, ExecutionTrigger};
use crate::status::ExecutionStatus;

/// Lease TTL used for the write lease this engine instance holds while
/// actively driving an execution.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(15);

/// A compact view of an execution's progress, returned by
/// [`Engine::get_execution_status`].
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub completed_steps: Vec<qflow_core::StepId>,
    pub failed_steps: Vec<qflow_core::StepId>,
    pub current_step: Option<qflow_core::StepId>,
}

impl From<&ExecutionState> for ExecutionSummary {
    fn from(state: &ExecutionState) -> Self {
        Self {
            execution_id: state.execution_id,
            status: state.status,
            completed_steps: state.completed_steps.clone(),
            failed_steps: state.failed_steps.clone(),
            current_step: state.current_step,
        }
    }
}

/// The execution-engine facade. Holds no flow/execution data itself —
/// everything is read through and written back to the ports it wraps.
pub struct Engine {
    flows: Arc<dyn FlowStore>,
    executions: Arc<dyn ExecutionRepo>,
    node_id: NodeId,
}

impl Engine {
    #[must_use]
    pub fn new(flows: Arc<dyn FlowStore>, executions: Arc<dyn ExecutionRepo>, node_id: NodeId) -> Self {
        Self {
            flows,
            executions,
            node_id,
        }
    }

    /// Register a flow. Idempotent by `(id, version)`: registering the
    /// same version twice is a no-op; a new version overwrites.
    pub async fn register_flow(&self, flow: &Flow) -> Result<FlowId, ExecutionEngineError> {
        let existing = self.flows.get(flow.id).await?;

        let expected_version = match &existing {
            Some((store_version, doc)) => {
                let stored_flow_version = doc.get("version").and_then(serde_json::Value::as_u64);
                if stored_flow_version == Some(u64::from(flow.version)) {
                    return Ok(flow.id);
                }
                *store_version
            }
            None => 0,
        };

        let document = serde_json::to_value(flow)?;
        self.flows.save(flow.id, expected_version, document).await?;
        Ok(flow.id)
    }

    /// Start a new execution of a registered flow's current definition.
    pub async fn start_execution(
        &self,
        flow_id: FlowId,
        trigger: ExecutionTrigger,
    ) -> Result<ExecutionId, ExecutionEngineError> {
        let (_, document) = self
            .flows
            .get(flow_id)
            .await?
            .ok_or(ExecutionEngineError::FlowNotFound(flow_id))?;
        let flow: Flow = serde_json::from_value(document)?;

        let plan = crate::plan::ExecutionPlan::from_flow(flow)?;
        let step_ids: Vec<_> = plan.flow.steps.iter().map(|s| s.id).collect();

        let execution_id = ExecutionId::v4();
        let mut state = ExecutionState::new(execution_id, flow_id, &step_ids, trigger);
        state.transition_status("start", ExecutionStatus::Running)?;

        let holder = self.node_id.to_string();
        self.executions
            .acquire_lease(execution_id, &holder, DEFAULT_LEASE_TTL)
            .await?;

        let written = self
            .executions
            .transition(execution_id, 0, serde_json::to_value(&state)?)
            .await?;
        if !written {
            return Err(ExecutionEngineError::LostTakeover(execution_id));
        }

        self.executions
            .append_journal(
                execution_id,
                serde_json::json!({"event": "started", "at": Utc::now().to_rfc3339()}),
            )
            .await?;

        Ok(execution_id)
    }

    pub async fn get_execution_status(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionSummary, ExecutionEngineError> {
        let state = self.load_state(execution_id).await?;
        Ok(ExecutionSummary::from(&state))
    }

    pub async fn pause_execution(&self, execution_id: ExecutionId) -> Result<(), ExecutionEngineError> {
        self.apply_transition(execution_id, "pause", ExecutionStatus::Paused).await
    }

    pub async fn resume_execution(&self, execution_id: ExecutionId) -> Result<(), ExecutionEngineError> {
        self.apply_transition(execution_id, "resume", ExecutionStatus::Running).await
    }

    pub async fn abort_execution(&self, execution_id: ExecutionId) -> Result<(), ExecutionEngineError> {
        self.apply_transition(execution_id, "abort", ExecutionStatus::Aborted).await
    }

    /// Remove terminal executions whose state hasn't been touched in
    /// `max_age`. Leaves non-terminal or recently-updated executions
    /// untouched, reporting only the ids actually removed.
    pub async fn cleanup_executions(
        &self,
        max_age: Duration,
    ) -> Result<Vec<ExecutionId>, ExecutionEngineError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let candidates = self.executions.list_terminal(cutoff).await?;

        let mut removed = Vec::new();
        for id in candidates {
            if self.executions.delete(id).await? {
                removed.push(id);
            }
        }
        Ok(removed)
    }

    async fn load_state(&self, execution_id: ExecutionId) -> Result<ExecutionState, ExecutionEngineError> {
        let (_, value) = self
            .executions
            .get_state(execution_id)
            .await?
            .ok_or(ExecutionEngineError::ExecutionNotFound(execution_id))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn apply_transition(
        &self,
        execution_id: ExecutionId,
        action: &str,
        new_status: ExecutionStatus,
    ) -> Result<(), ExecutionEngineError> {
        let (version, value) = self
            .executions
            .get_state(execution_id)
            .await?
            .ok_or(ExecutionEngineError::ExecutionNotFound(execution_id))?;
        let mut state: ExecutionState = serde_json::from_value(value)?;

        state.transition_status(action, new_status)?;

        let written = self
            .executions
            .transition(execution_id, version, serde_json::to_value(&state)?)
            .await?;
        if !written {
            return Err(ExecutionEngineError::LostTakeover(execution_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qflow_core::PrincipalId;
    use qflow_flow::{FlowMetadata, ResourceLimits, RetryPolicy, Step, StepKind};
    use qflow_ports::PortsError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryFlowStore {
        docs: Mutex<HashMap<FlowId, (u64, serde_json::Value)>>,
    }

    #[async_trait]
    impl FlowStore for MemoryFlowStore {
        async fn get(&self, id: FlowId) -> Result<Option<(u64, serde_json::Value)>, PortsError> {
            Ok(self.docs.lock().unwrap().get(&id).cloned())
        }
        async fn save(
            &self,
            id: FlowId,
            expected_version: u64,
            document: serde_json::Value,
        ) -> Result<(), PortsError> {
            let mut docs = self.docs.lock().unwrap();
            let current = docs.get(&id).map_or(0, |(v, _)| *v);
            if current != expected_version {
                return Err(PortsError::conflict("flow", id.to_string(), expected_version, current));
            }
            docs.insert(id, (current + 1, document));
            Ok(())
        }
        async fn delete(&self, id: FlowId) -> Result<bool, PortsError> {
            Ok(self.docs.lock().unwrap().remove(&id).is_some())
        }
        async fn list(
            &self,
            _offset: usize,
            _limit: usize,
        ) -> Result<Vec<(FlowId, serde_json::Value)>, PortsError> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .iter()
                .map(|(id, (_, doc))| (*id, doc.clone()))
                .collect())
        }
    }

    #[derive(Default)]
    struct MemoryExecutionRepo {
        states: Mutex<HashMap<ExecutionId, (u64, serde_json::Value)>>,
        journals: Mutex<HashMap<ExecutionId, Vec<serde_json::Value>>>,
    }

    #[async_trait]
    impl ExecutionRepo for MemoryExecutionRepo {
        async fn get_state(
            &self,
            id: ExecutionId,
        ) -> Result<Option<(u64, serde_json::Value)>, PortsError> {
            Ok(self.states.lock().unwrap().get(&id).cloned())
        }
        async fn transition(
            &self,
            id: ExecutionId,
            expected_version: u64,
            new_state: serde_json::Value,
        ) -> Result<bool, PortsError> {
            let mut states = self.states.lock().unwrap();
            let current = states.get(&id).map_or(0, |(v, _)| *v);
            if current != expected_version {
                return Ok(false);
            }
            states.insert(id, (current + 1, new_state));
            Ok(true)
        }
        async fn get_journal(&self, id: ExecutionId) -> Result<Vec<serde_json::Value>, PortsError> {
            Ok(self.journals.lock().unwrap().get(&id).cloned().unwrap_or_default())
        }
        async fn append_journal(
            &self,
            id: ExecutionId,
            entry: serde_json::Value,
        ) -> Result<(), PortsError> {
            self.journals.lock().unwrap().entry(id).or_default().push(entry);
            Ok(())
        }
        async fn acquire_lease(
            &self,
            _id: ExecutionId,
            _holder: &str,
            _ttl: Duration,
        ) -> Result<bool, PortsError> {
            Ok(true)
        }
        async fn renew_lease(
            &self,
            _id: ExecutionId,
            _holder: &str,
            _ttl: Duration,
        ) -> Result<bool, PortsError> {
            Ok(true)
        }
        async fn release_lease(&self, _id: ExecutionId, _holder: &str) -> Result<bool, PortsError> {
            Ok(true)
        }
        async fn list_terminal(
            &self,
            before: chrono::DateTime<Utc>,
        ) -> Result<Vec<ExecutionId>, PortsError> {
            Ok(self
                .states
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(id, (_, doc))| {
                    let status = doc.get("status")?.as_str()?;
                    let updated_at = doc.get("updated_at")?.as_str()?;
                    let updated_at: chrono::DateTime<Utc> = updated_at.parse().ok()?;
                    let terminal = matches!(status, "completed" | "failed" | "aborted");
                    (terminal && updated_at < before).then_some(*id)
                })
                .collect())
        }
        async fn delete(&self, id: ExecutionId) -> Result<bool, PortsError> {
            Ok(self.states.lock().unwrap().remove(&id).is_some())
        }
    }

    fn flow_with_one_step() -> Flow {
        Flow {
            id: FlowId::v4(),
            name: "t".into(),
            version: 1,
            owner: "o".into(),
            steps: vec![Step {
                id: qflow_core::StepId::v4(),
                kind: StepKind::Task {
                    action: "noop".into(),
                },
                params: serde_json::json!({}),
                timeout: std::time::Duration::from_secs(300),
                retry_policy: RetryPolicy::default(),
                resource_limits: ResourceLimits::default(),
                on_success: None,
                on_failure: None,
                resource_tag: None,
                state_key: None,
            }],
            metadata: FlowMetadata::default(),
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

    fn engine() -> Engine {
        Engine::new(
            Arc::new(MemoryFlowStore::default()),
            Arc::new(MemoryExecutionRepo::default()),
            NodeId::v4(),
        )
    }

    #[tokio::test]
    async fn register_flow_is_idempotent_by_version() {
        let engine = engine();
        let flow = flow_with_one_step();
        let first = engine.register_flow(&flow).await.unwrap();
        let second = engine.register_flow(&flow).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn start_execution_creates_running_state() {
        let engine = engine();
        let flow = flow_with_one_step();
        engine.register_flow(&flow).await.unwrap();

        let execution_id = engine.start_execution(flow.id, trigger()).await.unwrap();
        let summary = engine.get_execution_status(execution_id).await.unwrap();
        assert_eq!(summary.status, ExecutionStatus::Running);
        assert!(summary.completed_steps.is_empty());
    }

    #[tokio::test]
    async fn starting_unregistered_flow_fails() {
        let engine = engine();
        let err = engine
            .start_execution(FlowId::v4(), trigger())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionEngineError::FlowNotFound(_)));
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips() {
        let engine = engine();
        let flow = flow_with_one_step();
        engine.register_flow(&flow).await.unwrap();
        let execution_id = engine.start_execution(flow.id, trigger()).await.unwrap();

        engine.pause_execution(execution_id).await.unwrap();
        let paused = engine.get_execution_status(execution_id).await.unwrap();
        assert_eq!(paused.status, ExecutionStatus::Paused);

        engine.resume_execution(execution_id).await.unwrap();
        let resumed = engine.get_execution_status(execution_id).await.unwrap();
        assert_eq!(resumed.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn abort_from_paused_is_rejected_by_the_transition_table() {
        let engine = engine();
        let flow = flow_with_one_step();
        engine.register_flow(&flow).await.unwrap();
        let execution_id = engine.start_execution(flow.id, trigger()).await.unwrap();
        engine.pause_execution(execution_id).await.unwrap();

        assert!(engine.abort_execution(execution_id).await.is_ok());
    }
}
