//! The [`Qflow`] facade: the Flow submission API and Execution API from
//! the external-interfaces surface, backed by whatever ports and drivers
//! [`crate::builder::QflowBuilder`] wired in.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use qflow_adaptive::AdaptiveController;
use qflow_core::{ExecutionId, FlowId, NodeId, ScopeLevel, StepId};
use qflow_error::QflowError;
use qflow_eventbus::{EventBus, QflowEvent, Topic};
use qflow_execution::selection::{select_node, NodeProfile, SelectionRequest};
use qflow_execution::{
    advance, dispatch_batch, evaluate_condition, Engine, ExecutionContext, ExecutionEngineError,
    ExecutionPlan, ExecutionState, ExecutionStatus, ExecutionSummary, ExecutionTrigger, StepOutput,
};
use qflow_flow::{Flow, Format, StepKind};
use qflow_ledger::{Entry, Ledger, LedgerPayload};
use qflow_ports::sandbox::{ModuleInvocation, ModuleOutcome};
use qflow_ports::{BlobStore, ExecutionRepo, FlowStore, NodeMembership, SandboxRunner, TaskQueue};
use qflow_validation::ValidationPipeline;

use crate::config::{DataPassingPolicy, EngineConfig, FailureStrategy, LargeDataStrategy};
use crate::error::RuntimeError;

/// The outcome of [`Qflow::validate_flow`].
#[derive(Debug, Clone)]
pub struct FlowValidation {
    /// `true` if the document parsed, structurally validated, and (when a
    /// pipeline is wired) passed every required validation layer.
    pub valid: bool,
    /// Human-readable problems found, empty iff `valid`.
    pub errors: Vec<String>,
}

/// A listed flow: its id, current stored version, and normalized document.
#[derive(Debug, Clone)]
pub struct FlowSummary {
    /// The flow's id.
    pub id: FlowId,
    /// The `FlowStore` version this document was read at. `FlowStore::list`
    /// doesn't carry per-row versions, so entries from [`Qflow::list_flows`]
    /// always report `0`; entries from [`Qflow::get_flow`] report the real
    /// version.
    pub version: u64,
    /// The normalized flow.
    pub flow: Flow,
}

/// The composed Qflow engine: one node's view of flow storage, execution
/// driving, the ledger, the sandbox, validation, and adaptive control.
///
/// Built exclusively via [`crate::builder::QflowBuilder`] — there is no
/// public constructor here, matching the teacher's composition-root shape
/// where `ActionRuntime` is assembled once at startup and shared behind
/// `Arc`s thereafter.
pub struct Qflow {
    node_id: NodeId,
    engine: Engine,
    flows: Arc<dyn FlowStore>,
    executions: Arc<dyn ExecutionRepo>,
    membership: Arc<dyn NodeMembership>,
    queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobStore>,
    sandbox: Arc<dyn SandboxRunner>,
    ledger: Arc<Mutex<Ledger>>,
    validation: Option<ValidationPipeline>,
    adaptive: Arc<AdaptiveController>,
    event_bus: Arc<EventBus>,
    engine_config: EngineConfig,
    data_policy: DataPassingPolicy,
}

impl Qflow {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node_id: NodeId,
        engine: Engine,
        flows: Arc<dyn FlowStore>,
        executions: Arc<dyn ExecutionRepo>,
        membership: Arc<dyn NodeMembership>,
        queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobStore>,
        sandbox: Arc<dyn SandboxRunner>,
        ledger: Arc<Mutex<Ledger>>,
        validation: Option<ValidationPipeline>,
        adaptive: Arc<AdaptiveController>,
        event_bus: Arc<EventBus>,
        engine_config: EngineConfig,
        data_policy: DataPassingPolicy,
    ) -> Self {
        Self {
            node_id,
            engine,
            flows,
            executions,
            membership,
            queue,
            blobs,
            sandbox,
            ledger,
            validation,
            adaptive,
            event_bus,
            engine_config,
            data_policy,
        }
    }

    /// This node's identity.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The shared event bus. External observers (logging, metrics
    /// exporters, out-of-core transports) subscribe here.
    #[must_use]
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// The adaptive controller governing this node's burn-rate response,
    /// degradation ladder, and autoscaling triggers.
    #[must_use]
    pub fn adaptive(&self) -> &Arc<AdaptiveController> {
        &self.adaptive
    }

    /// Fleet membership, for callers that need reachability/candidate
    /// queries outside of execution dispatch (e.g. a health endpoint).
    #[must_use]
    pub fn membership(&self) -> &Arc<dyn NodeMembership> {
        &self.membership
    }

    /// The content-addressed blob store backing ledger payload overflow
    /// and `SpillToBlob` data passing.
    #[must_use]
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// The task queue backing out-of-process step dispatch.
    #[must_use]
    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// The sandbox runner step execution is wrapped in.
    #[must_use]
    pub fn sandbox(&self) -> &Arc<dyn SandboxRunner> {
        &self.sandbox
    }

    /// `check_output_size`'s configured policy, for callers enforcing data
    /// limits at the dispatch boundary before this facade sees the output.
    #[must_use]
    pub fn data_policy(&self) -> &DataPassingPolicy {
        &self.data_policy
    }

    /// This node's explicit engine configuration.
    #[must_use]
    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    // -- Flow submission API --------------------------------------------

    /// Parse and register a new flow. Fails with
    /// `ErrorKind::State(Duplicate)` if a flow with this id already exists
    /// — use [`Qflow::update_flow`] to change one.
    pub async fn create_flow(&self, document: &str, format: Option<Format>) -> Result<FlowId, RuntimeError> {
        let flow = self.parse_flow(document, format)?;

        if self.flows.get(flow.id).await.map_err(qflow_execution::ExecutionEngineError::from)?.is_some() {
            return Err(RuntimeError::Execution(ExecutionEngineError::Ports(
                qflow_ports::PortsError::conflict("flow", flow.id.to_string(), 0, 1),
            )));
        }

        let flow_id = self.engine.register_flow(&flow).await?;
        self.event_bus.emit(QflowEvent::new(
            Topic::FLOW_CREATED,
            self.node_id.to_string(),
            Utc::now(),
            serde_json::json!({"flow_id": flow_id.to_string()}),
        ));
        Ok(flow_id)
    }

    /// Re-register an existing flow's document under a new version. Fails
    /// with `ErrorKind::Lookup(FlowNotFound)` if no flow with this id is
    /// registered yet.
    pub async fn update_flow(&self, document: &str, format: Option<Format>) -> Result<FlowId, RuntimeError> {
        let flow = self.parse_flow(document, format)?;

        if self.flows.get(flow.id).await.map_err(qflow_execution::ExecutionEngineError::from)?.is_none() {
            return Err(RuntimeError::Execution(ExecutionEngineError::FlowNotFound(flow.id)));
        }

        Ok(self.engine.register_flow(&flow).await?)
    }

    /// Fetch a flow by id.
    pub async fn get_flow(&self, id: FlowId) -> Result<Option<FlowSummary>, RuntimeError> {
        let Some((version, document)) = self.flows.get(id).await.map_err(ExecutionEngineError::from)? else {
            return Ok(None);
        };
        let flow: Flow = serde_json::from_value(document).map_err(|err| {
            RuntimeError::Execution(ExecutionEngineError::Serialization(err))
        })?;
        Ok(Some(FlowSummary { id, version, flow }))
    }

    /// List registered flows, oldest-registered first.
    pub async fn list_flows(&self, offset: usize, limit: usize) -> Result<Vec<FlowSummary>, RuntimeError> {
        let rows = self.flows.list(offset, limit).await.map_err(ExecutionEngineError::from)?;
        rows.into_iter()
            .map(|(id, document)| {
                let flow: Flow = serde_json::from_value(document)
                    .map_err(|err| RuntimeError::Execution(ExecutionEngineError::Serialization(err)))?;
                Ok(FlowSummary { id, version: 0, flow })
            })
            .collect()
    }

    /// Delete a flow. `Ok(false)` if no such flow exists.
    pub async fn delete_flow(&self, id: FlowId) -> Result<bool, RuntimeError> {
        Ok(self.flows.delete(id).await.map_err(ExecutionEngineError::from)?)
    }

    /// Parse and structurally validate a flow document without
    /// registering it, additionally running it through the wired
    /// validation pipeline (if any) against its normalized JSON form.
    pub async fn validate_flow(&self, document: &str, format: Option<Format>) -> FlowValidation {
        let outcome = qflow_flow::parse::parse(document, format);
        if !outcome.errors.is_empty() {
            return FlowValidation {
                valid: false,
                errors: outcome.errors.iter().map(ToString::to_string).collect(),
            };
        }
        let Some(flow) = outcome.flow else {
            return FlowValidation {
                valid: false,
                errors: vec!["parser returned no flow and no errors".to_string()],
            };
        };

        let Some(pipeline) = &self.validation else {
            return FlowValidation { valid: true, errors: Vec::new() };
        };

        let document = match serde_json::to_value(&flow) {
            Ok(document) => document,
            Err(err) => return FlowValidation { valid: false, errors: vec![err.to_string()] },
        };

        let report = pipeline.validate(&document).await;
        self.event_bus.emit(QflowEvent::new(
            Topic::VALIDATION_PIPELINE_EXECUTED,
            self.node_id.to_string(),
            Utc::now(),
            serde_json::json!({"flow_id": flow.id.to_string(), "short_circuited": report.short_circuited}),
        ));

        match report.into_result() {
            Ok(_) => FlowValidation { valid: true, errors: Vec::new() },
            Err(err) => FlowValidation { valid: false, errors: vec![err.to_string()] },
        }
    }

    fn parse_flow(&self, document: &str, format: Option<Format>) -> Result<Flow, RuntimeError> {
        let outcome = qflow_flow::parse::parse(document, format);
        match outcome.flow {
            Some(flow) => Ok(flow),
            None => Err(RuntimeError::Flow(
                outcome
                    .errors
                    .into_iter()
                    .next()
                    .unwrap_or(qflow_flow::FlowError::NoEntryStep),
            )),
        }
    }

    // -- Execution API ----------------------------------------------------

    /// Start a new execution of a registered flow's current definition.
    ///
    /// Creates the `Running` state and its genesis ledger record, then
    /// hands the execution off to a background driver task and returns —
    /// mirroring a real distributed node, where the caller that started an
    /// execution is never the thread that drives every step of it to
    /// completion. Callers observe progress via [`Qflow::get_execution_status`]
    /// or the event bus, not by awaiting this call.
    pub async fn start_execution(
        &self,
        flow_id: FlowId,
        trigger: ExecutionTrigger,
    ) -> Result<ExecutionId, RuntimeError> {
        let execution_id = self.engine.start_execution(flow_id, trigger).await?;

        let now = Utc::now();
        self.ledger.lock().append(
            execution_id,
            self.node_id,
            self.node_id.to_string(),
            now,
            Entry {
                step_id: None,
                payload: LedgerPayload::ExecutionStarted { timestamp: now },
            },
        )?;

        self.event_bus.emit(QflowEvent::new(
            Topic::EXEC_STARTED,
            self.node_id.to_string(),
            Utc::now(),
            serde_json::json!({"execution_id": execution_id.to_string(), "flow_id": flow_id.to_string()}),
        ));

        let driver = ExecutionDriver::from_qflow(self);
        tokio::spawn(async move {
            if let Err(err) = driver.drive_execution(execution_id, flow_id).await {
                tracing::error!(%execution_id, %err, "execution driver stopped with an error");
            }
        });

        Ok(execution_id)
    }

    /// Read an execution's current progress.
    pub async fn get_execution_status(&self, execution_id: ExecutionId) -> Result<ExecutionSummary, RuntimeError> {
        Ok(self.engine.get_execution_status(execution_id).await?)
    }

    /// Pause a running execution.
    pub async fn pause_execution(&self, execution_id: ExecutionId) -> Result<(), RuntimeError> {
        Ok(self.engine.pause_execution(execution_id).await?)
    }

    /// Resume a paused execution.
    pub async fn resume_execution(&self, execution_id: ExecutionId) -> Result<(), RuntimeError> {
        Ok(self.engine.resume_execution(execution_id).await?)
    }

    /// Abort an execution. Step workers are expected to observe
    /// cancellation within the engine's grace period.
    pub async fn abort_execution(&self, execution_id: ExecutionId) -> Result<(), RuntimeError> {
        Ok(self.engine.abort_execution(execution_id).await?)
    }

    /// Remove terminal executions older than the configured
    /// `cleanup_after` age, returning the ids actually removed.
    pub async fn cleanup_executions(&self) -> Result<Vec<ExecutionId>, RuntimeError> {
        Ok(self.engine.cleanup_executions(self.engine_config.cleanup_after).await?)
    }

    /// Cleanup using an explicit age instead of the configured default —
    /// for callers (tests, operators) that want a one-off sweep.
    pub async fn cleanup_executions_older_than(&self, max_age: Duration) -> Result<Vec<ExecutionId>, RuntimeError> {
        Ok(self.engine.cleanup_executions(max_age).await?)
    }
}

/// The step-by-step capability tag a node must advertise to run a step of
/// this kind, used as the [`SelectionRequest::required_capability`] for
/// [`select_node`].
fn step_capability(kind: &StepKind) -> String {
    match kind {
        StepKind::Task { action } => action.clone(),
        StepKind::ModuleCall { module, function } => format!("{module}.{function}"),
        StepKind::Condition { .. } => "condition".to_string(),
        StepKind::Parallel { .. } => "parallel".to_string(),
        StepKind::EventTrigger { event_type } => format!("event.{event_type}"),
    }
}

/// Drives one execution's step graph from `Running` to a terminal status:
/// repeatedly advancing the ready set, dispatching conflict-free batches to
/// selected nodes, and recording every transition to the ledger and event
/// bus.
///
/// Holds its own `Arc`-cloned handle to every collaborator it needs instead
/// of borrowing [`Qflow`], so it can be moved into a `tokio::spawn`ed task —
/// the same shape as the teacher's `HealthChecker::start_monitoring`
/// background loop.
struct ExecutionDriver {
    node_id: NodeId,
    flows: Arc<dyn FlowStore>,
    executions: Arc<dyn ExecutionRepo>,
    membership: Arc<dyn NodeMembership>,
    blobs: Arc<dyn BlobStore>,
    sandbox: Arc<dyn SandboxRunner>,
    ledger: Arc<Mutex<Ledger>>,
    event_bus: Arc<EventBus>,
    engine_config: EngineConfig,
    data_policy: DataPassingPolicy,
}

impl ExecutionDriver {
    fn from_qflow(qflow: &Qflow) -> Self {
        Self {
            node_id: qflow.node_id,
            flows: Arc::clone(&qflow.flows),
            executions: Arc::clone(&qflow.executions),
            membership: Arc::clone(&qflow.membership),
            blobs: Arc::clone(&qflow.blobs),
            sandbox: Arc::clone(&qflow.sandbox),
            ledger: Arc::clone(&qflow.ledger),
            event_bus: Arc::clone(&qflow.event_bus),
            engine_config: qflow.engine_config.clone(),
            data_policy: qflow.data_policy.clone(),
        }
    }

    async fn load_state(&self, execution_id: ExecutionId) -> Result<(u64, ExecutionState), RuntimeError> {
        let (version, value) = self
            .executions
            .get_state(execution_id)
            .await
            .map_err(ExecutionEngineError::from)?
            .ok_or(ExecutionEngineError::ExecutionNotFound(execution_id))?;
        let state: ExecutionState = serde_json::from_value(value).map_err(ExecutionEngineError::Serialization)?;
        Ok((version, state))
    }

    async fn persist(&self, execution_id: ExecutionId, version: u64, state: &ExecutionState) -> Result<(), RuntimeError> {
        let value = serde_json::to_value(state).map_err(ExecutionEngineError::Serialization)?;
        let written = self
            .executions
            .transition(execution_id, version, value)
            .await
            .map_err(ExecutionEngineError::from)?;
        if !written {
            return Err(RuntimeError::Execution(ExecutionEngineError::LostTakeover(execution_id)));
        }
        Ok(())
    }

    fn append_ledger(
        &self,
        execution_id: ExecutionId,
        step_id: Option<StepId>,
        payload: LedgerPayload,
    ) -> Result<(), RuntimeError> {
        let now = Utc::now();
        self.ledger
            .lock()
            .append(execution_id, self.node_id, self.node_id.to_string(), now, Entry { step_id, payload })?;
        Ok(())
    }

    /// Drive `execution_id` from whatever state it's currently in through
    /// to a terminal status, or return early (leaving it `Running`) if it's
    /// suspended waiting on an event the fleet hasn't delivered yet.
    async fn drive_execution(&self, execution_id: ExecutionId, flow_id: FlowId) -> Result<(), RuntimeError> {
        let (_, document) = self
            .flows
            .get(flow_id)
            .await
            .map_err(ExecutionEngineError::from)?
            .ok_or(ExecutionEngineError::FlowNotFound(flow_id))?;
        let flow: Flow = serde_json::from_value(document).map_err(ExecutionEngineError::Serialization)?;
        let plan = ExecutionPlan::from_flow(flow.clone())?;
        let ctx = ExecutionContext::new(Arc::new(flow));

        loop {
            let (version, mut state) = self.load_state(execution_id).await?;
            if state.status != ExecutionStatus::Running {
                return Ok(());
            }
            if state.all_steps_terminal() {
                return self.finalize_execution(execution_id).await;
            }

            let advancement = advance(&plan, &state);
            if !advancement.newly_ready.is_empty() || !advancement.newly_skipped.is_empty() {
                for step_id in &advancement.newly_ready {
                    state
                        .step_states
                        .get_mut(step_id)
                        .ok_or(ExecutionEngineError::StepNotFound(*step_id))?
                        .transition_to(qflow_flow::StepStatus::Ready)?;
                }
                for step_id in &advancement.newly_skipped {
                    state
                        .step_states
                        .get_mut(step_id)
                        .ok_or(ExecutionEngineError::StepNotFound(*step_id))?
                        .transition_to(qflow_flow::StepStatus::Skipped)?;
                }
                self.persist(execution_id, version, &state).await?;
                for step_id in &advancement.newly_skipped {
                    self.append_ledger(
                        execution_id,
                        Some(*step_id),
                        LedgerPayload::StepSkipped {
                            timestamp: Utc::now(),
                            reason: "an upstream branch's outcome excludes this step".to_string(),
                        },
                    )?;
                }
                continue;
            }

            let mut ready_ids: Vec<StepId> = state
                .step_states
                .iter()
                .filter(|(_, s)| s.status == qflow_flow::StepStatus::Ready)
                .map(|(id, _)| *id)
                .collect();
            ready_ids.retain(|id| !matches!(plan.step(*id).map(|s| &s.kind), Some(StepKind::EventTrigger { .. })));

            if ready_ids.is_empty() {
                return Ok(());
            }

            let batch = dispatch_batch(&ready_ids, &plan);
            for step_id in batch {
                let finalized = self.dispatch_step(execution_id, &plan, &ctx, step_id).await?;
                if finalized {
                    return Ok(());
                }
            }
        }
    }

    /// Dispatch one ready step: select a node, transition it through
    /// `Dispatched`/`Running` to a terminal step status, and record every
    /// hop to the ledger and event bus. Returns `true` if this step's
    /// failure already finalized the whole execution (`FailFast`), signaling
    /// the caller to stop dispatching the rest of the batch.
    async fn dispatch_step(
        &self,
        execution_id: ExecutionId,
        plan: &ExecutionPlan,
        ctx: &ExecutionContext,
        step_id: StepId,
    ) -> Result<bool, RuntimeError> {
        let step = plan.step(step_id).ok_or(ExecutionEngineError::StepNotFound(step_id))?.clone();

        let (version, mut state) = self.load_state(execution_id).await?;
        let dao_subnet = state.trigger.dao_subnet.clone();

        let candidates = self.membership.candidates().await.map_err(ExecutionEngineError::from)?;
        let capability = step_capability(&step.kind);
        let mut profiles = HashMap::new();
        for node in &candidates {
            profiles.insert(
                *node,
                NodeProfile {
                    capability_tags: std::iter::once(capability.clone()).collect(),
                    dao_subnet: dao_subnet.clone(),
                    current_load: 0.0,
                    p95_latency_ms: 0,
                },
            );
        }
        let request = SelectionRequest {
            required_capability: capability,
            dao_subnet,
            exclude: Default::default(),
        };
        let node = select_node(self.membership.as_ref(), &profiles, &request).await?;

        state
            .step_states
            .get_mut(&step_id)
            .ok_or(ExecutionEngineError::StepNotFound(step_id))?
            .transition_to(qflow_flow::StepStatus::Dispatched)?;
        state.node_assignments.insert(step_id, node);
        self.persist(execution_id, version, &state).await?;
        self.append_ledger(
            execution_id,
            Some(step_id),
            LedgerPayload::StepScheduled { timestamp: Utc::now(), node_id: node },
        )?;
        self.event_bus.emit(QflowEvent::new(
            Topic::EXEC_STEP_DISPATCHED,
            self.node_id.to_string(),
            Utc::now(),
            serde_json::json!({"execution_id": execution_id.to_string(), "step_id": step_id.to_string(), "node_id": node.to_string()}),
        ));

        let (version, mut state) = self.load_state(execution_id).await?;
        let attempt = state.step_state(step_id).map_or(0, |s| s.attempt_count() as u32);
        state
            .step_states
            .get_mut(&step_id)
            .ok_or(ExecutionEngineError::StepNotFound(step_id))?
            .transition_to(qflow_flow::StepStatus::Running)?;
        self.persist(execution_id, version, &state).await?;
        self.append_ledger(
            execution_id,
            Some(step_id),
            LedgerPayload::StepStarted { timestamp: Utc::now(), node_id: node, attempt },
        )?;

        let predecessors: Vec<StepId> = plan.graph.incoming_edges(step_id).into_iter().map(|(pred, _)| pred).collect();
        let input = ctx.resolve_step_input(&predecessors);

        let outcome = self.run_step(&step, input, execution_id, step_id, node, ctx).await;

        let (version, mut state) = self.load_state(execution_id).await?;
        match outcome {
            Ok(value) => {
                let sized = self.data_policy.check_output_size(&value);
                let output = match sized {
                    Ok(bytes) => StepOutput::inline(value, bytes),
                    Err((limit, actual)) => match self.data_policy.large_data_strategy {
                        LargeDataStrategy::Reject => {
                            return self
                                .fail_step(
                                    execution_id,
                                    version,
                                    &mut state,
                                    step_id,
                                    node,
                                    format!("output {actual} bytes exceeds limit {limit} bytes"),
                                )
                                .await;
                        }
                        LargeDataStrategy::SpillToBlob => {
                            let bytes = serde_json::to_vec(&value).map_err(ExecutionEngineError::Serialization)?;
                            let digest = self.blobs.put(bytes).await.map_err(ExecutionEngineError::from)?;
                            StepOutput::blob_ref(digest.to_string(), actual, "application/json")
                        }
                    },
                };
                ctx.record_output(step_id, output.clone());
                state
                    .step_states
                    .get_mut(&step_id)
                    .ok_or(ExecutionEngineError::StepNotFound(step_id))?
                    .transition_to(qflow_flow::StepStatus::Completed)?;
                state.mark_step_completed(step_id);
                self.persist(execution_id, version, &state).await?;
                self.append_ledger(
                    execution_id,
                    Some(step_id),
                    LedgerPayload::StepCompleted { timestamp: Utc::now(), node_id: node, output_bytes: output.bytes },
                )?;
                self.event_bus.emit(QflowEvent::new(
                    Topic::EXEC_STEP_COMPLETED,
                    self.node_id.to_string(),
                    Utc::now(),
                    serde_json::json!({"execution_id": execution_id.to_string(), "step_id": step_id.to_string(), "status": "completed"}),
                ));
                Ok(false)
            }
            Err(message) => self.fail_step(execution_id, version, &mut state, step_id, node, message).await,
        }
    }

    async fn fail_step(
        &self,
        execution_id: ExecutionId,
        version: u64,
        state: &mut ExecutionState,
        step_id: StepId,
        node: NodeId,
        message: String,
    ) -> Result<bool, RuntimeError> {
        state
            .step_states
            .get_mut(&step_id)
            .ok_or(ExecutionEngineError::StepNotFound(step_id))?
            .transition_to(qflow_flow::StepStatus::Failed)?;
        state.mark_step_failed(step_id);
        self.persist(execution_id, version, state).await?;
        self.append_ledger(
            execution_id,
            Some(step_id),
            LedgerPayload::StepFailed { timestamp: Utc::now(), node_id: node, error: message },
        )?;
        self.event_bus.emit(QflowEvent::new(
            Topic::EXEC_STEP_COMPLETED,
            self.node_id.to_string(),
            Utc::now(),
            serde_json::json!({"execution_id": execution_id.to_string(), "step_id": step_id.to_string(), "status": "failed"}),
        ));

        if self.engine_config.failure_strategy == FailureStrategy::FailFast {
            self.finalize_execution(execution_id).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Run one step's behavior to a business result, dispatching by kind.
    /// `Task` is an identity pass-through (no action-handler registry
    /// exists yet); `ModuleCall` routes through the sandbox; `Condition`
    /// evaluates against recorded outputs; `Parallel` fans out via the
    /// dependency graph's edges already wired to its branches, so
    /// completing the fan-out step itself is enough to unblock them.
    async fn run_step(
        &self,
        step: &qflow_flow::Step,
        input: serde_json::Value,
        execution_id: ExecutionId,
        step_id: StepId,
        node: NodeId,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, String> {
        match &step.kind {
            StepKind::Task { .. } => Ok(input),
            StepKind::ModuleCall { module, function } => {
                self.invoke_module(module, function, input, execution_id, step_id, node).await
            }
            StepKind::Condition { expression } => {
                let lookup = |id: StepId| ctx.output_of(id);
                evaluate_condition(expression, &lookup).map(serde_json::Value::Bool)
            }
            StepKind::Parallel { .. } => Ok(serde_json::Value::Null),
            StepKind::EventTrigger { .. } => {
                Err("event-trigger steps are never dispatched directly".to_string())
            }
        }
    }

    async fn invoke_module(
        &self,
        module: &str,
        function: &str,
        input: serde_json::Value,
        execution_id: ExecutionId,
        step_id: StepId,
        node: NodeId,
    ) -> Result<serde_json::Value, String> {
        let invocation = ModuleInvocation {
            module: module.to_string(),
            function: function.to_string(),
            args: input,
            token_id: None,
            scope: ScopeLevel::Step(execution_id, step_id, node),
        };
        match self.sandbox.execute(invocation).await {
            Ok(ModuleOutcome::Success(value)) => Ok(value),
            Ok(ModuleOutcome::Failure { message }) => Err(message),
            Err(err) => Err(err.to_string()),
        }
    }

    /// Move a fully-terminal (or `FailFast`-shortcut) execution to its
    /// final `Completed`/`Failed` status. Idempotent: a second call against
    /// an already-terminal execution is a no-op.
    async fn finalize_execution(&self, execution_id: ExecutionId) -> Result<(), RuntimeError> {
        let (version, mut state) = self.load_state(execution_id).await?;
        if state.status != ExecutionStatus::Running {
            return Ok(());
        }

        if state.failed_steps.is_empty() {
            state.transition_status("complete", ExecutionStatus::Completed)?;
            self.persist(execution_id, version, &state).await?;
            self.append_ledger(
                execution_id,
                None,
                LedgerPayload::ExecutionCompleted { timestamp: Utc::now() },
            )?;
        } else {
            let error = format!("{} step(s) failed", state.failed_steps.len());
            state.transition_status("fail", ExecutionStatus::Failed)?;
            self.persist(execution_id, version, &state).await?;
            self.append_ledger(
                execution_id,
                None,
                LedgerPayload::ExecutionFailed { timestamp: Utc::now(), error },
            )?;
        }

        self.event_bus.emit(QflowEvent::new(
            Topic::EXEC_COMPLETED,
            self.node_id.to_string(),
            Utc::now(),
            serde_json::json!({"execution_id": execution_id.to_string(), "status": state.status.to_string()}),
        ));
        Ok(())
    }
}

impl From<QflowError> for RuntimeError {
    fn from(err: QflowError) -> Self {
        RuntimeError::Validation(err)
    }
}
