//! The composition root: a small explicitly-constructed builder wiring
//! every collaborator behind a [`crate::Qflow`] facade.
//!
//! Generalizes the workspace's module-level singletons into one place that
//! owns construction order; nothing here is reached for via a global.

use std::sync::Arc;

use parking_lot::Mutex;
use qflow_adaptive::{AdaptiveConfig, AdaptiveController, DegradationLevel, ScalingTrigger};
use qflow_core::NodeId;
use qflow_eventbus::EventBus;
use qflow_ledger::Ledger;
use qflow_ports::{BlobStore, ExecutionRepo, FlowStore, NodeMembership, SandboxRunner, TaskQueue};
use qflow_validation::ValidationPipeline;

use crate::config::{DataPassingPolicy, EngineConfig};
use crate::error::RuntimeError;
use crate::runtime::Qflow;

/// Default capacity of the event bus's internal broadcast channel.
const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Collects every port, policy, and config a running [`Qflow`] needs, then
/// validates and wires them into the facade.
///
/// Construction order mirrors the teacher's `ActionRuntime` composition:
/// ports and policies first, the event bus shared across every
/// collaborator that publishes to it, then the facade that ties them
/// together.
pub struct QflowBuilder {
    node_id: NodeId,
    flows: Option<Arc<dyn FlowStore>>,
    executions: Option<Arc<dyn ExecutionRepo>>,
    membership: Option<Arc<dyn NodeMembership>>,
    queue: Option<Arc<dyn TaskQueue>>,
    blobs: Option<Arc<dyn BlobStore>>,
    sandbox: Option<Arc<dyn SandboxRunner>>,
    event_bus: Option<Arc<EventBus>>,
    validation: Option<ValidationPipeline>,
    engine_config: EngineConfig,
    data_policy: DataPassingPolicy,
    adaptive_config: AdaptiveConfig,
    degradation_levels: Vec<DegradationLevel>,
    scaling_triggers: Vec<ScalingTrigger>,
    ledger_key: Vec<u8>,
}

impl QflowBuilder {
    /// Start building a composition for `node_id`.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            flows: None,
            executions: None,
            membership: None,
            queue: None,
            blobs: None,
            sandbox: None,
            event_bus: None,
            validation: None,
            engine_config: EngineConfig::default(),
            data_policy: DataPassingPolicy::default(),
            adaptive_config: AdaptiveConfig::default(),
            degradation_levels: vec![DegradationLevel::normal()],
            scaling_triggers: Vec::new(),
            ledger_key: b"qflow-dev-ledger-key".to_vec(),
        }
    }

    /// Use in-memory drivers (`qflow-drivers-memory`) for every port not
    /// otherwise overridden. Suitable for a single-node deployment or for
    /// tests; production deployments override individual ports with
    /// durable/networked drivers behind the same traits.
    #[must_use]
    pub fn with_memory_drivers(mut self) -> Self {
        let node_id = self.node_id;
        self.flows.get_or_insert_with(|| Arc::new(qflow_drivers_memory::MemoryFlowStore::default()));
        self.executions
            .get_or_insert_with(|| Arc::new(qflow_drivers_memory::MemoryExecutionRepo::default()));
        self.membership.get_or_insert_with(|| {
            Arc::new(qflow_drivers_memory::MemoryMembership::new(
                vec![node_id],
                std::time::Duration::from_secs(30),
            ))
        });
        self.queue.get_or_insert_with(|| Arc::new(qflow_drivers_memory::MemoryQueue::new(256)));
        self.blobs.get_or_insert_with(|| Arc::new(qflow_drivers_memory::MemoryBlobStore::default()));
        self.sandbox
            .get_or_insert_with(|| Arc::new(qflow_sandbox::InProcessSandboxRunner::new(b"qflow-dev-signing-key".to_vec())));
        self
    }

    /// Override the flow store.
    #[must_use]
    pub fn flows(mut self, flows: Arc<dyn FlowStore>) -> Self {
        self.flows = Some(flows);
        self
    }

    /// Override the execution repo.
    #[must_use]
    pub fn executions(mut self, executions: Arc<dyn ExecutionRepo>) -> Self {
        self.executions = Some(executions);
        self
    }

    /// Override fleet membership.
    #[must_use]
    pub fn membership(mut self, membership: Arc<dyn NodeMembership>) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Override the task queue.
    #[must_use]
    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Override the blob store.
    #[must_use]
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Override the sandbox runner.
    #[must_use]
    pub fn sandbox(mut self, sandbox: Arc<dyn SandboxRunner>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Share an existing event bus instead of creating one. Useful when
    /// several `Qflow` instances (or out-of-core observers) subscribe to
    /// the same bus.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Wire a validation pipeline. Without one, `validate_flow` runs only
    /// structural validation (parsing plus cycle/reference checks).
    #[must_use]
    pub fn validation(mut self, pipeline: ValidationPipeline) -> Self {
        self.validation = Some(pipeline);
        self
    }

    /// Override the engine's explicit configuration.
    #[must_use]
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Override the data-passing policy.
    #[must_use]
    pub fn data_policy(mut self, policy: DataPassingPolicy) -> Self {
        self.data_policy = policy;
        self
    }

    /// Override the adaptive controller's config.
    #[must_use]
    pub fn adaptive_config(mut self, config: AdaptiveConfig) -> Self {
        self.adaptive_config = config;
        self
    }

    /// Set the graceful-degradation ladder. Defaults to a single normal
    /// level (no degradation ever triggers).
    #[must_use]
    pub fn degradation_levels(mut self, levels: Vec<DegradationLevel>) -> Self {
        self.degradation_levels = levels;
        self
    }

    /// Set the autoscaling triggers. Defaults to none.
    #[must_use]
    pub fn scaling_triggers(mut self, triggers: Vec<ScalingTrigger>) -> Self {
        self.scaling_triggers = triggers;
        self
    }

    /// Set the key the ledger signs records with.
    #[must_use]
    pub fn ledger_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.ledger_key = key.into();
        self
    }

    /// Validate the configuration and wire every collaborator into a
    /// running [`Qflow`].
    pub fn build(self) -> Result<Qflow, RuntimeError> {
        self.engine_config.validate()?;

        let flows = self
            .flows
            .ok_or_else(|| RuntimeError::InvalidConfig("no FlowStore configured".to_string()))?;
        let executions = self
            .executions
            .ok_or_else(|| RuntimeError::InvalidConfig("no ExecutionRepo configured".to_string()))?;
        let membership = self
            .membership
            .ok_or_else(|| RuntimeError::InvalidConfig("no NodeMembership configured".to_string()))?;
        let queue = self
            .queue
            .ok_or_else(|| RuntimeError::InvalidConfig("no TaskQueue configured".to_string()))?;
        let blobs = self
            .blobs
            .ok_or_else(|| RuntimeError::InvalidConfig("no BlobStore configured".to_string()))?;
        let sandbox = self
            .sandbox
            .ok_or_else(|| RuntimeError::InvalidConfig("no SandboxRunner configured".to_string()))?;

        let event_bus = self.event_bus.unwrap_or_else(|| Arc::new(EventBus::new(DEFAULT_EVENT_BUS_CAPACITY)));

        let adaptive = Arc::new(AdaptiveController::new(
            self.node_id.to_string(),
            Arc::clone(&event_bus),
            self.adaptive_config,
            self.degradation_levels,
            self.scaling_triggers,
            1,
        ));

        let engine = qflow_execution::Engine::new(Arc::clone(&flows), Arc::clone(&executions), self.node_id);

        Ok(Qflow::new(
            self.node_id,
            engine,
            flows,
            executions,
            membership,
            queue,
            blobs,
            sandbox,
            Arc::new(Mutex::new(Ledger::new(self.ledger_key))),
            self.validation,
            adaptive,
            event_bus,
            self.engine_config,
            self.data_policy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_fails_without_drivers() {
        let err = QflowBuilder::new(NodeId::v4()).build();
        assert!(err.is_err());
    }

    #[test]
    fn build_succeeds_with_memory_drivers() {
        let qflow = QflowBuilder::new(NodeId::v4()).with_memory_drivers().build();
        assert!(qflow.is_ok());
    }
}
