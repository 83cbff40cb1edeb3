//! The normalized flow document model.

use std::time::Duration;

use qflow_core::{FlowId, StepId};
use serde::{Deserialize, Serialize};

/// A registered, immutable-after-commit flow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Identity. Immutable once the flow has been committed to storage.
    pub id: FlowId,
    /// Display name.
    pub name: String,
    /// Monotonic version; a new version is a new `Flow` value, not a mutation.
    pub version: u32,
    /// Principal that registered this flow.
    pub owner: String,
    /// Steps, in declaration order. Order has no execution meaning —
    /// the dependency graph decides that.
    pub steps: Vec<Step>,
    /// Descriptive/organizational metadata.
    pub metadata: FlowMetadata,
}

/// Non-semantic flow metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowMetadata {
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Organizational category.
    pub category: Option<String>,
    /// Whether the flow is discoverable outside its owner.
    pub visibility: Visibility,
    /// Permissions a triggering principal must hold to start this flow.
    pub required_permissions: Vec<String>,
}

/// Who may discover a flow definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the owner.
    #[default]
    Private,
    /// Any principal in the owner's DAO subnet.
    Subnet,
    /// Any principal.
    Public,
}

/// One node in a flow's step graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Identity, unique within the owning flow.
    pub id: StepId,
    /// What kind of step this is and its type-specific configuration.
    #[serde(flatten)]
    pub kind: StepKind,
    /// Step invocation parameters. Values may contain `${stepId.result}`
    /// dataflow references resolved at dispatch time.
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
    /// Wall-clock budget for one attempt.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Retry policy for business (not infrastructure) failures.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Resource ceilings enforced by the sandbox running this step.
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    /// Step to run next on success, if any.
    pub on_success: Option<StepId>,
    /// Step to run next on failure (after retry exhaustion), if any.
    pub on_failure: Option<StepId>,
    /// An exclusivity tag: two steps sharing one tag never run concurrently,
    /// even absent a dataflow edge between them (e.g. both write the same
    /// external account).
    #[serde(default)]
    pub resource_tag: Option<String>,
    /// A declared shared-state key: two steps sharing one key never run
    /// concurrently, same rationale as `resource_tag` but for in-flow state.
    #[serde(default)]
    pub state_key: Option<String>,
}

/// The default step timeout: 300 seconds.
#[must_use]
pub fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

/// The default, empty params object.
#[must_use]
pub fn default_params() -> serde_json::Value {
    serde_json::json!({})
}

/// What a step does and its type-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Invokes a named action/module function.
    Task {
        /// `<module>.<function>` or a bare action name.
        action: String,
    },
    /// Suspends until an external event matching `event_type` arrives.
    EventTrigger {
        /// The event type this step waits for.
        event_type: String,
    },
    /// Branches on a boolean expression over prior step results.
    Condition {
        /// The expression to evaluate, e.g. `"${a.result} == true"`.
        expression: String,
    },
    /// Fans out to a set of child steps with no ordering between them.
    Parallel {
        /// The steps this fan-out dispatches.
        branches: Vec<StepId>,
    },
    /// Calls a shim-registered out-of-scope module directly (mail, image,
    /// crypto, permission, index, integrity).
    ModuleCall {
        /// The module being called.
        module: String,
        /// The function within that module.
        function: String,
    },
}

/// Retry policy for business-logic failures. Infrastructure faults retry
/// independently under the engine's own budget, not this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first, not just retries.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub backoff_base: Duration,
    /// Fractional jitter applied to each backoff, in `[0.0, 1.0]`.
    pub backoff_jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_jitter: 0.2,
        }
    }
}

/// Resource ceilings for one step's sandboxed execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Max resident memory, in bytes.
    pub max_memory_bytes: Option<u64>,
    /// Max CPU time, in milliseconds.
    pub max_cpu_millis: Option<u64>,
    /// Max wall-clock runtime; defaults to the step's own `timeout`.
    pub max_wall_time: Option<Duration>,
}

/// A step's lifecycle state, advanced by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Declared but not yet eligible (predecessors unresolved).
    Pending,
    /// All predecessors resolved; eligible for dispatch.
    Ready,
    /// Assigned to a node, awaiting acknowledgement.
    Dispatched,
    /// Acknowledged and executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a business or infrastructure failure, retries exhausted.
    Failed,
    /// Execution-level abort reached this step before it ran.
    Aborted,
    /// A predecessor's outcome made this step unreachable.
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_default_matches_spec_constants() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_base, Duration::from_secs(1));
        assert!((policy.backoff_jitter - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn step_kind_tag_is_snake_case() {
        let task = StepKind::Task {
            action: "crypto.sign".into(),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "task");
        assert_eq!(json["action"], "crypto.sign");
    }

    #[test]
    fn visibility_defaults_to_private() {
        assert_eq!(Visibility::default(), Visibility::Private);
    }
}
