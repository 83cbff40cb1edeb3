//! Composition-root configuration: the explicit, enumerated settings that
//! replace the source system's `any`-typed config objects.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// How the engine reacts when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStrategy {
    /// Keep advancing independent steps; only the failed step's downstream
    /// dependents are blocked.
    ContinueOnError,
    /// Abort the whole execution as soon as any step fails.
    FailFast,
}

/// How aggressively the engine schedules steps against node capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceAllocation {
    /// Default headroom, no over-subscription.
    Balanced,
    /// Over-subscribe nodes to favor throughput over headroom.
    Aggressive,
    /// Leave extra headroom, favor stability over throughput.
    Conservative,
}

/// The engine's explicit, enumerated configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on steps dispatched concurrently within one execution.
    pub max_concurrent_steps: usize,
    /// Per-step wall-clock budget before it's considered timed out.
    pub timeout: Duration,
    /// Business-retry attempts before a step's failure is terminal.
    pub retry_attempts: u32,
    /// What to do when a step fails.
    pub failure_strategy: FailureStrategy,
    /// How aggressively to schedule against node capacity.
    pub resource_allocation: ResourceAllocation,
    /// How long this node's write lease on an execution lasts before it
    /// must be renewed.
    pub lease_ttl: Duration,
    /// How long a terminal execution's state is kept before
    /// `cleanup_executions` may remove it.
    pub cleanup_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: 8,
            timeout: Duration::from_secs(300),
            retry_attempts: 3,
            failure_strategy: FailureStrategy::ContinueOnError,
            resource_allocation: ResourceAllocation::Balanced,
            lease_ttl: qflow_execution::DEFAULT_LEASE_TTL,
            cleanup_after: Duration::from_secs(86_400),
        }
    }
}

impl EngineConfig {
    /// Reject an internally inconsistent configuration before it's wired
    /// into a [`crate::Qflow`].
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.max_concurrent_steps == 0 {
            return Err(RuntimeError::InvalidConfig(
                "max_concurrent_steps must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(RuntimeError::InvalidConfig(
                "timeout must be non-zero".to_string(),
            ));
        }
        if self.lease_ttl.is_zero() {
            return Err(RuntimeError::InvalidConfig(
                "lease_ttl must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What to do when a step's output exceeds the configured size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LargeDataStrategy {
    /// Reject the output with `RuntimeError::DataLimitExceeded`.
    Reject,
    /// Spill the output to `BlobStore` and pass a digest reference.
    SpillToBlob,
}

/// Controls how much data a step may pass downstream. Generalizes the
/// workspace's existing per-node `DataPassingPolicy` from a single process
/// to a distributed execution: the per-step limit still bounds one step's
/// own output, while the total limit now bounds a whole execution's
/// cumulative output across every node in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPassingPolicy {
    /// Maximum size of a single step's output, in bytes.
    pub max_step_output_bytes: u64,
    /// Maximum cumulative output size across one execution, in bytes.
    pub max_total_execution_bytes: u64,
    /// What happens when a step's output exceeds `max_step_output_bytes`.
    pub large_data_strategy: LargeDataStrategy,
}

impl Default for DataPassingPolicy {
    fn default() -> Self {
        Self {
            max_step_output_bytes: 10 * 1024 * 1024,
            max_total_execution_bytes: 100 * 1024 * 1024,
            large_data_strategy: LargeDataStrategy::Reject,
        }
    }
}

impl DataPassingPolicy {
    /// `Ok(size)` if `output`'s serialized size is within the per-step
    /// limit, `Err((limit, actual))` otherwise.
    pub fn check_output_size(&self, output: &serde_json::Value) -> Result<u64, (u64, u64)> {
        let size = serde_json::to_vec(output).map(|bytes| bytes.len() as u64).unwrap_or(0);
        if size > self.max_step_output_bytes {
            Err((self.max_step_output_bytes, size))
        } else {
            Ok(size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = EngineConfig {
            max_concurrent_steps: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn output_within_limit_is_ok() {
        let policy = DataPassingPolicy {
            max_step_output_bytes: 1024,
            ..DataPassingPolicy::default()
        };
        assert!(policy.check_output_size(&serde_json::json!({"a": 1})).is_ok());
    }

    #[test]
    fn output_over_limit_is_rejected() {
        let policy = DataPassingPolicy {
            max_step_output_bytes: 4,
            ..DataPassingPolicy::default()
        };
        let (limit, actual) = policy
            .check_output_size(&serde_json::json!({"a_longer_key": "a_longer_value"}))
            .unwrap_err();
        assert_eq!(limit, 4);
        assert!(actual > 4);
    }
}
