//! The execution state + ledger append port.
//!
//! This is the port the spec's distributed takeover is built on: a node
//! wins the right to drive an execution by winning `transition`'s
//! compare-and-set against the currently stored version, and holds that
//! right by periodically renewing a lease the same way.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qflow_core::ExecutionId;

use crate::error::PortsError;

/// Stores execution state and its append-only journal, and arbitrates
/// which node is currently allowed to drive a given execution.
#[async_trait]
pub trait ExecutionRepo: Send + Sync {
    /// Current `(version, state)` for an execution, if it exists.
    async fn get_state(
        &self,
        id: ExecutionId,
    ) -> Result<Option<(u64, serde_json::Value)>, PortsError>;

    /// Compare-and-set the execution's state. Succeeds (`true`) only if
    /// `expected_version` matches what's currently stored; on success the
    /// stored version becomes `expected_version + 1`. A `false` return (not
    /// an error) signals the caller lost the race and should re-read.
    async fn transition(
        &self,
        id: ExecutionId,
        expected_version: u64,
        new_state: serde_json::Value,
    ) -> Result<bool, PortsError>;

    /// The full append-only journal for an execution, oldest first.
    async fn get_journal(&self, id: ExecutionId) -> Result<Vec<serde_json::Value>, PortsError>;

    /// Append one entry to an execution's journal. Never mutates or removes
    /// prior entries.
    async fn append_journal(
        &self,
        id: ExecutionId,
        entry: serde_json::Value,
    ) -> Result<(), PortsError>;

    /// Attempt to acquire the exclusive-writer lease for an execution.
    /// `true` if acquired; `false` if another holder currently has it.
    async fn acquire_lease(
        &self,
        id: ExecutionId,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, PortsError>;

    /// Extend a lease this `holder` currently owns. `false` if the lease
    /// expired or is held by someone else (the caller must re-acquire,
    /// i.e. treat the execution as having been taken over).
    async fn renew_lease(
        &self,
        id: ExecutionId,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, PortsError>;

    /// Voluntarily give up a lease this `holder` owns (e.g. on graceful
    /// shutdown). `false` if it wasn't the current holder.
    async fn release_lease(&self, id: ExecutionId, holder: &str) -> Result<bool, PortsError>;

    /// Ids of terminal executions last updated before `before`, for
    /// retention cleanup.
    async fn list_terminal(&self, before: DateTime<Utc>) -> Result<Vec<ExecutionId>, PortsError>;

    /// Permanently remove an execution's state and journal. Returns
    /// `false` if it didn't exist.
    async fn delete(&self, id: ExecutionId) -> Result<bool, PortsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_object_safe(_: &dyn ExecutionRepo) {}

    struct Noop;

    #[async_trait]
    impl ExecutionRepo for Noop {
        async fn get_state(
            &self,
            _id: ExecutionId,
        ) -> Result<Option<(u64, serde_json::Value)>, PortsError> {
            Ok(None)
        }
        async fn transition(
            &self,
            _id: ExecutionId,
            _expected_version: u64,
            _new_state: serde_json::Value,
        ) -> Result<bool, PortsError> {
            Ok(true)
        }
        async fn get_journal(&self, _id: ExecutionId) -> Result<Vec<serde_json::Value>, PortsError> {
            Ok(Vec::new())
        }
        async fn append_journal(
            &self,
            _id: ExecutionId,
            _entry: serde_json::Value,
        ) -> Result<(), PortsError> {
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
        async fn list_terminal(&self, _before: DateTime<Utc>) -> Result<Vec<ExecutionId>, PortsError> {
            Ok(Vec::new())
        }
        async fn delete(&self, _id: ExecutionId) -> Result<bool, PortsError> {
            Ok(false)
        }
    }

    #[test]
    fn is_object_safe() {
        assert_object_safe(&Noop);
    }

    #[tokio::test]
    async fn works_as_boxed_dyn() {
        let repo: Box<dyn ExecutionRepo> = Box::new(Noop);
        let id = ExecutionId::v4();
        assert!(
            repo.transition(id, 0, serde_json::json!({"status": "running"}))
                .await
                .unwrap()
        );
    }
}
