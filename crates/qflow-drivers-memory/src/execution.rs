//! In-memory `ExecutionRepo` driver: state + journal + lease arbitration.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use qflow_core::ExecutionId;
use qflow_ports::error::PortsError;
use qflow_ports::execution::ExecutionRepo;

/// Terminal status strings per `qflow_execution::ExecutionStatus`'s
/// `Display` impl. Kept as plain strings rather than a dependency on
/// `qflow-execution` so this driver stays a generic `serde_json::Value`
/// store, matching every other port's storage shape.
const TERMINAL_STATUSES: [&str; 3] = ["completed", "failed", "aborted"];

struct Record {
    version: u64,
    state: serde_json::Value,
    updated_at: DateTime<Utc>,
    journal: Vec<serde_json::Value>,
}

struct Lease {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// In-memory, single-process [`ExecutionRepo`]. The exclusive-writer lease
/// is a plain `(holder, expiry)` pair per execution — good enough to
/// exercise the takeover protocol in a single process, but it confers no
/// durability across a process restart.
#[derive(Default)]
pub struct MemoryExecutionRepo {
    records: RwLock<HashMap<ExecutionId, Record>>,
    leases: RwLock<HashMap<ExecutionId, Lease>>,
}

impl MemoryExecutionRepo {
    /// Build an empty repo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_terminal(state: &serde_json::Value) -> bool {
        state
            .get("status")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|s| TERMINAL_STATUSES.contains(&s))
    }
}

#[async_trait]
impl ExecutionRepo for MemoryExecutionRepo {
    async fn get_state(
        &self,
        id: ExecutionId,
    ) -> Result<Option<(u64, serde_json::Value)>, PortsError> {
        Ok(self
            .records
            .read()
            .get(&id)
            .map(|record| (record.version, record.state.clone())))
    }

    async fn transition(
        &self,
        id: ExecutionId,
        expected_version: u64,
        new_state: serde_json::Value,
    ) -> Result<bool, PortsError> {
        let mut records = self.records.write();
        let actual_version = records.get(&id).map_or(0, |record| record.version);
        if actual_version != expected_version {
            return Ok(false);
        }
        let journal = records
            .get(&id)
            .map(|record| record.journal.clone())
            .unwrap_or_default();
        records.insert(
            id,
            Record {
                version: expected_version + 1,
                state: new_state,
                updated_at: Utc::now(),
                journal,
            },
        );
        Ok(true)
    }

    async fn get_journal(&self, id: ExecutionId) -> Result<Vec<serde_json::Value>, PortsError> {
        Ok(self
            .records
            .read()
            .get(&id)
            .map(|record| record.journal.clone())
            .unwrap_or_default())
    }

    async fn append_journal(
        &self,
        id: ExecutionId,
        entry: serde_json::Value,
    ) -> Result<(), PortsError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| PortsError::not_found("execution", id.to_string()))?;
        record.journal.push(entry);
        Ok(())
    }

    async fn acquire_lease(
        &self,
        id: ExecutionId,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, PortsError> {
        let mut leases = self.leases.write();
        let now = Utc::now();
        if let Some(existing) = leases.get(&id) {
            if existing.expires_at > now && existing.holder != holder {
                return Ok(false);
            }
        }
        leases.insert(
            id,
            Lease {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn renew_lease(
        &self,
        id: ExecutionId,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, PortsError> {
        let mut leases = self.leases.write();
        let now = Utc::now();
        match leases.get_mut(&id) {
            Some(lease) if lease.holder == holder && lease.expires_at > now => {
                lease.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lease(&self, id: ExecutionId, holder: &str) -> Result<bool, PortsError> {
        let mut leases = self.leases.write();
        match leases.get(&id) {
            Some(lease) if lease.holder == holder => {
                leases.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_terminal(&self, before: DateTime<Utc>) -> Result<Vec<ExecutionId>, PortsError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(_, record)| record.updated_at < before && Self::is_terminal(&record.state))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn delete(&self, id: ExecutionId) -> Result<bool, PortsError> {
        self.leases.write().remove(&id);
        Ok(self.records.write().remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let repo = MemoryExecutionRepo::new();
        let id = ExecutionId::v4();
        assert!(repo.transition(id, 0, json!({"status": "pending"})).await.unwrap());
        assert!(!repo.transition(id, 0, json!({"status": "running"})).await.unwrap());
        assert!(repo.transition(id, 1, json!({"status": "running"})).await.unwrap());
    }

    #[tokio::test]
    async fn append_journal_requires_existing_state() {
        let repo = MemoryExecutionRepo::new();
        let id = ExecutionId::v4();
        assert!(repo.append_journal(id, json!({"event": "x"})).await.is_err());
        repo.transition(id, 0, json!({"status": "pending"})).await.unwrap();
        repo.append_journal(id, json!({"event": "started"})).await.unwrap();
        assert_eq!(repo.get_journal(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn only_one_holder_acquires_an_unexpired_lease() {
        let repo = MemoryExecutionRepo::new();
        let id = ExecutionId::v4();
        assert!(repo.acquire_lease(id, "node-a", Duration::from_secs(30)).await.unwrap());
        assert!(!repo.acquire_lease(id, "node-b", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn lease_becomes_available_after_expiry() {
        let repo = MemoryExecutionRepo::new();
        let id = ExecutionId::v4();
        assert!(repo.acquire_lease(id, "node-a", Duration::from_millis(1)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(repo.acquire_lease(id, "node-b", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn renew_lease_fails_for_non_holder() {
        let repo = MemoryExecutionRepo::new();
        let id = ExecutionId::v4();
        repo.acquire_lease(id, "node-a", Duration::from_secs(30)).await.unwrap();
        assert!(!repo.renew_lease(id, "node-b", Duration::from_secs(30)).await.unwrap());
        assert!(repo.renew_lease(id, "node-a", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn list_terminal_and_delete() {
        let repo = MemoryExecutionRepo::new();
        let id = ExecutionId::v4();
        repo.transition(id, 0, json!({"status": "completed"})).await.unwrap();
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let terminal = repo.list_terminal(cutoff).await.unwrap();
        assert_eq!(terminal, vec![id]);
        assert!(repo.delete(id).await.unwrap());
        assert!(repo.get_state(id).await.unwrap().is_none());
    }
}
