//! Distributed takeover: how a node acquires the exclusive right to drive
//! an orphaned execution with no leader election involved.
//!
//! A node observes another node's heartbeat go silent past the takeover
//! threshold, then races every other observer for the write lease via
//! [`ExecutionRepo::acquire_lease`] and records the takeover in the
//! execution's journal via a CAS'd [`ExecutionRepo::transition`]. Exactly
//! one racer wins the lease; everyone else's `acquire_lease` returns
//! `false` and they back off.

use std::time::Duration;

use chrono::{DateTime, Utc};
use qflow_core::{ExecutionId, NodeId};
use qflow_ports::ExecutionRepo;

use crate::error::ExecutionEngineError;

/// How long a node's heartbeat may go unrenewed before another node may
/// attempt takeover.
pub const DEFAULT_TAKEOVER_THRESHOLD: Duration = Duration::from_secs(30);

/// Whether `last_heartbeat` is old enough that `execution_id`'s current
/// driver should be considered orphaned.
#[must_use]
pub fn is_orphaned(last_heartbeat: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    let elapsed = (now - last_heartbeat).to_std().unwrap_or(Duration::ZERO);
    elapsed > threshold
}

/// A won takeover: the caller now holds the exclusive-writer lease and
/// should append a reassignment record before resuming step dispatch.
#[derive(Debug, Clone, Copy)]
pub struct TakeoverGrant {
    pub execution_id: ExecutionId,
    pub new_holder: NodeId,
}

/// Attempt to take over a (presumed orphaned) execution. Returns `Ok(Some)`
/// on success, `Ok(None)` if another node won the race, and propagates a
/// port error only on genuine infrastructure failure.
pub async fn attempt_takeover(
    repo: &dyn ExecutionRepo,
    execution_id: ExecutionId,
    new_holder: NodeId,
    lease_ttl: Duration,
) -> Result<Option<TakeoverGrant>, ExecutionEngineError> {
    let holder_str = new_holder.to_string();
    let acquired = repo.acquire_lease(execution_id, &holder_str, lease_ttl).await?;
    if !acquired {
        return Ok(None);
    }

    let reassignment = serde_json::json!({
        "event": "takeover",
        "execution_id": execution_id.to_string(),
        "new_holder": holder_str,
        "at": Utc::now().to_rfc3339(),
    });
    repo.append_journal(execution_id, reassignment).await?;

    Ok(Some(TakeoverGrant {
        execution_id,
        new_holder,
    }))
}

/// Renew a held lease; `Ok(false)` means the lease was lost (expired or
/// stolen) and the caller must stop driving this execution immediately.
pub async fn renew(
    repo: &dyn ExecutionRepo,
    execution_id: ExecutionId,
    holder: NodeId,
    lease_ttl: Duration,
) -> Result<bool, ExecutionEngineError> {
    Ok(repo
        .renew_lease(execution_id, &holder.to_string(), lease_ttl)
        .await?)
}
