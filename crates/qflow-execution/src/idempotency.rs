//! Idempotency keys: guarantee a step attempt is never double-applied by
//! a sandbox/module that retries its own delivery.

use std::collections::HashSet;

use qflow_core::{ExecutionId, StepId};
use serde::{Deserialize, Serialize};

/// A deterministic key identifying one `(execution, step, attempt)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for a given attempt. Deterministic: the same triple
    /// always produces the same key, so a replayed attempt is recognized
    /// without consulting any external state.
    #[must_use]
    pub fn generate(execution_id: ExecutionId, step_id: StepId, attempt: u32) -> Self {
        Self(format!("{execution_id}:{step_id}:{attempt}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracks which idempotency keys have already been seen, so a duplicate
/// delivery (e.g. a sandbox retrying a host call after a slow response)
/// is recognized rather than re-applied.
#[derive(Debug, Default)]
pub struct IdempotencyManager {
    seen: HashSet<IdempotencyKey>,
}

impl IdempotencyManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` was already seen; marks it seen either way.
    pub fn check_and_mark(&mut self, key: IdempotencyKey) -> bool {
        !self.seen.insert(key)
    }

    #[must_use]
    pub fn is_seen(&self, key: &IdempotencyKey) -> bool {
        self.seen.contains(key)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
