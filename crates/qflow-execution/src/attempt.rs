//! One attempt at running a step.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::idempotency::IdempotencyKey;
use crate::output::StepOutput;

/// Distinguishes a step's own business-logic failure from a fault in the
/// surrounding system. Infrastructure faults retry independently of the
/// step's declared `RetryPolicy` budget — a crashed sandbox shouldn't cost
/// the step one of its three business retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The step ran and returned an error.
    Business,
    /// The sandbox crashed, the assigned node went unreachable mid-run, or
    /// some other fault in the surrounding system.
    Infrastructure,
}

/// One attempt at running a step — a node execution that may succeed,
/// fail, or still be in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAttempt {
    pub attempt_number: u32,
    pub idempotency_key: IdempotencyKey,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<StepOutput>,
    pub error: Option<String>,
    pub fault: Option<FaultKind>,
}

impl StepAttempt {
    #[must_use]
    pub fn start(attempt_number: u32, idempotency_key: IdempotencyKey) -> Self {
        Self {
            attempt_number,
            idempotency_key,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error: None,
            fault: None,
        }
    }

    pub fn complete_success(&mut self, output: StepOutput) {
        self.completed_at = Some(Utc::now());
        self.output = Some(output);
    }

    pub fn complete_failure(&mut self, error: impl Into<String>, fault: FaultKind) {
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.fault = Some(fault);
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.is_complete() && self.error.is_none()
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn is_infrastructure_fault(&self) -> bool {
        self.fault == Some(FaultKind::Infrastructure)
    }

    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at
            .map(|end| (end - self.started_at).to_std().unwrap_or_default())
    }
}
