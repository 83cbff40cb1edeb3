//! Execution-level status, per §3's Execution entity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one execution. `Aborted` is reached from `{Pending, Running,
/// Paused}` via `abortExecution` — there is no separately-observable
/// "aborting" status; cooperative-then-hard cancellation happens as part
/// of that single transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Registered but not yet dispatching steps.
    Pending,
    /// Actively advancing the step graph.
    Running,
    /// Dispatch suspended; already-queued dispatches stay queued.
    Paused,
    /// Every step reached a terminal state with no failures recorded.
    Completed,
    /// A step exhausted its retries with no `onFailure` target.
    Failed,
    /// Aborted by request before reaching a natural terminal state.
    Aborted,
}

impl ExecutionStatus {
    /// Terminal statuses never transition further.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// `true` while the engine may still dispatch or advance this execution.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Completed
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}
