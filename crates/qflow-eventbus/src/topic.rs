//! Stable topic names, `q.qflow.<domain>.<verb>.vN`.

/// A stable, versioned topic name.
///
/// New topics are additive; an existing topic's payload shape only grows
/// new optional fields, never changes the meaning of an existing one —
/// bump the version suffix if that's ever unavoidable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic(pub &'static str);

impl Topic {
    /// A flow document was registered.
    pub const FLOW_CREATED: Topic = Topic("q.qflow.flow.created.v1");
    /// An execution began.
    pub const EXEC_STARTED: Topic = Topic("q.qflow.exec.started.v1");
    /// A step was dispatched to a node.
    pub const EXEC_STEP_DISPATCHED: Topic = Topic("q.qflow.exec.step.dispatched.v1");
    /// A step finished (success or business failure).
    pub const EXEC_STEP_COMPLETED: Topic = Topic("q.qflow.exec.step.completed.v1");
    /// An execution reached a terminal state.
    pub const EXEC_COMPLETED: Topic = Topic("q.qflow.exec.completed.v1");
    /// A validation pipeline run finished for some operation.
    pub const VALIDATION_PIPELINE_EXECUTED: Topic =
        Topic("q.qflow.validation.pipeline.executed.v1");
    /// A capability token was minted.
    pub const CAPABILITY_TOKEN_ISSUED: Topic = Topic("q.qflow.capability.token.issued.v1");
    /// A capability token authorized a call.
    pub const CAPABILITY_TOKEN_USED: Topic = Topic("q.qflow.capability.token.used.v1");
    /// A capability token was revoked before expiry.
    pub const CAPABILITY_TOKEN_REVOKED: Topic = Topic("q.qflow.capability.token.revoked.v1");
    /// A sandbox instance was created.
    pub const SANDBOX_CREATED: Topic = Topic("q.qflow.sandbox.created.v1");
    /// A sandbox instance was torn down.
    pub const SANDBOX_DESTROYED: Topic = Topic("q.qflow.sandbox.destroyed.v1");
    /// A sandbox violated its resource or import contract.
    pub const SANDBOX_VIOLATION: Topic = Topic("q.qflow.sandbox.violation.v1");
    /// A sandbox attempted to escape isolation.
    pub const SANDBOX_ESCAPE_DETECTED: Topic = Topic("q.qflow.sandbox.escape.detected.v1");
    /// The degradation ladder escalated a level.
    pub const DEGRADATION_ESCALATED: Topic = Topic("q.qflow.degradation.escalated.v1");
    /// The degradation ladder de-escalated a level.
    pub const DEGRADATION_DEESCALATED: Topic = Topic("q.qflow.degradation.deescalated.v1");
    /// A burn-rate window was recalculated.
    pub const BURN_RATE_CALCULATED: Topic = Topic("q.qflow.burn_rate.calculated.v1");
    /// The adaptive coordinator ingested a new metrics snapshot.
    pub const SYSTEM_METRICS_UPDATED: Topic = Topic("q.qflow.adaptive.metrics.updated.v1");
    /// An emergency condition bypassed cooldowns and escalated directly.
    pub const EMERGENCY_RESPONSE: Topic = Topic("q.qflow.adaptive.emergency.response.v1");

    /// The raw topic string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_follow_the_q_qflow_domain_verb_version_shape() {
        for topic in [
            Topic::FLOW_CREATED,
            Topic::EXEC_STARTED,
            Topic::SANDBOX_ESCAPE_DETECTED,
            Topic::BURN_RATE_CALCULATED,
        ] {
            assert!(topic.as_str().starts_with("q.qflow."));
            assert!(topic.as_str().ends_with(".v1"));
        }
    }
}
