//! Adaptive-control-local error type.

use qflow_error::{InfrastructureError, QflowError};
use thiserror::Error;

/// Errors raised by the burn-rate service, degradation ladder, or
/// autoscaling triggers.
#[derive(Debug, Error)]
pub enum AdaptiveError {
    /// The supplied [`crate::config::AdaptiveConfig`] failed validation.
    #[error("invalid adaptive config: {0}")]
    InvalidConfig(String),

    /// An escalate/de-escalate call named a ladder level that doesn't exist.
    #[error("no such degradation level: {0}")]
    UnknownLevel(usize),

    /// An escalate call arrived before `escalation_cooldown` elapsed since
    /// the last change.
    #[error("escalation cooldown still active, {remaining_ms}ms remaining")]
    CooldownActive { remaining_ms: u64 },

    /// A forced adaptive action named a kind the coordinator doesn't
    /// recognize.
    #[error("unknown adaptive action: {0}")]
    UnknownAction(String),

    /// Too many adaptive actions already in flight.
    #[error("max concurrent actions ({0}) reached")]
    ActionBudgetExhausted(usize),
}

impl From<AdaptiveError> for QflowError {
    fn from(err: AdaptiveError) -> Self {
        let base = match &err {
            AdaptiveError::InvalidConfig(detail) => QflowError::new(qflow_error::ErrorKind::from(
                qflow_error::InputError::InvalidType {
                    field: "adaptive_config".to_string(),
                    expected: "valid range".to_string(),
                    actual: detail.clone(),
                },
            )),
            AdaptiveError::UnknownLevel(level) => {
                QflowError::new(qflow_error::ErrorKind::from(qflow_error::StateError::InvalidTransition {
                    action: "escalate".to_string(),
                    from: format!("level {level}"),
                }))
            }
            AdaptiveError::CooldownActive { .. } => QflowError::new(qflow_error::ErrorKind::from(
                InfrastructureError::ResourceUnavailable {
                    resource: "escalation cooldown".to_string(),
                },
            )),
            AdaptiveError::UnknownAction(action) => {
                QflowError::new(qflow_error::ErrorKind::from(qflow_error::InputError::InvalidType {
                    field: "action_kind".to_string(),
                    expected: "registered adaptive action".to_string(),
                    actual: action.clone(),
                }))
            }
            AdaptiveError::ActionBudgetExhausted(limit) => QflowError::new(
                qflow_error::ErrorKind::from(InfrastructureError::ResourceUnavailable {
                    resource: format!("adaptive action slots (max {limit})"),
                }),
            ),
        };
        base.with_details(err.to_string())
    }
}
