//! Adaptive control configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AdaptiveError;

/// Configuration for the [`crate::coordinator::AdaptiveController`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Overall burn rate above which cost-control actions may fire.
    pub burn_rate_threshold: f64,
    /// How long a degradation level must remain cooled down before the
    /// ladder may escalate further.
    pub escalation_cooldown: Duration,
    /// How long the ladder must sit below a level's trigger before
    /// de-escalating back down one rung.
    pub deescalation_delay: Duration,
    /// Upper bound on adaptive actions the coordinator may have in flight
    /// at once.
    pub max_concurrent_actions: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            burn_rate_threshold: 0.8,
            escalation_cooldown: Duration::from_secs(60),
            deescalation_delay: Duration::from_secs(120),
            max_concurrent_actions: 10,
        }
    }
}

impl AdaptiveConfig {
    /// Validate the configuration, returning an error if any field is out
    /// of range.
    pub fn validate(&self) -> Result<(), AdaptiveError> {
        if !(0.0..=1.0).contains(&self.burn_rate_threshold) {
            return Err(AdaptiveError::InvalidConfig(
                "burn_rate_threshold must be in [0.0, 1.0]".to_string(),
            ));
        }
        if self.escalation_cooldown.is_zero() {
            return Err(AdaptiveError::InvalidConfig(
                "escalation_cooldown must be greater than zero".to_string(),
            ));
        }
        if self.deescalation_delay.is_zero() {
            return Err(AdaptiveError::InvalidConfig(
                "deescalation_delay must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_actions == 0 {
            return Err(AdaptiveError::InvalidConfig(
                "max_concurrent_actions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(AdaptiveConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_burn_rate_threshold_is_rejected() {
        let config = AdaptiveConfig {
            burn_rate_threshold: 1.5,
            ..AdaptiveConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cooldown_is_rejected() {
        let config = AdaptiveConfig {
            escalation_cooldown: Duration::ZERO,
            ..AdaptiveConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
