//! Graceful-degradation ladder.
//!
//! Generalizes the workspace's `CircuitBreaker` Closed/Open/HalfOpen
//! transition-and-cooldown state machine into an N-level ladder: instead of
//! three named states there are levels `0..levels.len()` (0 == Normal),
//! and instead of one `reset_timeout` there are two distinct cooldowns —
//! escalation climbs the ladder, de-escalation climbs back down, each
//! gated by its own elapsed-time requirement against the last change.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::AdaptiveError;

/// One rung of the degradation ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationLevel {
    /// Human-readable description, e.g. "Normal", "Reduced validation".
    pub description: String,
    /// Summary of the SLA impact at this level.
    pub sla_impact: String,
    /// Actions this level takes: pause flows below this priority.
    pub pause_priority_below: Option<u8>,
    /// Names of optional validation layers disabled at this level.
    pub disabled_validation_layers: Vec<String>,
    /// Parallelism cap at this level, if it shrinks dispatch width.
    pub max_parallel_steps: Option<usize>,
    /// Whether non-critical ingress is rejected at this level.
    pub reject_non_critical_ingress: bool,
}

impl DegradationLevel {
    /// Level 0: no degradation, nothing disabled.
    #[must_use]
    pub fn normal() -> Self {
        Self {
            description: "Normal".to_string(),
            sla_impact: "none".to_string(),
            pause_priority_below: None,
            disabled_validation_layers: Vec::new(),
            max_parallel_steps: None,
            reject_non_critical_ingress: false,
        }
    }
}

/// A manual override of the ladder's current level, expiring after a fixed
/// window.
#[derive(Debug, Clone, Copy)]
struct ManualOverride {
    level: usize,
    expires_at: Instant,
}

/// The degradation ladder's mutable state: current level and the
/// timestamps gating further transitions.
#[derive(Debug)]
pub struct DegradationLadder {
    levels: Vec<DegradationLevel>,
    current_level: usize,
    last_change: Instant,
    escalation_cooldown: Duration,
    deescalation_delay: Duration,
    manual_override: Option<ManualOverride>,
}

impl DegradationLadder {
    /// Build a ladder. `levels[0]` is treated as Normal regardless of its
    /// content; callers typically pass [`DegradationLevel::normal`] first.
    #[must_use]
    pub fn new(
        levels: Vec<DegradationLevel>,
        escalation_cooldown: Duration,
        deescalation_delay: Duration,
    ) -> Self {
        Self {
            levels,
            current_level: 0,
            last_change: Instant::now(),
            escalation_cooldown,
            deescalation_delay,
            manual_override: None,
        }
    }

    /// The currently active level index.
    #[must_use]
    pub fn current_level(&self) -> usize {
        self.manual_override
            .filter(|o| o.expires_at > Instant::now())
            .map_or(self.current_level, |o| o.level)
    }

    /// The currently active level's definition.
    #[must_use]
    pub fn current(&self) -> &DegradationLevel {
        &self.levels[self.current_level()]
    }

    /// Number of levels on the ladder, including level 0 (Normal).
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Climb to `level`, provided `escalation_cooldown` has elapsed since
    /// the last transition. Escalating to a level at or below the current
    /// one is a no-op success (idempotent).
    pub fn escalate(&mut self, level: usize, reason: &str) -> Result<(), AdaptiveError> {
        self.validate_level(level)?;
        if level <= self.current_level {
            return Ok(());
        }
        self.check_cooldown(self.escalation_cooldown)?;
        tracing::warn!(level, reason, "escalating degradation level");
        self.current_level = level;
        self.last_change = Instant::now();
        Ok(())
    }

    /// Climb down to `level`, provided `deescalation_delay` has elapsed
    /// since the last transition. De-escalating to a level at or above the
    /// current one is a no-op success.
    pub fn de_escalate(&mut self, level: usize, reason: &str) -> Result<(), AdaptiveError> {
        self.validate_level(level)?;
        if level >= self.current_level {
            return Ok(());
        }
        self.check_cooldown(self.deescalation_delay)?;
        tracing::info!(level, reason, "de-escalating degradation level");
        self.current_level = level;
        self.last_change = Instant::now();
        Ok(())
    }

    /// Bypass cooldowns entirely and jump straight to `level`. Used for
    /// emergency conditions that must escalate immediately.
    pub fn force_escalate(&mut self, level: usize, reason: &str) -> Result<(), AdaptiveError> {
        self.validate_level(level)?;
        tracing::error!(level, reason, "emergency escalation, bypassing cooldown");
        self.current_level = level.max(self.current_level);
        self.last_change = Instant::now();
        Ok(())
    }

    /// Temporarily pin the ladder to `level` for `ttl`, overriding the
    /// auto-escalation machinery until it expires.
    pub fn set_manual_override(&mut self, level: usize, ttl: Duration) -> Result<(), AdaptiveError> {
        self.validate_level(level)?;
        self.manual_override = Some(ManualOverride {
            level,
            expires_at: Instant::now() + ttl,
        });
        Ok(())
    }

    fn validate_level(&self, level: usize) -> Result<(), AdaptiveError> {
        if level >= self.levels.len() {
            return Err(AdaptiveError::UnknownLevel(level));
        }
        Ok(())
    }

    fn check_cooldown(&self, required: Duration) -> Result<(), AdaptiveError> {
        let elapsed = self.last_change.elapsed();
        if elapsed < required {
            return Err(AdaptiveError::CooldownActive {
                remaining_ms: (required - elapsed).as_millis() as u64,
            });
        }
        Ok(())
    }
}
