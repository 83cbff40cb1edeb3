//! The `AdaptiveController` facade tying the burn-rate service,
//! degradation ladder, and autoscaling triggers together behind one
//! `start`/`stop`/`updateMetrics` contract, publishing to the shared
//! [`EventBus`] rather than calling back into the execution engine
//! directly — the cyclic-reference-breaking wiring the composition root
//! relies on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use qflow_eventbus::{EventBus, QflowEvent, Topic};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::burn_rate::{self, BurnRateVectors, MetricSample};
use crate::config::AdaptiveConfig;
use crate::error::AdaptiveError;
use crate::ladder::{DegradationLadder, DegradationLevel};
use crate::scaling::{ScalingAction, ScalingEvaluator, ScalingTrigger};

/// Emergency thresholds that bypass cooldowns entirely.
#[derive(Debug, Clone, Copy)]
pub struct EmergencyThresholds {
    /// p99 latency fraction of budget above which the ladder force-escalates.
    pub performance_fraction: f64,
    /// Resource utilization above which the ladder force-escalates.
    pub resource_utilization: f64,
}

impl Default for EmergencyThresholds {
    fn default() -> Self {
        Self {
            performance_fraction: 0.95,
            resource_utilization: 0.95,
        }
    }
}

/// A forced adaptive action requested out-of-band, e.g. from an operator
/// tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ForcedAction {
    /// Force the ladder to a specific level.
    SetDegradationLevel(usize),
    /// Force a scaling action by name.
    Scale(ScalingAction),
}

/// Snapshot returned by [`AdaptiveController::get_system_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Most recent overall burn rate, `[0, 1]`.
    pub overall: f64,
    /// Most recent per-performance burn-rate component.
    pub performance: f64,
    /// Current fleet size as tracked by the scaling evaluator.
    pub scaling: u32,
    /// Current degradation level index.
    pub optimization: usize,
    /// Names of adaptive actions currently considered in flight.
    pub active_actions: Vec<String>,
    /// Whether the controller is in emergency (cooldown-bypassing) mode.
    pub emergency_mode: bool,
    /// Free-text recommendations surfaced for operators.
    pub recommendations: Vec<String>,
}

struct Inner {
    config: AdaptiveConfig,
    ladder: DegradationLadder,
    scaling: ScalingEvaluator,
    last_vectors: BurnRateVectors,
    active_actions: Vec<String>,
    emergency_mode: bool,
}

/// Coordinates the burn-rate service, degradation ladder, and autoscaling
/// triggers behind a single entry point, publishing state changes to the
/// bus rather than calling back into its callers.
pub struct AdaptiveController {
    node_id: String,
    bus: Arc<EventBus>,
    running: AtomicBool,
    inner: Mutex<Inner>,
    emergency: EmergencyThresholds,
}

impl AdaptiveController {
    /// Build a controller. `levels` seeds the degradation ladder (index 0
    /// is Normal); `triggers` seeds the autoscaling evaluator.
    #[must_use]
    pub fn new(
        node_id: impl Into<String>,
        bus: Arc<EventBus>,
        config: AdaptiveConfig,
        levels: Vec<DegradationLevel>,
        triggers: Vec<ScalingTrigger>,
        current_nodes: u32,
    ) -> Self {
        let ladder = DegradationLadder::new(
            levels,
            config.escalation_cooldown,
            config.deescalation_delay,
        );
        let scaling = ScalingEvaluator::new(triggers, current_nodes);
        Self {
            node_id: node_id.into(),
            bus,
            running: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                config,
                ladder,
                scaling,
                last_vectors: BurnRateVectors {
                    overall: 0.0,
                    per_resource: 0.0,
                    per_cost: 0.0,
                    per_performance: 0.0,
                },
                active_actions: Vec::new(),
                emergency_mode: false,
            }),
            emergency: EmergencyThresholds::default(),
        }
    }

    /// Mark the controller running. Idempotent.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(node_id = %self.node_id, "adaptive controller started");
    }

    /// Mark the controller stopped. Idempotent; does not clear accumulated
    /// state, only further `updateMetrics` calls are ignored.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!(node_id = %self.node_id, "adaptive controller stopped");
    }

    /// Whether the controller is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ingest a new metrics sample: recomputes burn rate, evaluates
    /// scaling triggers, checks for emergency conditions, and publishes
    /// the resulting events. A no-op if [`Self::stop`] was called.
    pub fn update_metrics(
        &self,
        sample: MetricSample,
        named_metrics: &HashMap<String, f64>,
    ) {
        if !self.is_running() {
            return;
        }
        let vectors = burn_rate::compute_burn_rate(sample);
        let mut inner = self.inner.lock();
        inner.last_vectors = vectors;

        self.bus.emit(QflowEvent::new(
            Topic::SYSTEM_METRICS_UPDATED,
            self.node_id.clone(),
            Utc::now(),
            json!({
                "overall": vectors.overall,
                "per_resource": vectors.per_resource,
                "per_cost": vectors.per_cost,
                "per_performance": vectors.per_performance,
            }),
        ));

        let is_emergency = sample.performance_fraction >= self.emergency.performance_fraction
            || sample.resource_utilization >= self.emergency.resource_utilization;
        inner.emergency_mode = is_emergency;
        if is_emergency {
            let top = inner.ladder_top_level();
            let _ = inner.ladder.force_escalate(top, "emergency threshold breached");
            self.bus.emit(QflowEvent::new(
                Topic::EMERGENCY_RESPONSE,
                self.node_id.clone(),
                Utc::now(),
                json!({"level": inner.ladder.current_level()}),
            ));
        } else if vectors.overall >= inner.config.burn_rate_threshold {
            let next = (inner.ladder.current_level() + 1).min(inner.ladder_top_level());
            if inner.active_actions.len() < inner.config.max_concurrent_actions {
                if inner
                    .ladder
                    .escalate(next, "burn rate above threshold")
                    .is_ok()
                {
                    inner.active_actions.push(format!("escalate:{next}"));
                    self.bus.emit(QflowEvent::new(
                        Topic::DEGRADATION_ESCALATED,
                        self.node_id.clone(),
                        Utc::now(),
                        json!({"level": next}),
                    ));
                }
            }
        } else {
            let lower = inner.ladder.current_level().saturating_sub(1);
            if inner.ladder.de_escalate(lower, "burn rate recovered").is_ok() {
                self.bus.emit(QflowEvent::new(
                    Topic::DEGRADATION_DEESCALATED,
                    self.node_id.clone(),
                    Utc::now(),
                    json!({"level": lower}),
                ));
            }
        }

        inner.scaling.evaluate(named_metrics);

        self.bus.emit(QflowEvent::new(
            Topic::BURN_RATE_CALCULATED,
            self.node_id.clone(),
            Utc::now(),
            json!({"overall": vectors.overall}),
        ));
    }

    /// Force an out-of-band adaptive action, bypassing normal triggers.
    pub fn force_adaptive_action(&self, action: ForcedAction) -> Result<(), AdaptiveError> {
        let mut inner = self.inner.lock();
        match action {
            ForcedAction::SetDegradationLevel(level) => inner.ladder.force_escalate(level, "forced"),
            ForcedAction::Scale(kind) => {
                inner.active_actions.push(format!("forced:{kind:?}"));
                Ok(())
            }
        }
    }

    /// Current status snapshot, per the coordinator contract.
    #[must_use]
    pub fn get_system_status(&self) -> SystemStatus {
        let inner = self.inner.lock();
        SystemStatus {
            overall: inner.last_vectors.overall,
            performance: inner.last_vectors.per_performance,
            scaling: inner.scaling.current_nodes(),
            optimization: inner.ladder.current_level(),
            active_actions: inner.active_actions.clone(),
            emergency_mode: inner.emergency_mode,
            recommendations: inner.recommendations(),
        }
    }
}

impl Inner {
    fn ladder_top_level(&self) -> usize {
        self.ladder.level_count().saturating_sub(1)
    }

    fn recommendations(&self) -> Vec<String> {
        let mut recs = Vec::new();
        if self.last_vectors.overall >= self.config.burn_rate_threshold {
            recs.push("burn rate above threshold; consider pausing low-priority flows".to_string());
        }
        if self.emergency_mode {
            recs.push("emergency mode active; investigate before de-escalating".to_string());
        }
        recs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> AdaptiveController {
        AdaptiveController::new(
            "node-1",
            Arc::new(EventBus::new(64)),
            AdaptiveConfig {
                escalation_cooldown: std::time::Duration::from_millis(0),
                deescalation_delay: std::time::Duration::from_millis(0),
                ..AdaptiveConfig::default()
            },
            vec![
                DegradationLevel::normal(),
                DegradationLevel::normal(),
                DegradationLevel::normal(),
            ],
            Vec::new(),
            3,
        )
    }

    #[test]
    fn update_metrics_is_a_no_op_before_start() {
        let controller = controller();
        controller.update_metrics(
            MetricSample {
                resource_utilization: 0.99,
                cost_fraction: 0.99,
                performance_fraction: 0.99,
            },
            &HashMap::new(),
        );
        assert_eq!(controller.get_system_status().overall, 0.0);
    }

    #[test]
    fn high_burn_rate_escalates_and_publishes() {
        let controller = controller();
        controller.start();
        let mut sub = controller.bus.subscribe();
        controller.update_metrics(
            MetricSample {
                resource_utilization: 0.9,
                cost_fraction: 0.9,
                performance_fraction: 0.9,
            },
            &HashMap::new(),
        );
        let status = controller.get_system_status();
        assert!(status.overall > 0.8);
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn emergency_thresholds_set_emergency_mode() {
        let controller = controller();
        controller.start();
        controller.update_metrics(
            MetricSample {
                resource_utilization: 0.99,
                cost_fraction: 0.1,
                performance_fraction: 0.1,
            },
            &HashMap::new(),
        );
        assert!(controller.get_system_status().emergency_mode);
    }

    #[test]
    fn force_adaptive_action_sets_level_directly() {
        let controller = controller();
        controller.start();
        controller
            .force_adaptive_action(ForcedAction::SetDegradationLevel(2))
            .unwrap();
        assert_eq!(controller.get_system_status().optimization, 2);
    }
}
