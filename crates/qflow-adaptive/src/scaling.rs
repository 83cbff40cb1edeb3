//! Autoscaling triggers and the proactive optimizer.
//!
//! Directly generalizes the workspace's `AutoScalePolicy`/`AutoScaler`:
//! the same watermark/evaluation-window/cooldown shape reappears here as a
//! metric threshold sustained for a window, gated by a cooldown before the
//! trigger fires again.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// The action a scaling trigger or the optimizer may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingAction {
    /// Add nodes, bounded by `max_nodes`.
    ScaleUp,
    /// Remove nodes, bounded by `min_nodes`.
    ScaleDown,
    /// Redirect load to other nodes without changing fleet size.
    RedirectLoad,
}

/// A single autoscaling trigger: a metric threshold sustained for an
/// evaluation window, subject to a cooldown between firings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingTrigger {
    /// Name of the metric this trigger watches (e.g. "queue_depth").
    pub metric: String,
    /// Threshold the metric must cross to arm the trigger.
    pub threshold: f64,
    /// How long the metric must stay past threshold before firing.
    pub evaluation_window: Duration,
    /// Minimum time between two firings of this trigger.
    pub cooldown: Duration,
    /// Action to take once fired.
    pub action: ScalingAction,
    /// Lower bound on fleet size this trigger will not scale below.
    pub min_nodes: u32,
    /// Upper bound on fleet size this trigger will not scale above.
    pub max_nodes: u32,
    /// Nodes added/removed per firing.
    pub scaling_factor: u32,
}

/// Per-trigger runtime bookkeeping: when the metric first crossed
/// threshold, and when the trigger last fired.
#[derive(Debug, Default)]
struct TriggerState {
    crossed_since: Option<Instant>,
    last_fired: Option<Instant>,
}

/// Evaluates a set of [`ScalingTrigger`]s against live metric values and
/// decides which actions to take, honoring windows, cooldowns, and bounds.
#[derive(Debug)]
pub struct ScalingEvaluator {
    triggers: Vec<ScalingTrigger>,
    states: Vec<TriggerState>,
    current_nodes: u32,
}

impl ScalingEvaluator {
    /// Build an evaluator starting from a known current fleet size.
    #[must_use]
    pub fn new(triggers: Vec<ScalingTrigger>, current_nodes: u32) -> Self {
        let states = triggers.iter().map(|_| TriggerState::default()).collect();
        Self {
            triggers,
            states,
            current_nodes,
        }
    }

    /// The evaluator's current view of fleet size.
    #[must_use]
    pub fn current_nodes(&self) -> u32 {
        self.current_nodes
    }

    /// Feed one metric sample. `metrics` maps metric name to value.
    /// Returns the actions that fired this call, each with the node delta
    /// already bounds-checked.
    pub fn evaluate(&mut self, metrics: &std::collections::HashMap<String, f64>) -> Vec<(ScalingAction, i64)> {
        let now = Instant::now();
        let mut fired = Vec::new();
        for (trigger, state) in self.triggers.iter().zip(self.states.iter_mut()) {
            let Some(&value) = metrics.get(&trigger.metric) else {
                state.crossed_since = None;
                continue;
            };
            if value < trigger.threshold {
                state.crossed_since = None;
                continue;
            }
            let crossed_since = *state.crossed_since.get_or_insert(now);
            if now.duration_since(crossed_since) < trigger.evaluation_window {
                continue;
            }
            if let Some(last) = state.last_fired {
                if now.duration_since(last) < trigger.cooldown {
                    continue;
                }
            }

            let delta = match trigger.action {
                ScalingAction::ScaleUp => {
                    let room = trigger.max_nodes.saturating_sub(self.current_nodes);
                    let step = trigger.scaling_factor.min(room);
                    if step == 0 {
                        continue;
                    }
                    i64::from(step)
                }
                ScalingAction::ScaleDown => {
                    let room = self.current_nodes.saturating_sub(trigger.min_nodes);
                    let step = trigger.scaling_factor.min(room);
                    if step == 0 {
                        continue;
                    }
                    -i64::from(step)
                }
                ScalingAction::RedirectLoad => 0,
            };

            self.current_nodes = (i64::from(self.current_nodes) + delta).max(0) as u32;
            state.last_fired = Some(now);
            state.crossed_since = None;
            fired.push((trigger.action, delta));
        }
        fired
    }
}

/// Optimizer recommendation on a warning-level (pre-critical) metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerAction {
    /// Pre-warm or enlarge a result cache.
    ActivateCache,
    /// Enlarge a connection pool.
    EnlargeConnectionPool,
    /// Disable optional (non-required) validation layers.
    TightenValidation,
}

/// Tracks which optimizer actions have already been applied with which
/// parameters, so repeated calls with unchanged inputs are no-ops.
#[derive(Debug, Default)]
pub struct Optimizer {
    last_applied: std::collections::HashMap<OptimizerAction, u64>,
}

impl Optimizer {
    /// Build an optimizer with no actions yet applied.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `action` with the given `param` (e.g. new cache size), unless
    /// it was already applied with the same parameter. Returns `true` if
    /// this call actually changed anything.
    pub fn apply(&mut self, action: OptimizerAction, param: u64) -> bool {
        if self.last_applied.get(&action) == Some(&param) {
            return false;
        }
        self.last_applied.insert(action, param);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> ScalingTrigger {
        ScalingTrigger {
            metric: "queue_depth".to_string(),
            threshold: 100.0,
            evaluation_window: Duration::from_millis(0),
            cooldown: Duration::from_millis(0),
            action: ScalingAction::ScaleUp,
            min_nodes: 1,
            max_nodes: 10,
            scaling_factor: 2,
        }
    }

    #[test]
    fn scale_up_fires_once_threshold_sustained() {
        let mut evaluator = ScalingEvaluator::new(vec![trigger()], 2);
        let mut metrics = std::collections::HashMap::new();
        metrics.insert("queue_depth".to_string(), 150.0);
        // first call arms the window; with a zero window it fires immediately.
        let fired = evaluator.evaluate(&metrics);
        assert_eq!(fired, vec![(ScalingAction::ScaleUp, 2)]);
        assert_eq!(evaluator.current_nodes(), 4);
    }

    #[test]
    fn scale_up_is_bounded_by_max_nodes() {
        let mut evaluator = ScalingEvaluator::new(vec![trigger()], 9);
        let mut metrics = std::collections::HashMap::new();
        metrics.insert("queue_depth".to_string(), 150.0);
        let fired = evaluator.evaluate(&metrics);
        assert_eq!(fired, vec![(ScalingAction::ScaleUp, 1)]);
        assert_eq!(evaluator.current_nodes(), 10);
    }

    #[test]
    fn metric_dropping_below_threshold_resets_the_window() {
        let mut evaluator = ScalingEvaluator::new(
            vec![ScalingTrigger {
                evaluation_window: Duration::from_secs(60),
                ..trigger()
            }],
            2,
        );
        let mut metrics = std::collections::HashMap::new();
        metrics.insert("queue_depth".to_string(), 150.0);
        assert!(evaluator.evaluate(&metrics).is_empty());
        metrics.insert("queue_depth".to_string(), 10.0);
        assert!(evaluator.evaluate(&metrics).is_empty());
        assert_eq!(evaluator.current_nodes(), 2);
    }

    #[test]
    fn optimizer_is_idempotent_on_unchanged_params() {
        let mut optimizer = Optimizer::new();
        assert!(optimizer.apply(OptimizerAction::ActivateCache, 1024));
        assert!(!optimizer.apply(OptimizerAction::ActivateCache, 1024));
        assert!(optimizer.apply(OptimizerAction::ActivateCache, 2048));
    }
}
