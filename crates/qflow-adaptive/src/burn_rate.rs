//! Burn-rate sampling and cost-control actions.
//!
//! Samples resource utilization and cost on a fixed interval and derives
//! four burn-rate vectors from the latest sample. Generalizes the
//! watermark-over-a-window idiom of the workspace's `AutoScalePolicy`: here
//! the "watermark" is a single `threshold` crossed by an overall burn rate
//! rather than a pool-utilization percentage.

use qflow_core::FlowId;
use serde::{Deserialize, Serialize};

/// A single resource/cost/performance sample taken on the fixed sampling
/// interval.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricSample {
    /// Fraction of provisioned compute capacity in use, `[0, 1]`.
    pub resource_utilization: f64,
    /// Fraction of the cost budget consumed so far this period, `[0, 1]`.
    pub cost_fraction: f64,
    /// Observed p99 step latency against its declared budget, `[0, 1]`
    /// (1.0 == at budget).
    pub performance_fraction: f64,
}

/// The four burn-rate vectors derived from a [`MetricSample`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BurnRateVectors {
    /// Weighted combination of the other three.
    pub overall: f64,
    /// Matches `resource_utilization` directly.
    pub per_resource: f64,
    /// Matches `cost_fraction` directly.
    pub per_cost: f64,
    /// Matches `performance_fraction` directly.
    pub per_performance: f64,
}

/// Computes the four burn-rate vectors from one sample. `overall` is the
/// mean of the three components — no single dimension dominates the
/// escalation decision on its own.
#[must_use]
pub fn compute_burn_rate(sample: MetricSample) -> BurnRateVectors {
    let overall = (sample.resource_utilization + sample.cost_fraction + sample.performance_fraction)
        / 3.0;
    BurnRateVectors {
        overall,
        per_resource: sample.resource_utilization,
        per_cost: sample.cost_fraction,
        per_performance: sample.performance_fraction,
    }
}

/// A cost-control action the burn-rate service can take once a threshold is
/// crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CostControlAction {
    /// Pause flows below the given priority so higher-priority flows keep
    /// their resource share.
    PauseLowPriorityFlows {
        /// Burn rate that triggered the pause.
        burn_rate_threshold: f64,
        /// Priority percentile below which flows are paused.
        percentile_target: f64,
    },
    /// Defer dispatch of steps tagged as resource-heavy.
    DeferHeavySteps {
        /// Burn rate that triggered the defer.
        threshold: f64,
    },
    /// Redirect new dispatches to nodes in cold (low-cost) DAO subnets.
    RerouteFlowsToColdNodes {
        /// Burn rate that triggered the reroute.
        threshold: f64,
        /// Fraction of eligible flows to reroute.
        percentile: f64,
    },
}

/// A per-flow cost breakdown, as returned by `analyzeFlowCost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCostAnalysis {
    /// The analyzed flow.
    pub flow_id: FlowId,
    /// Sum of per-step compute cost for the analyzed executions.
    pub total_cost: f64,
    /// Cost attributable to retried (as opposed to first) attempts.
    pub retry_cost: f64,
}

/// Decides which cost-control action to take (if any) given the current
/// burn rate and a threshold. Returns `None` below threshold.
#[must_use]
pub fn pause_low_priority_flows(
    vectors: BurnRateVectors,
    burn_rate_threshold: f64,
    percentile_target: f64,
) -> Option<CostControlAction> {
    (vectors.overall >= burn_rate_threshold).then_some(CostControlAction::PauseLowPriorityFlows {
        burn_rate_threshold,
        percentile_target,
    })
}

/// As [`pause_low_priority_flows`] but for deferring heavy steps.
#[must_use]
pub fn defer_heavy_steps(vectors: BurnRateVectors, threshold: f64) -> Option<CostControlAction> {
    (vectors.per_resource >= threshold).then_some(CostControlAction::DeferHeavySteps { threshold })
}

/// As [`pause_low_priority_flows`] but for rerouting to cold nodes, gated on
/// the cost dimension rather than resource utilization.
#[must_use]
pub fn reroute_flows_to_cold_nodes(
    vectors: BurnRateVectors,
    threshold: f64,
    percentile: f64,
) -> Option<CostControlAction> {
    (vectors.per_cost >= threshold).then_some(CostControlAction::RerouteFlowsToColdNodes {
        threshold,
        percentile,
    })
}

/// Summarizes a flow's cost from its per-execution cost samples.
#[must_use]
pub fn analyze_flow_cost(flow_id: FlowId, execution_costs: &[(f64, bool)]) -> FlowCostAnalysis {
    let total_cost = execution_costs.iter().map(|(cost, _)| cost).sum();
    let retry_cost = execution_costs
        .iter()
        .filter(|(_, is_retry)| *is_retry)
        .map(|(cost, _)| cost)
        .sum();
    FlowCostAnalysis {
        flow_id,
        total_cost,
        retry_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_burn_rate_is_the_mean_of_its_components() {
        let vectors = compute_burn_rate(MetricSample {
            resource_utilization: 0.9,
            cost_fraction: 0.6,
            performance_fraction: 0.3,
        });
        assert!((vectors.overall - 0.6).abs() < 1e-9);
    }

    #[test]
    fn pause_low_priority_flows_fires_only_above_threshold() {
        let below = BurnRateVectors {
            overall: 0.5,
            per_resource: 0.5,
            per_cost: 0.5,
            per_performance: 0.5,
        };
        assert!(pause_low_priority_flows(below, 0.8, 0.5).is_none());

        let above = BurnRateVectors {
            overall: 0.9,
            ..below
        };
        assert!(pause_low_priority_flows(above, 0.8, 0.5).is_some());
    }

    #[test]
    fn analyze_flow_cost_separates_retry_cost() {
        let analysis =
            analyze_flow_cost(FlowId::v4(), &[(10.0, false), (4.0, true), (2.0, true)]);
        assert!((analysis.total_cost - 16.0).abs() < 1e-9);
        assert!((analysis.retry_cost - 6.0).abs() < 1e-9);
    }
}
