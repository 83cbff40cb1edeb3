//! Adaptive control: burn-rate sampling, the graceful-degradation ladder,
//! and autoscaling triggers, unified behind one [`coordinator::AdaptiveController`].
//!
//! This crate holds no execution-engine state of its own — it observes
//! metric snapshots fed to it and publishes its decisions on the shared
//! [`qflow_eventbus::EventBus`], leaving callers (the composition root,
//! the execution engine) to act on those events rather than being called
//! back into directly. This breaks what would otherwise be a cyclic
//! dependency between the engine and its own backpressure controller.
//!
//! - [`burn_rate`] — sampling, the four burn-rate vectors, cost-control
//!   actions.
//! - [`ladder`] — the N-level graceful-degradation ladder.
//! - [`scaling`] — autoscaling triggers and the proactive optimizer.
//! - [`coordinator`] — [`coordinator::AdaptiveController`], the public
//!   facade.
//! - [`config`] — [`config::AdaptiveConfig`].
//! - [`error`] — the crate-local [`error::AdaptiveError`] taxonomy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod burn_rate;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ladder;
pub mod scaling;

pub use burn_rate::{BurnRateVectors, CostControlAction, FlowCostAnalysis, MetricSample};
pub use config::AdaptiveConfig;
pub use coordinator::{AdaptiveController, ForcedAction, SystemStatus};
pub use error::AdaptiveError;
pub use ladder::{DegradationLadder, DegradationLevel};
pub use scaling::{Optimizer, OptimizerAction, ScalingAction, ScalingEvaluator, ScalingTrigger};
