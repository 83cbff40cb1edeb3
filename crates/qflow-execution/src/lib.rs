//! The distributed execution engine: step advancement, node selection,
//! distributed takeover, and retry accounting, all written against the
//! abstract [`qflow_ports`] seam so this crate never depends on a concrete
//! storage, queue, or sandbox driver.
//!
//! - [`engine`] — the public facade: registerFlow/startExecution/
//!   getExecutionStatus/pauseExecution/resumeExecution/abortExecution/
//!   cleanupExecutions.
//! - [`state`] — the persisted [`state::ExecutionState`]/
//!   [`state::StepExecutionState`] shape stored behind `ExecutionRepo`.
//! - [`context`] — the non-serializable in-memory runtime context for one
//!   in-flight execution.
//! - [`condition`] — the minimal `${stepId.field} == literal` evaluator
//!   backing `StepKind::Condition` steps.
//! - [`plan`] — `ExecutionPlan::from_flow`, wrapping the flow's dependency
//!   graph with precomputed levels and entry/exit steps.
//! - [`advancement`] — next-ready-set computation and parallel-dispatch
//!   batching.
//! - [`selection`] — node candidate ranking given a capability/load/latency
//!   snapshot.
//! - [`takeover`] — orphan detection and CAS-based distributed takeover.
//! - [`retry`] — business-vs-infrastructure retry budget accounting.
//! - [`idempotency`], [`attempt`], [`output`] — per-attempt bookkeeping.
//! - [`status`], [`transition`] — the execution/step status enums and
//!   their transition tables.
//! - [`error`] — the crate-local [`error::ExecutionEngineError`] taxonomy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod advancement;
pub mod attempt;
pub mod condition;
pub mod context;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod output;
pub mod plan;
pub mod retry;
pub mod selection;
pub mod state;
pub mod status;
pub mod takeover;
pub mod transition;

pub use advancement::{advance, can_run_concurrently, dispatch_batch, AdvancementResult};
pub use condition::evaluate as evaluate_condition;
pub use context::ExecutionContext;
pub use engine::{Engine, ExecutionSummary};
pub use error::ExecutionEngineError;
pub use idempotency::{IdempotencyKey, IdempotencyManager};
pub use output::{StepOutput, StepOutputData};
pub use plan::ExecutionPlan;
pub use state::{ExecutionState, ExecutionTrigger, StepExecutionState};
pub use status::ExecutionStatus;
pub use takeover::{attempt_takeover, is_orphaned, renew, TakeoverGrant};
