//! Scope system tying resources to a flow/execution/step lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{ExecutionId, FlowId, NodeId, StepId};

/// The lifecycle level a resource (sandbox, token, cache entry, ...) is
/// bound to.
///
/// Hierarchy: `Global` > `Flow` > `Execution` > `Step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeLevel {
    /// Lives for the process lifetime (e.g. the validation pipeline itself).
    Global,
    /// Scoped to a registered flow definition.
    Flow(FlowId),
    /// Scoped to a single execution of a flow.
    Execution(ExecutionId),
    /// Scoped to one step's dispatch within an execution, on a given node.
    Step(ExecutionId, StepId, NodeId),
}

impl ScopeLevel {
    /// `true` for [`ScopeLevel::Global`].
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, ScopeLevel::Global)
    }

    /// `true` for [`ScopeLevel::Flow`].
    #[must_use]
    pub fn is_flow(&self) -> bool {
        matches!(self, ScopeLevel::Flow(_))
    }

    /// `true` for [`ScopeLevel::Execution`].
    #[must_use]
    pub fn is_execution(&self) -> bool {
        matches!(self, ScopeLevel::Execution(_))
    }

    /// `true` for [`ScopeLevel::Step`].
    #[must_use]
    pub fn is_step(&self) -> bool {
        matches!(self, ScopeLevel::Step(..))
    }

    /// The execution this scope is nested under, if any.
    #[must_use]
    pub fn execution_id(&self) -> Option<ExecutionId> {
        match self {
            ScopeLevel::Execution(id) | ScopeLevel::Step(id, _, _) => Some(*id),
            ScopeLevel::Global | ScopeLevel::Flow(_) => None,
        }
    }

    /// The step this scope is bound to, if any.
    #[must_use]
    pub fn step_id(&self) -> Option<StepId> {
        match self {
            ScopeLevel::Step(_, id, _) => Some(*id),
            _ => None,
        }
    }

    /// `true` if `self` is reachable through `other`'s lifetime — i.e. a
    /// resource scoped to `self` may legally be authorized by something
    /// scoped to `other`.
    #[must_use]
    pub fn is_contained_in(&self, other: &ScopeLevel) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (_, ScopeLevel::Global) => true,
            (ScopeLevel::Execution(_) | ScopeLevel::Step(..), ScopeLevel::Flow(_)) => true,
            (ScopeLevel::Step(exec, _, _), ScopeLevel::Execution(other_exec)) => {
                exec == other_exec
            }
            _ => false,
        }
    }
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeLevel::Global => write!(f, "global"),
            ScopeLevel::Flow(id) => write!(f, "flow:{id}"),
            ScopeLevel::Execution(id) => write!(f, "execution:{id}"),
            ScopeLevel::Step(exec, step, node) => write!(f, "step:{exec}:{step}:{node}"),
        }
    }
}

/// Implemented by anything that carries an explicit [`ScopeLevel`].
pub trait Scoped {
    /// The scope this value is bound to.
    fn scope(&self) -> &ScopeLevel;

    /// Whether `self`'s scope is reachable from `other`.
    fn is_in_scope(&self, other: &ScopeLevel) -> bool {
        self.scope().is_contained_in(other)
    }
}

/// Implemented by values carrying the identifiers of their surrounding
/// execution context, independent of whether they also carry a
/// [`ScopeLevel`]. Used by log/event enrichment call sites.
pub trait HasContext {
    /// The execution this value was produced within, if any.
    fn execution_id(&self) -> Option<ExecutionId>;
    /// The step this value concerns, if any.
    fn step_id(&self) -> Option<StepId>;
    /// The node this value concerns, if any.
    fn node_id(&self) -> Option<NodeId>;

    /// `true` if [`HasContext::execution_id`] is populated.
    fn has_execution_context(&self) -> bool {
        self.execution_id().is_some()
    }
}
