//! The sandboxed module-invocation port.
//!
//! Kept independent of `qflow-sandbox`'s own capability/WASM types so that
//! crate sits downstream of this one: `qflow-sandbox` implements
//! [`SandboxRunner`] and converts its richer internal errors down to
//! [`PortsError`] at this boundary.

use async_trait::async_trait;
use qflow_core::{ScopeLevel, TokenId};
use serde::{Deserialize, Serialize};

use crate::error::PortsError;

/// A single call into an out-of-scope module (mail, image, crypto,
/// permission, index, integrity, ...), gated by capability token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInvocation {
    /// The module being called, e.g. `"crypto"`.
    pub module: String,
    /// The function within that module, e.g. `"sign"`.
    pub function: String,
    /// Call arguments.
    pub args: serde_json::Value,
    /// The capability token authorizing this call, if any was presented.
    pub token_id: Option<TokenId>,
    /// The lifecycle scope (step/execution/flow) this invocation runs under.
    pub scope: ScopeLevel,
}

/// The result of a module invocation that ran to completion (as opposed to
/// an infrastructure fault, which surfaces as `Err(PortsError)`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ModuleOutcome {
    /// The module call returned normally.
    Success(serde_json::Value),
    /// The module call returned a business failure (not a sandbox fault).
    Failure {
        /// Human-readable failure reason.
        message: String,
    },
}

/// Executes a single module invocation inside a sandboxed context.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Run `invocation` to completion or to a sandbox-level fault.
    async fn execute(&self, invocation: ModuleInvocation) -> Result<ModuleOutcome, PortsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_object_safe(_: &dyn SandboxRunner) {}

    struct Noop;

    #[async_trait]
    impl SandboxRunner for Noop {
        async fn execute(&self, _invocation: ModuleInvocation) -> Result<ModuleOutcome, PortsError> {
            Ok(ModuleOutcome::Success(serde_json::Value::Null))
        }
    }

    #[test]
    fn is_object_safe() {
        assert_object_safe(&Noop);
    }

    #[tokio::test]
    async fn works_as_arc_dyn() {
        use std::sync::Arc;
        let runner: Arc<dyn SandboxRunner> = Arc::new(Noop);
        let invocation = ModuleInvocation {
            module: "crypto".into(),
            function: "sign".into(),
            args: serde_json::json!({}),
            token_id: None,
            scope: ScopeLevel::Global,
        };
        assert_eq!(
            runner.execute(invocation).await.unwrap(),
            ModuleOutcome::Success(serde_json::Value::Null)
        );
    }
}
