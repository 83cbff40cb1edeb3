//! In-process `SandboxRunner`: executes a module invocation in the same
//! process, gating every call on a presented capability token.
//!
//! Generalizes the workspace's existing capability-gated in-process driver
//! (`IsolationLevel::CapabilityGated`): no WASM isolation, but every host
//! call is still checked against a [`CapabilityToken`] before it runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use qflow_ports::error::PortsError;
use qflow_ports::sandbox::{ModuleInvocation, ModuleOutcome, SandboxRunner};

use crate::capability::{Capability, CapabilityToken, UseVerdict};

/// A recorded attempt to use a capability — successful or denied — kept
/// for audit and for `getSandboxViolations`-style reporting upstream.
#[derive(Debug, Clone)]
pub struct EgressRequest {
    pub module: String,
    pub function: String,
    pub approved: bool,
    pub reason: Option<String>,
    pub at: chrono::DateTime<Utc>,
}

/// Executes module invocations in-process, denying any call whose token
/// is missing, invalid, or doesn't cover the requested module/function.
#[derive(Default)]
pub struct InProcessSandboxRunner {
    tokens: Mutex<HashMap<qflow_core::TokenId, CapabilityToken>>,
    egress_log: Mutex<Vec<EgressRequest>>,
    signing_key: Vec<u8>,
}

impl InProcessSandboxRunner {
    #[must_use]
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            egress_log: Mutex::new(Vec::new()),
            signing_key: signing_key.into(),
        }
    }

    /// Register a token so later invocations can present it by id.
    pub fn register_token(&self, token: CapabilityToken) {
        self.tokens.lock().expect("tokens mutex poisoned").insert(token.id(), token);
    }

    /// The egress log, oldest first.
    #[must_use]
    pub fn egress_log(&self) -> Vec<EgressRequest> {
        self.egress_log.lock().expect("egress mutex poisoned").clone()
    }

    fn record(&self, module: &str, function: &str, approved: bool, reason: Option<String>) {
        self.egress_log.lock().expect("egress mutex poisoned").push(EgressRequest {
            module: module.to_string(),
            function: function.to_string(),
            approved,
            reason,
            at: Utc::now(),
        });
    }
}

#[async_trait]
impl SandboxRunner for InProcessSandboxRunner {
    async fn execute(&self, invocation: ModuleInvocation) -> Result<ModuleOutcome, PortsError> {
        let Some(token_id) = invocation.token_id else {
            self.record(&invocation.module, &invocation.function, false, Some("no token presented".into()));
            return Err(PortsError::Internal("capability token required".into()));
        };

        let tokens = self.tokens.lock().expect("tokens mutex poisoned");
        let Some(token) = tokens.get(&token_id) else {
            drop(tokens);
            self.record(&invocation.module, &invocation.function, false, Some("unknown token".into()));
            return Err(PortsError::Internal("unknown capability token".into()));
        };

        if !token.signature_is_valid(&self.signing_key) {
            let reason = "token signature invalid".to_string();
            drop(tokens);
            self.record(&invocation.module, &invocation.function, false, Some(reason.clone()));
            return Err(PortsError::Internal(reason));
        }

        let required = Capability::ModuleFunction {
            module: invocation.module.clone(),
            function: invocation.function.clone(),
        };

        let verdict = token.check_use(Utc::now(), &required, &invocation.function, &invocation.args);
        match verdict {
            UseVerdict::Allowed => {
                drop(tokens);
                self.record(&invocation.module, &invocation.function, true, None);
                Ok(ModuleOutcome::Success(invocation.args))
            }
            UseVerdict::Denied { reason } => {
                drop(tokens);
                self.record(&invocation.module, &invocation.function, false, Some(reason.clone()));
                Ok(ModuleOutcome::Failure { message: reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qflow_core::{ExecutionId, SandboxId, ScopeLevel, StepId, TokenId};
    use std::time::Duration;

    fn invocation(module: &str, function: &str, token_id: Option<TokenId>) -> ModuleInvocation {
        ModuleInvocation {
            module: module.to_string(),
            function: function.to_string(),
            args: serde_json::json!([]),
            token_id,
            scope: ScopeLevel::Global,
        }
    }

    #[tokio::test]
    async fn call_without_a_token_is_rejected() {
        let runner = InProcessSandboxRunner::new(b"k".to_vec());
        let result = runner.execute(invocation("crypto", "sign", None)).await;
        assert!(result.is_err());
        assert_eq!(runner.egress_log().len(), 1);
        assert!(!runner.egress_log()[0].approved);
    }

    #[tokio::test]
    async fn call_with_a_matching_token_succeeds() {
        let runner = InProcessSandboxRunner::new(b"k".to_vec());
        let token = CapabilityToken::issue(
            TokenId::v4(),
            SandboxId::v4(),
            ExecutionId::v4(),
            StepId::v4(),
            Capability::Module("crypto".into()),
            vec![],
            None,
            Duration::from_secs(60),
            Utc::now(),
            b"k",
        );
        let id = token.id();
        runner.register_token(token);

        let result = runner.execute(invocation("crypto", "sign", Some(id))).await.unwrap();
        assert!(matches!(result, ModuleOutcome::Success(_)));
        assert!(runner.egress_log()[0].approved);
    }

    #[tokio::test]
    async fn call_with_a_non_matching_capability_is_denied_not_erred() {
        let runner = InProcessSandboxRunner::new(b"k".to_vec());
        let token = CapabilityToken::issue(
            TokenId::v4(),
            SandboxId::v4(),
            ExecutionId::v4(),
            StepId::v4(),
            Capability::Module("mail".into()),
            vec![],
            None,
            Duration::from_secs(60),
            Utc::now(),
            b"k",
        );
        let id = token.id();
        runner.register_token(token);

        let result = runner.execute(invocation("crypto", "sign", Some(id))).await.unwrap();
        assert!(matches!(result, ModuleOutcome::Failure { .. }));
    }
}
