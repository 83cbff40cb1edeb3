//! Capability tokens and the constraints attached to them.
//!
//! Generalizes the workspace's existing `Capability`/`capabilities_match`/
//! `host_matches` pattern (an enum-per-kind plus a `matches(granted,
//! required)` free function) into a signed [`CapabilityToken`] carrying an
//! explicit [`Constraint`] list, checked in a fixed enforcement order on
//! every [`CapabilityToken::check_use`] call.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use qflow_core::{ExecutionId, SandboxId, StepId, TokenId};
use regex::Regex;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// What a token authorizes the holder to do.
///
/// Mirrors the workspace's `Capability` enum, widened to the module-call
/// shape this host uses (`qflow_ports::sandbox::ModuleInvocation`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Call into a named platform module, any function.
    Module(String),
    /// Call a specific function within a named module.
    ModuleFunction { module: String, function: String },
    /// Outbound network access to hosts matching a pattern (`*` prefix
    /// wildcard supported, same as the teacher's `host_matches`).
    Network { allowed_hosts: Vec<String> },
    /// Read/write of a scratch filesystem path prefix.
    FileSystem { paths: Vec<String>, read_only: bool },
}

impl Capability {
    /// `true` if `self` (granted) satisfies `required`.
    #[must_use]
    pub fn satisfies(&self, required: &Capability) -> bool {
        match (self, required) {
            (Capability::Module(g), Capability::Module(r)) => g == r,
            (Capability::Module(g), Capability::ModuleFunction { module: r, .. }) => g == r,
            (
                Capability::ModuleFunction { module: g, function: gf },
                Capability::ModuleFunction { module: r, function: rf },
            ) => g == r && gf == rf,
            (Capability::Network { allowed_hosts: g }, Capability::Network { allowed_hosts: r }) => {
                r.iter().all(|rh| g.iter().any(|gh| host_matches(gh, rh)))
            }
            (
                Capability::FileSystem { paths: g, read_only: g_ro },
                Capability::FileSystem { paths: r, read_only: r_ro },
            ) => {
                if *g_ro && !r_ro {
                    return false;
                }
                r.iter().all(|rp| g.iter().any(|gp| rp.starts_with(gp)))
            }
            _ => false,
        }
    }
}

/// Simple host pattern matching: `"*"` matches anything, `"*.example.com"`
/// matches the bare domain and any subdomain, otherwise exact match.
fn host_matches(pattern: &str, host: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        host == suffix || host.ends_with(&format!(".{suffix}"))
    } else {
        pattern == host
    }
}

/// A bound on one positional argument of a module call.
#[derive(Debug, Clone)]
pub struct ArgBound {
    /// Zero-based position in the call's argument list.
    pub position: usize,
    /// Expected JSON type name (`"string"`, `"number"`, `"boolean"`, ...).
    pub expected_type: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub allowed_values: Option<Vec<serde_json::Value>>,
    pub pattern: Option<Regex>,
    /// If `true`, the argument must be present.
    pub required: bool,
}

/// One constraint narrowing how a [`CapabilityToken`] may be used.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Bounds a single positional argument.
    ArgBound(ArgBound),
    /// Caps calls to `operation` to `max_requests` per `window`.
    RateLimit {
        operation: String,
        max_requests: u32,
        window: Duration,
    },
    /// Caps a named resource (e.g. `"memory_bytes"`) to a ceiling.
    ResourceLimit { resource: String, max_value: u64 },
    /// Restricts which hosts the token may reach.
    NetworkRestriction { allowed_hosts: Vec<String> },
    /// The token may only be used within this wall-clock window.
    TimeWindow {
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },
}

/// A single request to use a token, for rate-limiting accounting.
#[derive(Debug)]
struct RateWindow {
    operation: String,
    seen: Vec<Instant>,
}

/// The verdict returned by [`CapabilityToken::check_use`].
#[derive(Debug, Clone, PartialEq)]
pub enum UseVerdict {
    Allowed,
    Denied { reason: String },
}

/// A signed, scope-bound, usage-capped grant of one [`Capability`].
///
/// Tokens are deny-by-default: a module call with no token, or a token
/// whose capability doesn't satisfy the shim's requirement, is rejected.
pub struct CapabilityToken {
    id: TokenId,
    sandbox_id: SandboxId,
    execution_id: ExecutionId,
    step_id: StepId,
    capability: Capability,
    constraints: Vec<Constraint>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    max_uses: Option<u32>,
    uses: Mutex<u32>,
    rate_state: Mutex<Vec<RateWindow>>,
    signature: Vec<u8>,
}

impl CapabilityToken {
    /// Issue a token. `constraints` should already have been intersected
    /// against any DAO policy for the subnet by the caller (see
    /// [`apply_dao_policy`]).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        id: TokenId,
        sandbox_id: SandboxId,
        execution_id: ExecutionId,
        step_id: StepId,
        capability: Capability,
        constraints: Vec<Constraint>,
        max_uses: Option<u32>,
        duration: Duration,
        issued_at: DateTime<Utc>,
        signing_key: &[u8],
    ) -> Self {
        let expires_at = issued_at + chrono::Duration::from_std(duration).unwrap_or_default();
        let signature = sign(signing_key, id, sandbox_id, &capability, issued_at, expires_at);
        Self {
            id,
            sandbox_id,
            execution_id,
            step_id,
            capability,
            constraints,
            issued_at,
            expires_at,
            max_uses,
            uses: Mutex::new(0),
            rate_state: Mutex::new(Vec::new()),
            signature,
        }
    }

    #[must_use]
    pub fn id(&self) -> TokenId {
        self.id
    }

    #[must_use]
    pub fn sandbox_id(&self) -> SandboxId {
        self.sandbox_id
    }

    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    #[must_use]
    pub fn step_id(&self) -> StepId {
        self.step_id
    }

    #[must_use]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Verify the token's signature was produced by `signing_key`.
    #[must_use]
    pub fn signature_is_valid(&self, signing_key: &[u8]) -> bool {
        let expected = sign(
            signing_key,
            self.id,
            self.sandbox_id,
            &self.capability,
            self.issued_at,
            self.expires_at,
        );
        expected.ct_eq(&self.signature).into()
    }

    /// Enforcement order: expiry -> usage cap -> capability match ->
    /// argument-bound validation -> rate-limit check. Each step returns
    /// early on the first failure. On success, increments the usage and
    /// rate-limit counters so the decision is final, not speculative.
    pub fn check_use(
        &self,
        now: DateTime<Utc>,
        required: &Capability,
        operation: &str,
        args: &serde_json::Value,
    ) -> UseVerdict {
        if now < self.issued_at || now > self.expires_at {
            return UseVerdict::Denied {
                reason: "token expired".into(),
            };
        }

        if let Some(max) = self.max_uses {
            if *self.uses.lock().expect("uses mutex poisoned") >= max {
                return UseVerdict::Denied {
                    reason: "usage cap exceeded".into(),
                };
            }
        }

        if !self.capability.satisfies(required) {
            return UseVerdict::Denied {
                reason: "capability mismatch".into(),
            };
        }

        for constraint in &self.constraints {
            match constraint {
                Constraint::ArgBound(bound) => {
                    if let Err(reason) = check_arg_bound(bound, args) {
                        return UseVerdict::Denied { reason };
                    }
                }
                Constraint::TimeWindow { not_before, not_after } => {
                    if now < *not_before || now > *not_after {
                        return UseVerdict::Denied {
                            reason: "outside permitted time window".into(),
                        };
                    }
                }
                Constraint::NetworkRestriction { allowed_hosts } => {
                    if let Capability::Network { .. } = required {
                        let host = args.as_array().and_then(|a| a.first()).and_then(|v| v.as_str()).unwrap_or("");
                        if !allowed_hosts.iter().any(|p| host_matches(p, host)) {
                            return UseVerdict::Denied {
                                reason: format!("network restriction denies host {host}"),
                            };
                        }
                    }
                }
                Constraint::ResourceLimit { .. } => {
                    // Enforced by the supervisor/WASM host against live
                    // usage samples, not at token-check time.
                }
                Constraint::RateLimit {
                    operation: limited_op,
                    max_requests,
                    window,
                } => {
                    if limited_op == operation {
                        let mut state = self.rate_state.lock().expect("rate mutex poisoned");
                        let entry = state.iter_mut().find(|w| &w.operation == limited_op);
                        let window_start = Instant::now() - *window;
                        let entry = match entry {
                            Some(e) => e,
                            None => {
                                state.push(RateWindow {
                                    operation: limited_op.clone(),
                                    seen: Vec::new(),
                                });
                                state.last_mut().expect("just pushed")
                            }
                        };
                        entry.seen.retain(|t| *t >= window_start);
                        if entry.seen.len() as u32 >= *max_requests {
                            return UseVerdict::Denied {
                                reason: "rate limit exceeded".into(),
                            };
                        }
                        entry.seen.push(Instant::now());
                    }
                }
            }
        }

        *self.uses.lock().expect("uses mutex poisoned") += 1;
        UseVerdict::Allowed
    }
}

fn check_arg_bound(bound: &ArgBound, args: &serde_json::Value) -> Result<(), String> {
    let value = args.as_array().and_then(|a| a.get(bound.position));
    let Some(value) = value else {
        return if bound.required {
            Err(format!("required argument at position {} missing", bound.position))
        } else {
            Ok(())
        };
    };

    if let Some(expected) = &bound.expected_type {
        let actual = json_type_name(value);
        if actual != expected {
            return Err(format!(
                "argument {} expected type {expected}, got {actual}",
                bound.position
            ));
        }
    }
    if let Some(s) = value.as_str() {
        if let Some(min) = bound.min_length {
            if s.len() < min {
                return Err(format!("argument {} shorter than {min}", bound.position));
            }
        }
        if let Some(max) = bound.max_length {
            if s.len() > max {
                return Err(format!("argument {} longer than {max}", bound.position));
            }
        }
        if let Some(pattern) = &bound.pattern {
            if !pattern.is_match(s) {
                return Err(format!("argument {} does not match pattern", bound.position));
            }
        }
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = bound.min_value {
            if n < min {
                return Err(format!("argument {} below minimum {min}", bound.position));
            }
        }
        if let Some(max) = bound.max_value {
            if n > max {
                return Err(format!("argument {} above maximum {max}", bound.position));
            }
        }
    }
    if let Some(allowed) = &bound.allowed_values {
        if !allowed.contains(value) {
            return Err(format!("argument {} is not an allowed value", bound.position));
        }
    }
    Ok(())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// A DAO policy for a subnet: narrows constraints and caps duration,
/// winning on any conflict with what the caller requested.
#[derive(Debug, Clone, Default)]
pub struct DaoPolicy {
    pub max_duration: Option<Duration>,
    pub forced_constraints: Vec<Constraint>,
    pub allowed_hosts: Option<Vec<String>>,
    /// Minimum WASM security-scan score this subnet requires, overriding
    /// the host's own [`crate::wasm::WasmLimits::scan_threshold`] when set.
    pub min_security_score: Option<u8>,
}

/// Resolve the scan-score floor a module must clear: the DAO policy's
/// floor wins when present (the more specific, operator-controlled
/// input), otherwise the host's own configured threshold applies.
#[must_use]
pub fn effective_scan_threshold(policy: &DaoPolicy, local_threshold: u8) -> u8 {
    policy.min_security_score.unwrap_or(local_threshold)
}

/// Intersect `requested` constraints and duration against `policy`,
/// policy winning on conflicts. Returns the narrowed constraint list and
/// duration.
#[must_use]
pub fn apply_dao_policy(
    policy: &DaoPolicy,
    mut requested: Vec<Constraint>,
    mut duration: Duration,
) -> (Vec<Constraint>, Duration) {
    if let Some(max) = policy.max_duration {
        duration = duration.min(max);
    }
    if let Some(hosts) = &policy.allowed_hosts {
        requested.retain(|c| !matches!(c, Constraint::NetworkRestriction { .. }));
        requested.push(Constraint::NetworkRestriction {
            allowed_hosts: hosts.clone(),
        });
    }
    requested.extend(policy.forced_constraints.iter().cloned());
    (requested, duration)
}

impl Clone for Constraint {
    fn clone(&self) -> Self {
        match self {
            Constraint::ArgBound(b) => Constraint::ArgBound(b.clone()),
            Constraint::RateLimit {
                operation,
                max_requests,
                window,
            } => Constraint::RateLimit {
                operation: operation.clone(),
                max_requests: *max_requests,
                window: *window,
            },
            Constraint::ResourceLimit { resource, max_value } => Constraint::ResourceLimit {
                resource: resource.clone(),
                max_value: *max_value,
            },
            Constraint::NetworkRestriction { allowed_hosts } => Constraint::NetworkRestriction {
                allowed_hosts: allowed_hosts.clone(),
            },
            Constraint::TimeWindow { not_before, not_after } => Constraint::TimeWindow {
                not_before: *not_before,
                not_after: *not_after,
            },
        }
    }
}

fn sign(
    signing_key: &[u8],
    id: TokenId,
    sandbox_id: SandboxId,
    capability: &Capability,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(signing_key).expect("HMAC accepts any key length");
    mac.update(id.to_string().as_bytes());
    mac.update(sandbox_id.to_string().as_bytes());
    mac.update(format!("{capability:?}").as_bytes());
    mac.update(issued_at.to_rfc3339().as_bytes());
    mac.update(expires_at.to_rfc3339().as_bytes());
    mac.finalize().into_bytes().to_vec()
}
