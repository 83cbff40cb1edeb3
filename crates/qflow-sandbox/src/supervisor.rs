//! Sandbox Supervisor: per-step sandbox lifecycle, policy, and violation
//! tracking.
//!
//! Generalizes the workspace's `IsolationLevel`/`Capability` pair (a fixed
//! enum of trust tiers, each implying a capability set) into an explicit,
//! per-sandbox [`IsolationPolicy`] with independently-configurable network,
//! filesystem, and syscall rules, plus a running [`SandboxMetrics`] tally.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use qflow_core::SandboxId;

/// How strictly a sandbox isolates the code running inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IsolationLevel {
    /// Trusted, signed first-party code — no sandbox overhead.
    None,
    /// In-process execution with capability-token gating on every host call.
    CapabilityGated,
    /// Full isolation via the WASM host. Mandatory for untrusted modules.
    Isolated,
}

/// Network/filesystem/syscall policy a sandbox enforces.
#[derive(Debug, Clone)]
pub struct IsolationPolicy {
    pub network_allowed: bool,
    pub allowed_hosts: Vec<String>,
    pub filesystem_allowed: bool,
    /// The one filesystem path writes are permitted under, if any.
    pub scratch_dir: Option<String>,
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub allowed_syscalls: Vec<String>,
    pub process_creation_allowed: bool,
}

impl IsolationPolicy {
    /// Deny-everything-except-a-scratch-dir default, per the spec's
    /// "default strict policy".
    #[must_use]
    pub fn strict() -> Self {
        Self {
            network_allowed: false,
            allowed_hosts: Vec::new(),
            filesystem_allowed: true,
            scratch_dir: Some("/scratch".to_string()),
            max_file_bytes: 10 * 1024 * 1024,
            max_total_bytes: 100 * 1024 * 1024,
            allowed_syscalls: vec![
                "read".into(),
                "write".into(),
                "mmap".into(),
                "munmap".into(),
                "exit".into(),
                "clock_gettime".into(),
            ],
            process_creation_allowed: false,
        }
    }

    fn for_level(level: IsolationLevel) -> Self {
        match level {
            IsolationLevel::None => Self {
                network_allowed: true,
                allowed_hosts: vec!["*".into()],
                filesystem_allowed: true,
                scratch_dir: None,
                max_file_bytes: u64::MAX,
                max_total_bytes: u64::MAX,
                allowed_syscalls: Vec::new(),
                process_creation_allowed: true,
            },
            IsolationLevel::CapabilityGated | IsolationLevel::Isolated => Self::strict(),
        }
    }
}

/// How severe a violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// What the supervisor does in response to a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationAction {
    Log,
    Block,
    Terminate,
    Quarantine,
}

/// What kind of boundary was crossed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    Network,
    Filesystem,
    SystemCall,
    ProcessCreation,
    EscapeAttempt,
}

/// A single recorded policy violation.
#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: ViolationSeverity,
    pub description: String,
    pub details: serde_json::Value,
    pub action: ViolationAction,
    pub recorded_at: DateTime<Utc>,
}

/// Running counters for one sandbox's lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxMetrics {
    pub network_checks: u64,
    pub filesystem_checks: u64,
    pub syscall_checks: u64,
    pub violations_total: u64,
    pub bytes_written: u64,
}

struct SandboxState {
    policy: IsolationPolicy,
    level: IsolationLevel,
    violations: Vec<Violation>,
    metrics: SandboxMetrics,
    destroyed: bool,
}

/// Tracks every live sandbox and enforces its policy on each boundary
/// crossing.
#[derive(Default)]
pub struct SandboxSupervisor {
    sandboxes: Mutex<HashMap<SandboxId, SandboxState>>,
}

/// The outcome of destroying a sandbox, for the caller to decide whether
/// the owning step should be marked failed-infrastructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    Requested,
    CriticalViolation,
    EscapeAttempt,
}

impl SandboxSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sandbox with the policy implied by `level`.
    pub fn create_sandbox(&self, id: SandboxId, level: IsolationLevel) {
        let state = SandboxState {
            policy: IsolationPolicy::for_level(level),
            level,
            violations: Vec::new(),
            metrics: SandboxMetrics::default(),
            destroyed: false,
        };
        self.sandboxes
            .lock()
            .expect("supervisor mutex poisoned")
            .insert(id, state);
    }

    /// Create a sandbox with an explicit policy, overriding the level's
    /// default.
    pub fn create_sandbox_with_policy(&self, id: SandboxId, level: IsolationLevel, policy: IsolationPolicy) {
        let state = SandboxState {
            policy,
            level,
            violations: Vec::new(),
            metrics: SandboxMetrics::default(),
            destroyed: false,
        };
        self.sandboxes
            .lock()
            .expect("supervisor mutex poisoned")
            .insert(id, state);
    }

    /// Tear down a sandbox. Idempotent: destroying an already-destroyed or
    /// unknown sandbox is a no-op.
    pub fn destroy_sandbox(&self, id: SandboxId) {
        if let Some(state) = self.sandboxes.lock().expect("supervisor mutex poisoned").get_mut(&id) {
            state.destroyed = true;
        }
    }

    /// Check outbound network access, recording a violation on denial.
    pub fn check_network_access(&self, id: SandboxId, host: &str) -> bool {
        let mut sandboxes = self.sandboxes.lock().expect("supervisor mutex poisoned");
        let Some(state) = sandboxes.get_mut(&id) else {
            return false;
        };
        state.metrics.network_checks += 1;
        let allowed = state.policy.network_allowed
            && state.policy.allowed_hosts.iter().any(|p| host_matches(p, host));
        if !allowed {
            record_violation(
                state,
                ViolationKind::Network,
                ViolationSeverity::Medium,
                format!("denied outbound connection to {host}"),
                serde_json::json!({ "host": host }),
                ViolationAction::Block,
            );
        }
        allowed
    }

    /// Check filesystem access. Writes outside the scratch dir, or that
    /// would exceed the per-file/total caps, are denied.
    pub fn check_filesystem_access(&self, id: SandboxId, path: &str, write_bytes: Option<u64>) -> bool {
        let mut sandboxes = self.sandboxes.lock().expect("supervisor mutex poisoned");
        let Some(state) = sandboxes.get_mut(&id) else {
            return false;
        };
        state.metrics.filesystem_checks += 1;

        if !state.policy.filesystem_allowed {
            record_violation(
                state,
                ViolationKind::Filesystem,
                ViolationSeverity::Medium,
                format!("filesystem access denied: {path}"),
                serde_json::json!({ "path": path }),
                ViolationAction::Block,
            );
            return false;
        }

        let within_scratch = match &state.policy.scratch_dir {
            Some(dir) => path.starts_with(dir.as_str()),
            None => true,
        };
        if !within_scratch {
            record_violation(
                state,
                ViolationKind::Filesystem,
                ViolationSeverity::High,
                format!("path outside scratch directory: {path}"),
                serde_json::json!({ "path": path }),
                ViolationAction::Block,
            );
            return false;
        }

        if let Some(bytes) = write_bytes {
            if bytes > state.policy.max_file_bytes {
                record_violation(
                    state,
                    ViolationKind::Filesystem,
                    ViolationSeverity::Medium,
                    format!("write of {bytes} bytes exceeds per-file cap"),
                    serde_json::json!({ "path": path, "bytes": bytes }),
                    ViolationAction::Block,
                );
                return false;
            }
            if state.metrics.bytes_written + bytes > state.policy.max_total_bytes {
                record_violation(
                    state,
                    ViolationKind::Filesystem,
                    ViolationSeverity::Medium,
                    "write would exceed total scratch size cap".to_string(),
                    serde_json::json!({ "path": path, "bytes": bytes }),
                    ViolationAction::Block,
                );
                return false;
            }
            state.metrics.bytes_written += bytes;
        }

        true
    }

    /// Check whether a syscall is on the sandbox's allowlist.
    pub fn check_system_call(&self, id: SandboxId, syscall: &str) -> bool {
        let mut sandboxes = self.sandboxes.lock().expect("supervisor mutex poisoned");
        let Some(state) = sandboxes.get_mut(&id) else {
            return false;
        };
        state.metrics.syscall_checks += 1;
        let allowed = state.policy.allowed_syscalls.iter().any(|s| s == syscall);
        if !allowed {
            record_violation(
                state,
                ViolationKind::SystemCall,
                ViolationSeverity::High,
                format!("syscall not on allowlist: {syscall}"),
                serde_json::json!({ "syscall": syscall }),
                ViolationAction::Block,
            );
        }
        allowed
    }

    /// Inspect a raw signature (from a fault handler, scan, or syscall
    /// trace) for a confirmed escape attempt. Matches are always critical
    /// and destroy the sandbox immediately.
    pub fn detect_escape_attempt(&self, id: SandboxId, signature: &str) -> Option<DestroyReason> {
        const ESCAPE_SIGNATURES: &[&str] = &[
            "buffer overflow",
            "privilege escalation",
            "syscall injection",
            "memory corruption",
        ];
        let matched = ESCAPE_SIGNATURES.iter().any(|s| signature.contains(s));
        if !matched {
            return None;
        }

        let mut sandboxes = self.sandboxes.lock().expect("supervisor mutex poisoned");
        if let Some(state) = sandboxes.get_mut(&id) {
            record_violation(
                state,
                ViolationKind::EscapeAttempt,
                ViolationSeverity::Critical,
                format!("escape attempt detected: {signature}"),
                serde_json::json!({ "signature": signature }),
                ViolationAction::Terminate,
            );
            state.destroyed = true;
        }
        Some(DestroyReason::EscapeAttempt)
    }

    /// All violations recorded for a sandbox, oldest first.
    #[must_use]
    pub fn sandbox_violations(&self, id: SandboxId) -> Vec<Violation> {
        self.sandboxes
            .lock()
            .expect("supervisor mutex poisoned")
            .get(&id)
            .map(|s| s.violations.clone())
            .unwrap_or_default()
    }

    /// This sandbox's running metrics.
    #[must_use]
    pub fn sandbox_metrics(&self, id: SandboxId) -> Option<SandboxMetrics> {
        self.sandboxes
            .lock()
            .expect("supervisor mutex poisoned")
            .get(&id)
            .map(|s| s.metrics)
    }

    #[must_use]
    pub fn is_destroyed(&self, id: SandboxId) -> bool {
        self.sandboxes
            .lock()
            .expect("supervisor mutex poisoned")
            .get(&id)
            .map(|s| s.destroyed)
            .unwrap_or(true)
    }

    #[must_use]
    pub fn isolation_level(&self, id: SandboxId) -> Option<IsolationLevel> {
        self.sandboxes
            .lock()
            .expect("supervisor mutex poisoned")
            .get(&id)
            .map(|s| s.level)
    }
}

fn record_violation(
    state: &mut SandboxState,
    kind: ViolationKind,
    severity: ViolationSeverity,
    description: String,
    details: serde_json::Value,
    mut action: ViolationAction,
) {
    if severity == ViolationSeverity::Critical {
        action = ViolationAction::Terminate;
        state.destroyed = true;
    }
    state.metrics.violations_total += 1;
    state.violations.push(Violation {
        kind,
        severity,
        description,
        details,
        action,
        recorded_at: Utc::now(),
    });
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_default_denies_network() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::CapabilityGated);
        assert!(!sup.check_network_access(id, "evil.com"));
        assert_eq!(sup.sandbox_violations(id).len(), 1);
    }

    #[test]
    fn scratch_dir_writes_are_allowed_within_caps() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::CapabilityGated);
        assert!(sup.check_filesystem_access(id, "/scratch/out.txt", Some(1024)));
    }

    #[test]
    fn writes_outside_scratch_are_denied() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::CapabilityGated);
        assert!(!sup.check_filesystem_access(id, "/etc/passwd", None));
        assert_eq!(sup.sandbox_violations(id)[0].severity, ViolationSeverity::High);
    }

    #[test]
    fn syscall_allowlist_is_enforced() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::CapabilityGated);
        assert!(sup.check_system_call(id, "read"));
        assert!(!sup.check_system_call(id, "execve"));
    }

    #[test]
    fn escape_attempt_destroys_the_sandbox() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::CapabilityGated);
        let reason = sup.detect_escape_attempt(id, "buffer overflow in parser");
        assert_eq!(reason, Some(DestroyReason::EscapeAttempt));
        assert!(sup.is_destroyed(id));
    }

    #[test]
    fn unrelated_signature_is_not_an_escape_attempt() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::CapabilityGated);
        assert_eq!(sup.detect_escape_attempt(id, "harmless log line"), None);
        assert!(!sup.is_destroyed(id));
    }

    #[test]
    fn metrics_track_checks_performed() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::CapabilityGated);
        sup.check_network_access(id, "x.com");
        sup.check_system_call(id, "read");
        let metrics = sup.sandbox_metrics(id).unwrap();
        assert_eq!(metrics.network_checks, 1);
        assert_eq!(metrics.syscall_checks, 1);
    }

    #[test]
    fn trusted_level_allows_everything() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::None);
        assert!(sup.check_network_access(id, "anywhere.com"));
        assert!(sup.check_system_call(id, "execve"));
    }

    #[test]
    fn destroy_is_idempotent() {
        let sup = SandboxSupervisor::new();
        let id = SandboxId::v4();
        sup.create_sandbox(id, IsolationLevel::CapabilityGated);
        sup.destroy_sandbox(id);
        sup.destroy_sandbox(id);
        assert!(sup.is_destroyed(id));
    }
}
