//! Sandbox supervision, capability tokens, and the WASM host.
//!
//! - [`capability`] — [`capability::CapabilityToken`], the deny-by-default
//!   grant a sandbox presents on every host call, with an explicit
//!   [`capability::Constraint`] list checked in a fixed enforcement order.
//! - [`supervisor`] — [`supervisor::SandboxSupervisor`], per-sandbox
//!   policy (network/filesystem/syscall) and violation tracking.
//! - [`wasm`] — [`wasm::WasmHost`], a `wasmtime`-backed runner for
//!   untrusted modules: size cap, import allowlist, security scan,
//!   fuel/memory limits, cooperative-then-hard cancellation.
//! - [`inprocess`] — [`inprocess::InProcessSandboxRunner`], the
//!   capability-gated, non-WASM `qflow_ports::SandboxRunner` driver.
//! - [`error`] — conversions into [`qflow_error::QflowError`] and
//!   [`qflow_ports::PortsError`].
//!
//! Both [`inprocess::InProcessSandboxRunner`] and a WASM-backed driver
//! built on [`wasm::WasmHost`] implement `qflow_ports::SandboxRunner`, so
//! the engine is agnostic to which is active for a given step's
//! isolation level.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod config;
pub mod error;
pub mod inprocess;
pub mod supervisor;
pub mod wasm;

pub use capability::{
    effective_scan_threshold, ArgBound, Capability, CapabilityToken, Constraint, DaoPolicy, UseVerdict,
};
pub use config::SandboxConfig;
pub use error::SandboxHostError;
pub use inprocess::InProcessSandboxRunner;
pub use supervisor::{
    IsolationLevel, IsolationPolicy, SandboxMetrics, SandboxSupervisor, Violation, ViolationAction,
    ViolationKind, ViolationSeverity,
};
pub use wasm::{CancelOutcome, ModuleManifest, ScanResult, WasmHost, WasmLimits};
