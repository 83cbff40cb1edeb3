//! Bundled sandbox configuration, replacing the `any`-typed bag a caller
//! would otherwise pass across the isolation/capability/WASM-host seam.

use serde::{Deserialize, Serialize};

use crate::error::SandboxHostError;
use crate::supervisor::IsolationLevel;
use crate::wasm::WasmLimits;

/// Everything needed to stand up a sandbox for one step: how isolated it
/// runs, how big a module it may load, the security-scan floor it must
/// clear, and the resource ceilings enforced while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub isolation_level: IsolationLevel,
    pub max_module_bytes: usize,
    /// Default scan-score floor; a subnet's [`crate::capability::DaoPolicy`]
    /// may override this per [`crate::capability::effective_scan_threshold`].
    pub security_score_floor: u8,
    pub resource_limits: WasmLimits,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let limits = WasmLimits::default();
        Self {
            isolation_level: IsolationLevel::CapabilityGated,
            max_module_bytes: limits.max_module_bytes,
            security_score_floor: limits.scan_threshold,
            resource_limits: limits,
        }
    }
}

impl SandboxConfig {
    /// Validate internal consistency: the module-size cap and scan floor
    /// must agree with the resource limits carried alongside them.
    pub fn validate(&self) -> Result<(), SandboxHostError> {
        if self.max_module_bytes == 0 {
            return Err(SandboxHostError::InvalidConfig(
                "max_module_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_module_bytes != self.resource_limits.max_module_bytes {
            return Err(SandboxHostError::InvalidConfig(
                "max_module_bytes disagrees with resource_limits.max_module_bytes".to_string(),
            ));
        }
        if self.security_score_floor > 100 {
            return Err(SandboxHostError::InvalidConfig(
                "security_score_floor must be in 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}
