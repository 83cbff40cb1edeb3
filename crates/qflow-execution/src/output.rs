//! Materialized step output, ready for persistence or inter-step transport.
//!
//! By the time a value reaches [`StepOutput`], the engine has already
//! resolved it — a module returns plain JSON, not a deferred/streaming
//! handle. Small data is kept inline; large data is spilled to blob
//! storage per the data-passing policy and only a reference is kept here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a step's output data actually lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutputData {
    /// Small data, carried inline as JSON.
    Inline(serde_json::Value),
    /// Large data, spilled to blob storage and referenced by key.
    BlobRef {
        key: String,
        size: u64,
        mime: String,
    },
}

impl StepOutputData {
    #[must_use]
    pub fn inline(value: serde_json::Value) -> Self {
        Self::Inline(value)
    }

    #[must_use]
    pub fn blob(key: impl Into<String>, size: u64, mime: impl Into<String>) -> Self {
        Self::BlobRef {
            key: key.into(),
            size,
            mime: mime.into(),
        }
    }

    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }

    #[must_use]
    pub fn is_blob_ref(&self) -> bool {
        matches!(self, Self::BlobRef { .. })
    }

    #[must_use]
    pub fn as_inline(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Inline(v) => Some(v),
            Self::BlobRef { .. } => None,
        }
    }
}

/// A step's output data plus the execution metadata an advancement
/// decision needs (when it was produced, how large it was).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    pub data: StepOutputData,
    pub produced_at: DateTime<Utc>,
    pub bytes: u64,
}

impl StepOutput {
    #[must_use]
    pub fn inline(value: serde_json::Value, bytes: u64) -> Self {
        Self {
            data: StepOutputData::inline(value),
            produced_at: Utc::now(),
            bytes,
        }
    }

    #[must_use]
    pub fn blob_ref(key: impl Into<String>, size: u64, mime: impl Into<String>) -> Self {
        Self {
            data: StepOutputData::blob(key, size, mime),
            produced_at: Utc::now(),
            bytes: size,
        }
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        self.data.as_inline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_output_carries_its_value() {
        let output = StepOutput::inline(serde_json::json!({"ok": true}), 16);
        assert_eq!(output.as_value(), Some(&serde_json::json!({"ok": true})));
        assert!(output.data.is_inline());
    }

    #[test]
    fn blob_ref_output_has_no_inline_value() {
        let output = StepOutput::blob_ref("exec/step/out.bin", 2_000_000, "application/octet-stream");
        assert!(output.data.is_blob_ref());
        assert!(output.as_value().is_none());
        assert_eq!(output.bytes, 2_000_000);
    }
}
