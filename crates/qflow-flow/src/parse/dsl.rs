//! The structured-text encoding: a small line-oriented DSL.
//!
//! ```text
//! flow 11111111-1111-1111-1111-111111111111 demo 1 alice
//! step 22222222-2222-2222-2222-222222222222 task -> 33333333-3333-3333-3333-333333333333
//!   param action=crypto.sign
//! step 33333333-3333-3333-3333-333333333333 task
//!   param action=crypto.verify
//! ```
//!
//! One `flow` header line, then one `step` line per step optionally
//! followed by indented `param key=value` continuation lines attached to
//! the preceding step.

use std::sync::LazyLock;

use qflow_core::{FlowId, StepId};
use regex::Regex;

use crate::document::{Flow, FlowMetadata, ResourceLimits, RetryPolicy, Step, StepKind};
use crate::error::FlowError;

static FLOW_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^flow\s+(\S+)\s+(\S+)\s+(\d+)\s+(\S+)\s*$").unwrap());
static STEP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^step\s+(\S+)\s+(\w+)(?:\s*->\s*(\S+))?(?:\s*,\s*!\s*(\S+))?\s*$").unwrap()
});
static PARAM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+param\s+(\S+)=(.*)$").unwrap());

/// Parse a flow document written in the structured-text DSL.
pub fn parse(doc: &str) -> Result<Flow, FlowError> {
    let mut lines = doc.lines().filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));

    let header = lines
        .next()
        .ok_or_else(|| FlowError::ParseError("empty document".to_string()))?;
    let captures = FLOW_HEADER
        .captures(header)
        .ok_or_else(|| FlowError::ParseError(format!("malformed flow header: {header:?}")))?;

    let id = parse_flow_id(&captures[1])?;
    let name = captures[2].to_string();
    let version: u32 = captures[3]
        .parse()
        .map_err(|_| FlowError::ParseError(format!("invalid version: {}", &captures[3])))?;
    let owner = captures[4].to_string();

    let mut steps: Vec<RawStep> = Vec::new();

    for line in lines {
        if let Some(cap) = STEP_LINE.captures(line) {
            let step_id = parse_step_id(&cap[1])?;
            let type_name = cap[2].to_string();
            let on_success = cap.get(3).map(|m| parse_step_id(m.as_str())).transpose()?;
            let on_failure = cap.get(4).map(|m| parse_step_id(m.as_str())).transpose()?;
            steps.push(RawStep {
                id: step_id,
                type_name,
                on_success,
                on_failure,
                params: Vec::new(),
            });
        } else if let Some(cap) = PARAM_LINE.captures(line) {
            let step = steps
                .last_mut()
                .ok_or_else(|| FlowError::ParseError("param line before any step".to_string()))?;
            step.params.push((cap[1].to_string(), cap[2].to_string()));
        } else {
            return Err(FlowError::ParseError(format!("unrecognized line: {line:?}")));
        }
    }

    let steps = steps
        .into_iter()
        .map(RawStep::into_step)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Flow {
        id,
        name,
        version,
        owner,
        steps,
        metadata: FlowMetadata::default(),
    })
}

struct RawStep {
    id: StepId,
    type_name: String,
    on_success: Option<StepId>,
    on_failure: Option<StepId>,
    params: Vec<(String, String)>,
}

impl RawStep {
    fn into_step(self) -> Result<Step, FlowError> {
        let param = |key: &str| -> Option<String> {
            self.params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let required = |key: &str| -> Result<String, FlowError> {
            param(key).ok_or_else(|| FlowError::RequiredFieldMissing(key.to_string()))
        };

        let kind = match self.type_name.as_str() {
            "task" => StepKind::Task {
                action: required("action")?,
            },
            "event_trigger" => StepKind::EventTrigger {
                event_type: required("event_type")?,
            },
            "condition" => StepKind::Condition {
                expression: required("expression")?,
            },
            "parallel" => {
                let raw = required("branches")?;
                let branches = raw
                    .split(',')
                    .map(|s| parse_step_id(s.trim()))
                    .collect::<Result<Vec<_>, _>>()?;
                StepKind::Parallel { branches }
            }
            "module_call" => StepKind::ModuleCall {
                module: required("module")?,
                function: required("function")?,
            },
            other => {
                return Err(FlowError::InvalidType {
                    field: "type".to_string(),
                    expected: "task|event_trigger|condition|parallel|module_call".to_string(),
                    actual: other.to_string(),
                });
            }
        };

        let reserved = [
            "action",
            "event_type",
            "expression",
            "branches",
            "module",
            "function",
            "resource_tag",
            "state_key",
        ];
        let mut params = serde_json::Map::new();
        for (key, value) in &self.params {
            if !reserved.contains(&key.as_str()) {
                params.insert(key.clone(), serde_json::Value::String(value.clone()));
            }
        }

        Ok(Step {
            id: self.id,
            kind,
            params: serde_json::Value::Object(params),
            timeout: crate::document::default_timeout(),
            retry_policy: RetryPolicy::default(),
            resource_limits: ResourceLimits::default(),
            on_success: self.on_success,
            on_failure: self.on_failure,
            resource_tag: param("resource_tag"),
            state_key: param("state_key"),
        })
    }
}

fn parse_flow_id(raw: &str) -> Result<FlowId, FlowError> {
    FlowId::parse(raw).map_err(|e| FlowError::ParseError(format!("invalid flow id {raw:?}: {e}")))
}

fn parse_step_id(raw: &str) -> Result<StepId, FlowError> {
    StepId::parse(raw).map_err(|e| FlowError::ParseError(format!("invalid step id {raw:?}: {e}")))
}
