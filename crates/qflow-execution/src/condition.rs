//! Evaluates a [`qflow_flow::StepKind::Condition`] expression against the
//! outputs recorded so far for the execution it belongs to.
//!
//! Supports exactly the shape the step kind's own doc comment gives as an
//! example: `${stepId.field} == literal` or `${stepId.field} != literal`,
//! where `field` defaults to `"result"` and `literal` is a bool, number,
//! string, or `null`. Wider expression languages are out of scope until a
//! flow actually needs one.

use qflow_core::StepId;

use crate::output::StepOutput;

/// Evaluate `expression`, resolving `${...}` references via `lookup`
/// (typically a closure over the execution's recorded step outputs).
pub fn evaluate(expression: &str, lookup: &dyn Fn(StepId) -> Option<StepOutput>) -> Result<bool, String> {
    let expression = expression.trim();

    for op in ["==", "!="] {
        if let Some((lhs, rhs)) = expression.split_once(op) {
            let lhs = resolve_operand(lhs.trim(), lookup)?;
            let rhs = resolve_operand(rhs.trim(), lookup)?;
            return Ok(if op == "==" { lhs == rhs } else { lhs != rhs });
        }
    }

    Err(format!("unsupported condition expression: {expression}"))
}

fn resolve_operand(token: &str, lookup: &dyn Fn(StepId) -> Option<StepOutput>) -> Result<serde_json::Value, String> {
    if let Some(reference) = token.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        resolve_reference(reference, lookup)
    } else {
        parse_literal(token)
    }
}

fn resolve_reference(reference: &str, lookup: &dyn Fn(StepId) -> Option<StepOutput>) -> Result<serde_json::Value, String> {
    let mut parts = reference.splitn(2, '.');
    let step_part = parts.next().unwrap_or("");
    let field = parts.next().unwrap_or("result");

    let step_id = StepId::parse(step_part).map_err(|e| format!("invalid step reference {step_part}: {e}"))?;
    let output = lookup(step_id).ok_or_else(|| format!("no output recorded for step {step_part}"))?;
    let value = output.as_value().cloned().unwrap_or(serde_json::Value::Null);

    if field == "result" {
        Ok(value)
    } else {
        Ok(value.get(field).cloned().unwrap_or(serde_json::Value::Null))
    }
}

fn parse_literal(token: &str) -> Result<serde_json::Value, String> {
    match token {
        "true" => Ok(serde_json::Value::Bool(true)),
        "false" => Ok(serde_json::Value::Bool(false)),
        "null" => Ok(serde_json::Value::Null),
        _ => {
            if let Ok(n) = token.parse::<f64>() {
                return serde_json::Number::from_f64(n)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| format!("invalid numeric literal: {token}"));
            }
            let unquoted = token.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(token);
            Ok(serde_json::Value::String(unquoted.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(pairs: Vec<(StepId, serde_json::Value)>) -> impl Fn(StepId) -> Option<StepOutput> {
        move |id| pairs.iter().find(|(s, _)| *s == id).map(|(_, v)| StepOutput::inline(v.clone(), 1))
    }

    #[test]
    fn equality_against_a_referenced_result_is_true() {
        let step = StepId::v4();
        let lookup = outputs(vec![(step, serde_json::json!(true))]);
        let expr = format!("${{{step}.result}} == true");
        assert_eq!(evaluate(&expr, &lookup), Ok(true));
    }

    #[test]
    fn inequality_against_a_mismatched_literal_is_true() {
        let step = StepId::v4();
        let lookup = outputs(vec![(step, serde_json::json!("ok"))]);
        let expr = format!("${{{step}.result}} != \"failed\"");
        assert_eq!(evaluate(&expr, &lookup), Ok(true));
    }

    #[test]
    fn missing_step_output_is_an_error() {
        let step = StepId::v4();
        let lookup = outputs(vec![]);
        let expr = format!("${{{step}.result}} == true");
        assert!(evaluate(&expr, &lookup).is_err());
    }

    #[test]
    fn nested_field_is_read_from_the_output_object() {
        let step = StepId::v4();
        let lookup = outputs(vec![(step, serde_json::json!({"status": "ready"}))]);
        let expr = format!("${{{step}.status}} == \"ready\"");
        assert_eq!(evaluate(&expr, &lookup), Ok(true));
    }
}
