//! The self-describing mapping encoding: plain JSON.

use crate::document::Flow;
use crate::error::FlowError;

/// Parse a flow document written as a JSON object matching [`Flow`]'s
/// `#[serde(tag = "type", rename_all = "snake_case")]` step shape.
pub fn parse(doc: &str) -> Result<Flow, FlowError> {
    serde_json::from_str(doc).map_err(|e| FlowError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_flow() {
        let doc = r#"
        {
            "id": "11111111-1111-1111-1111-111111111111",
            "name": "demo",
            "version": 1,
            "owner": "alice",
            "steps": [
                { "id": "22222222-2222-2222-2222-222222222222", "type": "task", "action": "noop" }
            ],
            "metadata": { "tags": [], "visibility": "private", "required_permissions": [] }
        }
        "#;
        let flow = parse(doc).unwrap();
        assert_eq!(flow.name, "demo");
        assert_eq!(flow.steps.len(), 1);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse("{ not json"), Err(FlowError::ParseError(_))));
    }
}
