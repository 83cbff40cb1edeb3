//! Top-level parse entry point: format auto-detection plus normalization.

pub mod dsl;
pub mod json;

use crate::document::Flow;
use crate::error::FlowError;
use crate::graph::DependencyGraph;

/// Which encoding a flow document is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The self-describing JSON mapping.
    Mapping,
    /// The line-oriented structured-text DSL.
    StructuredText,
}

/// Sniff the encoding from the document's first non-whitespace byte:
/// `{` means the JSON mapping, anything else the structured-text DSL.
#[must_use]
pub fn detect_format(doc: &str) -> Format {
    match doc.trim_start().as_bytes().first() {
        Some(b'{') => Format::Mapping,
        _ => Format::StructuredText,
    }
}

/// The result of [`parse`]: a normalized flow (if parsing and structural
/// validation both succeeded) plus any errors found.
#[derive(Debug)]
pub struct ParseOutcome {
    /// The normalized flow, present only when `errors` is empty.
    pub flow: Option<Flow>,
    /// Every structural problem found, parse-level or post-parse.
    pub errors: Vec<FlowError>,
}

/// Parse a flow document, normalizing defaults (timeout, retry policy,
/// params) and structurally validating the result.
///
/// `format_hint` overrides auto-detection when the caller already knows
/// the encoding.
pub fn parse(doc: &str, format_hint: Option<Format>) -> ParseOutcome {
    let format = format_hint.unwrap_or_else(|| detect_format(doc));

    let parsed = match format {
        Format::Mapping => json::parse(doc),
        Format::StructuredText => dsl::parse(doc),
    };

    let flow = match parsed {
        Ok(flow) => flow,
        Err(err) => {
            return ParseOutcome {
                flow: None,
                errors: vec![err],
            };
        }
    };

    let errors = validate_structure(&flow);
    if errors.is_empty() {
        ParseOutcome {
            flow: Some(flow),
            errors,
        }
    } else {
        ParseOutcome { flow: None, errors }
    }
}

/// Structurally validate an already-parsed flow, without normalization:
/// unique step ids, resolvable references, at least one entry step, no
/// cycles over success/failure/dataflow edges.
#[must_use]
pub fn validate_structure(flow: &Flow) -> Vec<FlowError> {
    let graph = match DependencyGraph::from_flow(flow) {
        Ok(graph) => graph,
        Err(err) => return vec![err],
    };

    let mut errors = Vec::new();

    if graph.entry_nodes().is_empty() {
        errors.push(FlowError::NoEntryStep);
    }

    if let Some(cycle) = graph.detect_cycle() {
        let path = cycle
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        errors.push(FlowError::CircularDependency(path));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mapping_from_leading_brace() {
        assert_eq!(detect_format("  { \"id\": 1 }"), Format::Mapping);
    }

    #[test]
    fn detects_structured_text_otherwise() {
        assert_eq!(detect_format("flow x demo 1 alice"), Format::StructuredText);
    }

    #[test]
    fn parse_surfaces_json_errors_without_a_flow() {
        let outcome = parse("{ not json", None);
        assert!(outcome.flow.is_none());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn parse_succeeds_for_a_well_formed_dsl_document() {
        let doc = "flow 11111111-1111-1111-1111-111111111111 demo 1 alice\nstep 22222222-2222-2222-2222-222222222222 task\n  param action=noop\n";
        let outcome = parse(doc, Some(Format::StructuredText));
        assert!(outcome.errors.is_empty());
        assert!(outcome.flow.is_some());
    }

    #[test]
    fn parse_rejects_a_cycle_as_a_structural_error() {
        let doc = "flow 11111111-1111-1111-1111-111111111111 demo 1 alice\nstep 22222222-2222-2222-2222-222222222222 task -> 33333333-3333-3333-3333-333333333333\n  param action=a\nstep 33333333-3333-3333-3333-333333333333 task -> 22222222-2222-2222-2222-222222222222\n  param action=b\n";
        let outcome = parse(doc, Some(Format::StructuredText));
        assert!(outcome.flow.is_none());
        assert!(
            outcome
                .errors
                .iter()
                .any(|e| matches!(e, FlowError::CircularDependency(_)))
        );
    }
}
