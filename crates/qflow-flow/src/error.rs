//! Flow parsing and structural-validation errors.

use qflow_core::StepId;
use qflow_error::{InputError, QflowError};
use thiserror::Error;

/// One error found while parsing or structurally validating a flow
/// document. Carries the same taxonomy callers see in [`QflowError`], plus
/// the step id it concerns when one is known.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// The document didn't parse under either supported encoding.
    #[error("parse error: {0}")]
    ParseError(String),
    /// A required field was absent.
    #[error("required field missing: {0}")]
    RequiredFieldMissing(String),
    /// A field held a value of the wrong type.
    #[error("invalid type for {field}: expected {expected}, got {actual}")]
    InvalidType {
        /// The offending field's path/name.
        field: String,
        /// The type the schema requires.
        expected: String,
        /// The type actually present.
        actual: String,
    },
    /// A step's edge or dataflow expression names a step id that isn't
    /// declared in this flow.
    #[error("step {from} references unknown step {target}")]
    InvalidStepReference {
        /// The step holding the dangling reference.
        from: StepId,
        /// The undeclared step id it points at.
        target: StepId,
    },
    /// The step graph contains a cycle over success/failure/dataflow edges.
    #[error("circular dependency: {0}")]
    CircularDependency(String),
    /// Two steps in the document share an id.
    #[error("duplicate step id: {0}")]
    DuplicateStepIds(StepId),
    /// The document has no entry step (every step has an inbound edge).
    #[error("flow has no entry step")]
    NoEntryStep,
}

impl From<FlowError> for QflowError {
    fn from(err: FlowError) -> Self {
        let kind = match &err {
            FlowError::ParseError(message) => InputError::ParseError {
                message: message.clone(),
            },
            FlowError::RequiredFieldMissing(field) => InputError::RequiredFieldMissing {
                field: field.clone(),
            },
            FlowError::InvalidType {
                field,
                expected,
                actual,
            } => InputError::InvalidType {
                field: field.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            FlowError::InvalidStepReference { target, .. } => InputError::InvalidStepReference {
                step_id: target.to_string(),
            },
            FlowError::CircularDependency(path) => InputError::CircularDependency {
                path: path.clone(),
            },
            FlowError::DuplicateStepIds(id) => InputError::DuplicateStepIds {
                step_id: id.to_string(),
            },
            FlowError::NoEntryStep => InputError::ParseError {
                message: "flow has no entry step".to_string(),
            },
        };
        QflowError::new(qflow_error::ErrorKind::from(kind)).with_details(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_dependency_maps_to_matching_qflow_error_code() {
        let err: QflowError = FlowError::CircularDependency("a -> b -> a".into()).into();
        assert_eq!(err.code(), "CIRCULAR_DEPENDENCY");
    }

    #[test]
    fn invalid_step_reference_carries_the_target_id() {
        let from = StepId::v4();
        let target = StepId::v4();
        let err: QflowError = FlowError::InvalidStepReference { from, target }.into();
        assert_eq!(err.code(), "INVALID_STEP_REFERENCE");
        assert!(err.details.unwrap().contains(&from.to_string()));
    }
}
