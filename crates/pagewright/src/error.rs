//! Engine error types.

use thiserror::Error;

/// Errors raised while planning or executing a page query.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unknown attribute '{attribute}' on entity '{entity}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid criterion for '{field}': {reason}")]
    InvalidCriterion { field: String, reason: String },

    #[error(
        "criterion for {field}({declared_type}) = {value}({value_type}) is not supported; \
         wrap it in a structured criterion instead"
    )]
    UnsupportedCriterion {
        field: String,
        declared_type: String,
        value: String,
        value_type: &'static str,
    },

    #[error("invalid page request: {0}")]
    InvalidRequest(String),

    #[error("a projection mapping is required when the result type differs from the entity type")]
    IllegalProjection,

    #[error("query execution failed")]
    Execution(#[source] anyhow::Error),

    #[error("failed to decode row")]
    Decode(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn invalid_criterion(field: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidCriterion {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error only invalidates a single criterion.
    ///
    /// Soft errors drop the offending criterion from the restriction; every
    /// other error aborts the page request.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidCriterion { .. } | EngineError::UnsupportedCriterion { .. }
        )
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_errors_are_soft() {
        assert!(EngineError::invalid_criterion("age", "not a number").is_soft());
        assert!(
            EngineError::UnsupportedCriterion {
                field: "active".to_string(),
                declared_type: "boolean".to_string(),
                value: "1.5".to_string(),
                value_type: "float",
            }
            .is_soft()
        );
    }

    #[test]
    fn structural_errors_are_fatal() {
        assert!(!EngineError::invalid_path("team.name.x", "not a relation").is_soft());
        assert!(!EngineError::IllegalProjection.is_soft());
        assert!(
            !EngineError::UnknownAttribute {
                entity: "person".to_string(),
                attribute: "nope".to_string(),
            }
            .is_soft()
        );
    }

    #[test]
    fn unsupported_message_names_field_and_types() {
        let err = EngineError::UnsupportedCriterion {
            field: "active".to_string(),
            declared_type: "boolean".to_string(),
            value: "1.5".to_string(),
            value_type: "float",
        };
        let msg = err.to_string();
        assert!(msg.contains("active(boolean)"), "{msg}");
        assert!(msg.contains("1.5(float)"), "{msg}");
    }
}
