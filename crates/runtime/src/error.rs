use thiserror::Error;
use xylem_schema::SchemaError;
use xylem_serializer::SerializeError;
use xylem_xdm::{ExpandedName, XdmError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dynamic error [{code}]: {message}")]
    Dynamic { code: String, message: String },

    #[error("Variable ${0} is not bound")]
    UndefinedVariable(ExpandedName),

    #[error("Circular reference [XTDE0640] involving: {}", .0.join(", "))]
    CircularReference(Vec<String>),

    #[error("Transformation cancelled")]
    Cancelled,

    #[error("Data model error: {0}")]
    Xdm(#[from] XdmError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("Validation error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Resource error: {0}")]
    Resource(#[from] crate::resource::ResourceError),
}

impl EngineError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn dynamic(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dynamic {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The stable error code carried by this failure, when it has one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Dynamic { code, .. } => Some(code),
            Self::CircularReference(_) => Some(codes::CIRCULAR_REFERENCE),
            Self::Schema(err) => err.code(),
            _ => None,
        }
    }
}

/// Stable error codes from the XSLT error registry.
pub mod codes {
    /// No initial template with the requested name.
    pub const MISSING_INITIAL_TEMPLATE: &str = "XTDE0040";
    /// xsl:message without terminate.
    pub const MESSAGE: &str = "XTMM9000";
    /// xsl:message with terminate="yes".
    pub const MESSAGE_TERMINATE: &str = "XTMM9001";
    /// on-no-match="fail" with no matching rule.
    pub const ON_NO_MATCH_FAIL: &str = "XTDE0555";
    /// Circular variable or key reference.
    pub const CIRCULAR_REFERENCE: &str = "XTDE0640";
    /// Required template parameter not supplied.
    pub const REQUIRED_PARAMETER: &str = "XTDE0700";
    /// Implicit write to a claimed principal output.
    pub const CLAIMED_OUTPUT: &str = "XTDE1490";
    /// Unknown accumulator name.
    pub const UNKNOWN_ACCUMULATOR: &str = "XTDE3340";
    /// Document not retrievable.
    pub const DOCUMENT_NOT_FOUND: &str = "FODC0002";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_error_carries_code() {
        let err = EngineError::dynamic(codes::CLAIMED_OUTPUT, "principal output already claimed");
        assert_eq!(err.code(), Some("XTDE1490"));
        assert!(err.to_string().contains("XTDE1490"));
    }

    #[test]
    fn test_circular_reference_names_participants() {
        let err = EngineError::CircularReference(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.code(), Some("XTDE0640"));
        let text = err.to_string();
        assert!(text.contains("a") && text.contains("b"));
    }
}
