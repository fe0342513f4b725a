use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Validation error [{code}]: {message}")]
    Validation { code: String, message: String },

    #[error("Invalid pattern facet: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Schema model error: {0}")]
    Model(String),
}

impl SchemaError {
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// The stable error code, when this is a validation failure.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Validation { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Strict element validation failures.
pub const ERR_ELEMENT: &str = "XTTE0505";
/// Strict attribute validation failures.
pub const ERR_ATTRIBUTE: &str = "XTTE0540";
/// Content-model violations.
pub const ERR_CONTENT: &str = "XTTE0590";
