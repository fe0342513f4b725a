use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Illegal handler call sequence: {0}")]
    HandlerMisuse(String),

    #[error("Serialization error [{code}]: {message}")]
    Output { code: String, message: String },
}

impl SerializeError {
    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::HandlerMisuse(msg.into())
    }

    pub fn output(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Output {
            code: code.into(),
            message: message.into(),
        }
    }
}
