use thiserror::Error;

#[derive(Error, Debug)]
pub enum XdmError {
    #[error("Event buffer is frozen: {0}")]
    BufferFrozen(String),

    #[error("Malformed event sequence: {0}")]
    MalformedEvents(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),
}

impl XdmError {
    pub fn frozen(msg: impl Into<String>) -> Self {
        Self::BufferFrozen(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvents(msg.into())
    }
}
