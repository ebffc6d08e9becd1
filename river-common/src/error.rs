//! Error types for River

use thiserror::Error;

/// Application-level error payload, carried inside `FramePayload::App` envelopes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AppError {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn uncaught(message: impl std::fmt::Display) -> Self {
        Self::new("UNCAUGHT_EXCEPTION", message.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Main error type for River transport/session operations
#[derive(Error, Debug)]
pub enum RiverError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec/serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Local-side closure of a stream before a response arrived
    #[error("stream closed: {0}")]
    StreamClosed(String),

    /// Session grace window elapsed without reconnect
    #[error("unexpected disconnect")]
    UnexpectedDisconnect,

    /// Gap in sequence numbers, malformed frame, or failed handshake
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Application-level error surfaced from a handler
    #[error("application error: {0}")]
    App(#[from] AppError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Stream not found
    #[error("stream {0} not found")]
    StreamNotFound(u32),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RiverError>;

impl From<bincode_next::error::EncodeError> for RiverError {
    fn from(err: bincode_next::error::EncodeError) -> Self {
        RiverError::Serialization(err.to_string())
    }
}

impl From<bincode_next::error::DecodeError> for RiverError {
    fn from(err: bincode_next::error::DecodeError) -> Self {
        RiverError::Serialization(err.to_string())
    }
}
