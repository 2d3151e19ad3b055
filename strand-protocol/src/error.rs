//! Protocol errors

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// A single frame that could not be turned into text
///
/// These never close the connection: the decoder skips past the bad frame
/// and the server answers it with a failure response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame exceeds the maximum length of {limit} bytes")]
    TooLong { limit: usize },

    #[error("Frame is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    #[error("Frame text contains a line break")]
    EmbeddedNewline,
}

impl FrameError {
    pub fn code(&self) -> &'static str {
        match self {
            FrameError::TooLong { .. } => "FRAME_TOO_LONG",
            FrameError::InvalidUtf8 { .. } => "INVALID_UTF8",
            FrameError::EmbeddedNewline => "EMBEDDED_NEWLINE",
        }
    }
}

/// Connection-level failures
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,
}
