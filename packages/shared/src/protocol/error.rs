//! Error types for the wire protocol.

use thiserror::Error;

/// Transport-level protocol errors.
///
/// Malformed JSON inside a well-formed frame is not an error: the codec logs and
/// discards it. Decoding errors and I/O errors end the connection; an outgoing
/// packet that cannot be encoded is dropped on its own.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Declared frame exceeds the decode limit, or an outgoing payload does not
    /// fit the length header
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// Outbound packet could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Whether the error comes from the socket rather than from one packet
    pub fn is_io(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}
