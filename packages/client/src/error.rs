//! Error types for the terminal client.

use hiroba_shared::protocol::{PacketType, ProtocolError};
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server refused a request (bad credentials, duplicate login, unknown group)
    #[error("{step} rejected: {reason}")]
    Rejected { step: PacketType, reason: String },

    /// No reply within the handshake timeout
    #[error("no {0} reply from server")]
    Timeout(PacketType),

    /// The server closed the connection
    #[error("connection closed by server")]
    ConnectionClosed,

    /// Connection error
    #[error("connection error: {0}")]
    Connection(#[from] ProtocolError),
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Connection(ProtocolError::Io(e))
    }
}
