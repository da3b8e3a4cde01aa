//! Domain-level error types.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("username is empty")]
    EmptyUsername,

    #[error("group name is empty")]
    EmptyGroupName,

    #[error("password digest is empty")]
    EmptyPassword,

    #[error("message text is empty")]
    EmptyMessageText,

    #[error("message time is empty")]
    EmptyMessageTime,
}

/// Persistence Gateway errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No connection could be obtained in time; the operation should fail gracefully
    #[error("persistence temporarily unavailable: {0}")]
    Unavailable(String),

    /// Query or statement failure
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored row no longer satisfies domain validation
    #[error("corrupted record: {0}")]
    Corrupted(#[from] ValueObjectError),
}

/// Reasons a username or group cannot be bound to a session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// Another live session already holds the username
    #[error("user with such name already logged in")]
    UsernameTaken,

    /// The identity field was already set once
    #[error("session identity already bound")]
    AlreadyBound,

    /// A group requires a username first
    #[error("session is not logged in")]
    NotLoggedIn,

    /// The session disconnected in the meantime
    #[error("session is no longer active")]
    UnknownSession,
}
