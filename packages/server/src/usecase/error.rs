//! UseCase 層のエラー型
//!
//! ビジネスルール上の拒否（クライアントに `success:false` で返すもの）と、
//! それ以外（ログに残してパケットを破棄するもの）を区別する。

use thiserror::Error;

use crate::domain::{BindError, RepositoryError, ValueObjectError};

/// ユーザー登録のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("user with such name already exist")]
    UserAlreadyExists,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RegisterError {
    /// クライアントに返す拒否理由（返さない場合は `None`）
    pub fn rejection_reason(&self) -> Option<String> {
        match self {
            RegisterError::UserAlreadyExists => Some(self.to_string()),
            RegisterError::Repository(_) => None,
        }
    }
}

/// ログインのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("user with such name does not exist")]
    UserNotFound,

    #[error("invalid password")]
    InvalidPassword,

    #[error("user with such name already logged in")]
    AlreadyLoggedIn,

    #[error("cannot bind username: {0}")]
    Bind(BindError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<BindError> for LoginError {
    fn from(error: BindError) -> Self {
        match error {
            BindError::UsernameTaken => LoginError::AlreadyLoggedIn,
            other => LoginError::Bind(other),
        }
    }
}

impl LoginError {
    pub fn rejection_reason(&self) -> Option<String> {
        match self {
            LoginError::UserNotFound | LoginError::InvalidPassword | LoginError::AlreadyLoggedIn => {
                Some(self.to_string())
            }
            LoginError::Bind(_) | LoginError::Repository(_) => None,
        }
    }
}

/// グループ参加のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectGroupError {
    #[error("group with such name does not exist")]
    GroupNotFound,

    #[error("invalid password")]
    InvalidPassword,

    #[error("cannot bind group: {0}")]
    Bind(#[from] BindError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ConnectGroupError {
    pub fn rejection_reason(&self) -> Option<String> {
        match self {
            ConnectGroupError::GroupNotFound | ConnectGroupError::InvalidPassword => {
                Some(self.to_string())
            }
            ConnectGroupError::Bind(_) | ConnectGroupError::Repository(_) => None,
        }
    }
}

/// メッセージ送信のエラー（クライアントには返さない）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendMessageError {
    #[error("invalid message: {0}")]
    Invalid(#[from] ValueObjectError),

    #[error("message was not stored: {0}")]
    Repository(#[from] RepositoryError),
}
