//! UseCase: ログイン処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - LoginUserUseCase::execute() メソッド
//! - 検証順序：ユーザー存在 → パスワード → 多重ログイン
//!
//! ### どのような状況を想定しているか
//! - 正常系：正しいクレデンシャルでログインし、ユーザー名がセッションに束縛される
//! - 異常系：未登録ユーザー、パスワード不一致、同名ユーザーが接続中
//! - 異常系：永続化層が一時的に利用できない（状態は変わらない）

use std::sync::Arc;

use crate::domain::{ChatRepository, PasswordDigest, Presence, SessionId, Username};

use super::error::LoginError;

/// ログインのユースケース
pub struct LoginUserUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn ChatRepository>,
    /// Presence（接続中セッションの識別情報）
    presence: Arc<dyn Presence>,
}

impl LoginUserUseCase {
    /// 新しい LoginUserUseCase を作成
    pub fn new(repository: Arc<dyn ChatRepository>, presence: Arc<dyn Presence>) -> Self {
        Self {
            repository,
            presence,
        }
    }

    /// ログインを実行
    ///
    /// 成功時、`username` は `session` に束縛される（以後変更されない）。
    /// ロスター・履歴の送信はグループ参加時に行うため、ここでは何も配送しない。
    pub async fn execute(
        &self,
        session: SessionId,
        username: &Username,
        password: &PasswordDigest,
    ) -> Result<(), LoginError> {
        let stored = self
            .repository
            .fetch_user_password(username)
            .await?
            .ok_or(LoginError::UserNotFound)?;

        if !password.matches(&stored) {
            return Err(LoginError::InvalidPassword);
        }

        self.presence.claim_username(session, username)?;
        tracing::info!("Session {} logged in as '{}'", session, username);
        Ok(())
    }
}
