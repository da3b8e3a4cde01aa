//! UseCase: ユーザー登録処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RegisterUserUseCase::execute() メソッド
//!
//! ### どのような状況を想定しているか
//! - 正常系：未登録のユーザー名で登録
//! - 異常系：登録済みのユーザー名（`user with such name already exist`）
//! - 異常系：永続化層が一時的に利用できない

use std::sync::Arc;

use crate::domain::{ChatRepository, PasswordDigest, RepositoryError, Username};

use super::error::RegisterError;

/// ユーザー登録のユースケース
///
/// 登録はクレデンシャルを作るだけで、セッションの状態は変えない。
pub struct RegisterUserUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn ChatRepository>,
}

impl RegisterUserUseCase {
    /// 新しい RegisterUserUseCase を作成
    pub fn new(repository: Arc<dyn ChatRepository>) -> Self {
        Self { repository }
    }

    /// ユーザー登録を実行
    ///
    /// # Arguments
    ///
    /// * `username` - 正規化済みのユーザー名
    /// * `password` - クライアントでハッシュ化済みのパスワード
    pub async fn execute(
        &self,
        username: &Username,
        password: &PasswordDigest,
    ) -> Result<(), RegisterError> {
        if self.repository.user_exists(username).await? {
            return Err(RegisterError::UserAlreadyExists);
        }

        match self.repository.add_user(username, password).await {
            Ok(()) => {
                tracing::info!("Registered user '{}'", username);
                Ok(())
            }
            // 存在確認と追加の間に同名で登録された場合
            Err(RepositoryError::Storage(e)) => {
                if self.repository.user_exists(username).await? {
                    tracing::debug!("Concurrent registration of '{}': {}", username, e);
                    return Err(RegisterError::UserAlreadyExists);
                }
                Err(RepositoryError::Storage(e).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::MockChatRepository, infrastructure::repository::InMemoryChatRepository};

    fn credentials(name: &str, digest: &str) -> (Username, PasswordDigest) {
        (
            Username::new(name).unwrap(),
            PasswordDigest::new(digest).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_register_new_user() {
        // テスト項目: 未登録のユーザー名で登録できる
        // given (前提条件):
        let repository = Arc::new(InMemoryChatRepository::new());
        let usecase = RegisterUserUseCase::new(repository.clone());
        let (alice, h1) = credentials("alice", "H1");

        // when (操作):
        let result = usecase.execute(&alice, &h1).await;

        // then (期待する結果):
        assert_eq!(result, Ok(()));
        assert_eq!(repository.fetch_user_password(&alice).await.unwrap(), Some(h1));
    }

    #[tokio::test]
    async fn test_register_existing_user_is_rejected() {
        // テスト項目: 登録済みのユーザー名は拒否され、パスワードは上書きされない
        // given (前提条件):
        let repository = Arc::new(InMemoryChatRepository::new());
        let usecase = RegisterUserUseCase::new(repository.clone());
        let (alice, h1) = credentials("alice", "H1");
        usecase.execute(&alice, &h1).await.unwrap();

        // when (操作):
        let (_, h2) = credentials("alice", "H2");
        let result = usecase.execute(&alice, &h2).await;

        // then (期待する結果):
        assert_eq!(result, Err(RegisterError::UserAlreadyExists));
        assert_eq!(repository.fetch_user_password(&alice).await.unwrap(), Some(h1));
    }

    #[tokio::test]
    async fn test_register_lost_race_reports_existing_user() {
        // テスト項目: 存在確認後に他の登録が割り込んだ場合も「既に存在」と報告する
        // given (前提条件):
        let mut repository = MockChatRepository::new();
        let mut seq = mockall::Sequence::new();
        repository
            .expect_user_exists()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));
        repository
            .expect_add_user()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(RepositoryError::Storage("UNIQUE constraint failed".into())));
        repository
            .expect_user_exists()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        let usecase = RegisterUserUseCase::new(Arc::new(repository));
        let (alice, h1) = credentials("alice", "H1");

        // when (操作):
        let result = usecase.execute(&alice, &h1).await;

        // then (期待する結果):
        assert_eq!(result, Err(RegisterError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn test_register_when_storage_unavailable() {
        // テスト項目: 永続化層が利用できない場合は Repository エラー（拒否理由なし）
        // given (前提条件):
        let mut repository = MockChatRepository::new();
        repository
            .expect_user_exists()
            .returning(|_| Err(RepositoryError::Unavailable("pool timeout".into())));
        repository.expect_add_user().never();
        let usecase = RegisterUserUseCase::new(Arc::new(repository));
        let (alice, h1) = credentials("alice", "H1");

        // when (操作):
        let result = usecase.execute(&alice, &h1).await;

        // then (期待する結果):
        let error = result.unwrap_err();
        assert!(matches!(error, RegisterError::Repository(RepositoryError::Unavailable(_))));
        assert_eq!(error.rejection_reason(), None);
    }
}
