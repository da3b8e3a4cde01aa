//! Repository trait 定義（Persistence Gateway）
//!
//! ドメイン層が必要とする永続化層へのインターフェースを定義します。
//! 具体的な実装（SQLite、インメモリ）は Infrastructure 層が提供します（依存性の逆転）。
//!
//! 実装はプールの待機などでブロックし得るため、呼び出し側のワーカースレッドを
//! 止めないように非同期インターフェースとしています。

use async_trait::async_trait;

use super::{ChatMessage, GroupName, PasswordDigest, RepositoryError, Username};

/// Chat Repository trait
///
/// UseCase 層はこの trait に依存し、Infrastructure 層の具体的な実装には依存しない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// ユーザーが登録済みか
    async fn user_exists(&self, username: &Username) -> Result<bool, RepositoryError>;

    /// ユーザーを登録
    async fn add_user(
        &self,
        username: &Username,
        password: &PasswordDigest,
    ) -> Result<(), RepositoryError>;

    /// 登録済みパスワード（ダイジェスト）を取得。ユーザーが存在しなければ `None`
    async fn fetch_user_password(
        &self,
        username: &Username,
    ) -> Result<Option<PasswordDigest>, RepositoryError>;

    /// グループが存在するか
    async fn group_exists(&self, group: &GroupName) -> Result<bool, RepositoryError>;

    /// グループを作成（管理コマンド用）
    async fn add_group(
        &self,
        group: &GroupName,
        password: &PasswordDigest,
    ) -> Result<(), RepositoryError>;

    /// グループのパスワード（ダイジェスト）を取得。グループが存在しなければ `None`
    async fn fetch_group_password(
        &self,
        group: &GroupName,
    ) -> Result<Option<PasswordDigest>, RepositoryError>;

    /// メッセージを追記
    async fn add_message(&self, message: &ChatMessage) -> Result<(), RepositoryError>;

    /// グループのメッセージ履歴を追記順で取得
    async fn fetch_messages(&self, group: &GroupName) -> Result<Vec<ChatMessage>, RepositoryError>;
}
