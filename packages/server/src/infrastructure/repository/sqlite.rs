//! SQLite Chat Repository 実装
//!
//! 接続はすべて [`ConnectionPool`] から借りる。プールの待機はスレッドをブロックするため、
//! 各呼び出しは `spawn_blocking` 上で「借用 → 1 文実行 → 返却」を行い、
//! ワーカースレッドのイベントループを止めない。

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    domain::{
        ChatMessage, ChatRepository, GroupName, MessageText, MessageTime, PasswordDigest,
        RepositoryError, Username,
    },
    infrastructure::pool::{ConnectionManager, ConnectionPool, PoolError},
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chat_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_name TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    message TEXT NOT NULL,
    time TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_group ON messages (group_name, id);
"#;

/// Opens SQLite connections to one database file
pub struct SqliteConnectionManager {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnectionManager {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionManager for SqliteConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn is_valid(&self, connection: &mut Connection) -> bool {
        connection
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

pub type SqlitePool = ConnectionPool<SqliteConnectionManager>;

fn unavailable(error: PoolError) -> RepositoryError {
    RepositoryError::Unavailable(error.to_string())
}

fn storage(error: rusqlite::Error) -> RepositoryError {
    RepositoryError::Storage(error.to_string())
}

/// SQLite Chat Repository 実装
pub struct SqliteChatRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteChatRepository {
    /// スキーマを作成（存在しなければ）してリポジトリを返す
    pub fn open(pool: Arc<SqlitePool>) -> Result<Self, RepositoryError> {
        {
            let conn = pool.acquire().map_err(unavailable)?;
            conn.execute_batch(SCHEMA).map_err(storage)?;
        }
        tracing::info!("SQLite schema ready at {}", pool.manager().path().display());
        Ok(Self { pool })
    }

    /// プールから接続を借りて `f` を実行する（ブロッキングスレッド上）
    async fn with_connection<F, R>(&self, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let conn = pool.acquire().map_err(unavailable)?;
            f(&*conn).map_err(storage)
        })
        .await
        .map_err(|e| RepositoryError::Storage(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl ChatRepository for SqliteChatRepository {
    async fn user_exists(&self, username: &Username) -> Result<bool, RepositoryError> {
        let name = username.as_str().to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE name = ?1)",
                params![name],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn add_user(
        &self,
        username: &Username,
        password: &PasswordDigest,
    ) -> Result<(), RepositoryError> {
        let name = username.as_str().to_string();
        let password = password.as_str().to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO users (name, password) VALUES (?1, ?2)",
                params![name, password],
            )
            .map(|_| ())
        })
        .await
    }

    async fn fetch_user_password(
        &self,
        username: &Username,
    ) -> Result<Option<PasswordDigest>, RepositoryError> {
        let name = username.as_str().to_string();
        let stored: Option<String> = self
            .with_connection(move |conn| {
                conn.query_row(
                    "SELECT password FROM users WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(stored.map(|p| PasswordDigest::new(&p)).transpose()?)
    }

    async fn group_exists(&self, group: &GroupName) -> Result<bool, RepositoryError> {
        let name = group.as_str().to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM chat_groups WHERE name = ?1)",
                params![name],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn add_group(
        &self,
        group: &GroupName,
        password: &PasswordDigest,
    ) -> Result<(), RepositoryError> {
        let name = group.as_str().to_string();
        let password = password.as_str().to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO chat_groups (name, password) VALUES (?1, ?2)",
                params![name, password],
            )
            .map(|_| ())
        })
        .await
    }

    async fn fetch_group_password(
        &self,
        group: &GroupName,
    ) -> Result<Option<PasswordDigest>, RepositoryError> {
        let name = group.as_str().to_string();
        let stored: Option<String> = self
            .with_connection(move |conn| {
                conn.query_row(
                    "SELECT password FROM chat_groups WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(stored.map(|p| PasswordDigest::new(&p)).transpose()?)
    }

    async fn add_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        let group = message.group.as_str().to_string();
        let sender = message.sender.as_str().to_string();
        let text = message.text.as_str().to_string();
        let time = message.time.as_str().to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO messages (group_name, sender_name, message, time) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![group, sender, text, time],
            )
            .map(|_| ())
        })
        .await
    }

    async fn fetch_messages(&self, group: &GroupName) -> Result<Vec<ChatMessage>, RepositoryError> {
        let name = group.as_str().to_string();
        let rows: Vec<(String, String, String)> = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT sender_name, message, time FROM messages \
                     WHERE group_name = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![name], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(sender, text, time)| -> Result<ChatMessage, RepositoryError> {
                Ok(ChatMessage::new(
                    group.clone(),
                    Username::new(&sender)?,
                    MessageText::new(&text)?,
                    MessageTime::new(&time)?,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::pool::PoolConfig;
    use tempfile::TempDir;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - ファイル DB に対する登録・参照・履歴取得
    // - 同名登録が UNIQUE 制約でエラーになること
    // - プールが枯渇した場合に Unavailable が返ること
    // ========================================

    fn create_test_repository(
        config: PoolConfig,
    ) -> (SqliteChatRepository, Arc<SqlitePool>, TempDir) {
        let dir = TempDir::new().unwrap();
        let manager = SqliteConnectionManager::new(dir.path().join("chat.db"));
        let pool = ConnectionPool::new(manager, config);
        let repo = SqliteChatRepository::open(Arc::clone(&pool)).unwrap();
        (repo, pool, dir)
    }

    fn message(group: &str, sender: &str, text: &str, time: &str) -> ChatMessage {
        ChatMessage::new(
            GroupName::new(group).unwrap(),
            Username::new(sender).unwrap(),
            MessageText::new(text).unwrap(),
            MessageTime::new(time).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_user_round_trip() {
        // テスト項目: ユーザー登録後に存在確認・パスワード取得ができる
        // given (前提条件):
        let (repo, _pool, _dir) = create_test_repository(PoolConfig::default());
        let alice = Username::new("alice").unwrap();

        // when (操作):
        repo.add_user(&alice, &PasswordDigest::new("h1").unwrap())
            .await
            .unwrap();

        // then (期待する結果):
        assert!(repo.user_exists(&alice).await.unwrap());
        assert_eq!(
            repo.fetch_user_password(&alice).await.unwrap(),
            Some(PasswordDigest::new("h1").unwrap())
        );
        let bob = Username::new("bob").unwrap();
        assert!(!repo.user_exists(&bob).await.unwrap());
        assert_eq!(repo.fetch_user_password(&bob).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_user_violates_unique_constraint() {
        // テスト項目: 同名ユーザーの二重登録は Storage エラーになる
        // given (前提条件):
        let (repo, _pool, _dir) = create_test_repository(PoolConfig::default());
        let alice = Username::new("alice").unwrap();
        repo.add_user(&alice, &PasswordDigest::new("h1").unwrap())
            .await
            .unwrap();

        // when (操作):
        let result = repo
            .add_user(&alice, &PasswordDigest::new("h2").unwrap())
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(RepositoryError::Storage(_))));
    }

    #[tokio::test]
    async fn test_group_round_trip() {
        // テスト項目: グループ作成後に存在確認・パスワード取得ができる
        // given (前提条件):
        let (repo, _pool, _dir) = create_test_repository(PoolConfig::default());
        let general = GroupName::new("general").unwrap();

        // when (操作):
        repo.add_group(&general, &PasswordDigest::new("g1").unwrap())
            .await
            .unwrap();

        // then (期待する結果):
        assert!(repo.group_exists(&general).await.unwrap());
        assert_eq!(
            repo.fetch_group_password(&general).await.unwrap(),
            Some(PasswordDigest::new("g1").unwrap())
        );
    }

    #[tokio::test]
    async fn test_history_is_returned_in_insertion_order() {
        // テスト項目: 履歴は対象グループのものだけが追記順で返る
        // given (前提条件):
        let (repo, _pool, _dir) = create_test_repository(PoolConfig::default());
        for m in [
            message("general", "alice", "first", "09:00"),
            message("random", "carol", "elsewhere", "09:01"),
            message("general", "bob", "second", "09:02"),
            message("general", "alice", "third", "09:03"),
        ] {
            repo.add_message(&m).await.unwrap();
        }

        // when (操作):
        let history = repo
            .fetch_messages(&GroupName::new("general").unwrap())
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(
            history,
            vec![
                message("general", "alice", "first", "09:00"),
                message("general", "bob", "second", "09:02"),
                message("general", "alice", "third", "09:03"),
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_pool_reports_unavailable() {
        // テスト項目: プールが枯渇している間は Unavailable が返る
        // given (前提条件):
        let (repo, pool, _dir) = create_test_repository(PoolConfig {
            max_connections: 1,
            max_wait: Duration::from_millis(100),
            wait_interval: Duration::from_millis(20),
            ..PoolConfig::default()
        });
        let held = pool.acquire().unwrap();

        // when (操作):
        let result = repo.user_exists(&Username::new("alice").unwrap()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
        drop(held);
        assert!(repo.user_exists(&Username::new("alice").unwrap()).await.is_ok());
    }
}
