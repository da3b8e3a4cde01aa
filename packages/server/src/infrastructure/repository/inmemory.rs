//! InMemory Chat Repository 実装
//!
//! ドメイン層が定義する ChatRepository trait の具体的な実装。
//! HashMap / Vec をインメモリ DB として使用します。テストと `--in-memory` 起動用。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ChatMessage, ChatRepository, GroupName, PasswordDigest, RepositoryError, Username,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Username, PasswordDigest>,
    groups: HashMap<GroupName, PasswordDigest>,
    /// 追記順
    messages: Vec<ChatMessage>,
}

/// インメモリ Chat Repository 実装
#[derive(Default)]
pub struct InMemoryChatRepository {
    tables: Mutex<Tables>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn user_exists(&self, username: &Username) -> Result<bool, RepositoryError> {
        Ok(self.tables.lock().await.users.contains_key(username))
    }

    async fn add_user(
        &self,
        username: &Username,
        password: &PasswordDigest,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.users.contains_key(username) {
            return Err(RepositoryError::Storage(format!(
                "user '{}' already stored",
                username
            )));
        }
        tables.users.insert(username.clone(), password.clone());
        Ok(())
    }

    async fn fetch_user_password(
        &self,
        username: &Username,
    ) -> Result<Option<PasswordDigest>, RepositoryError> {
        Ok(self.tables.lock().await.users.get(username).cloned())
    }

    async fn group_exists(&self, group: &GroupName) -> Result<bool, RepositoryError> {
        Ok(self.tables.lock().await.groups.contains_key(group))
    }

    async fn add_group(
        &self,
        group: &GroupName,
        password: &PasswordDigest,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.contains_key(group) {
            return Err(RepositoryError::Storage(format!(
                "group '{}' already stored",
                group
            )));
        }
        tables.groups.insert(group.clone(), password.clone());
        Ok(())
    }

    async fn fetch_group_password(
        &self,
        group: &GroupName,
    ) -> Result<Option<PasswordDigest>, RepositoryError> {
        Ok(self.tables.lock().await.groups.get(group).cloned())
    }

    async fn add_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        self.tables.lock().await.messages.push(message.clone());
        Ok(())
    }

    async fn fetch_messages(&self, group: &GroupName) -> Result<Vec<ChatMessage>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .messages
            .iter()
            .filter(|message| &message.group == group)
            .cloned()
            .collect())
    }
}
