//! UseCase: グループ参加処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectGroupUseCase::execute() / announce() メソッド
//! - 参加成功時のロスター・履歴の内容と、既存メンバーへの通知
//!
//! ### なぜこのテストが必要か
//! - 参加者は「自分以外のメンバー」と「グループの全履歴」を受け取る必要がある
//! - `user_joined` は参加者本人には届いてはならない
//!
//! ### どのような状況を想定しているか
//! - 正常系：空のグループに参加、既存メンバーがいるグループに参加
//! - 異常系：存在しないグループ、パスワード不一致
//! - 異常系：履歴取得に失敗した場合はグループに束縛しない
//! - 競合：束縛の前後に投稿されたメッセージ、同時に参加した 2 人のロスターと通知

use std::sync::Arc;

use hiroba_shared::protocol::{HistoryRecord, Packet};

use crate::domain::{
    ChatMessage, ChatRepository, GroupMember, GroupName, MessagePusher, PasswordDigest, Presence,
    SessionId, Username,
};

use super::error::ConnectGroupError;

/// 参加直後に参加者へ送る内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSnapshot {
    /// 束縛した時点で参加済みだった他のメンバー（接続順）
    pub members: Vec<GroupMember>,
    /// グループの全履歴（追記順）
    pub history: Vec<ChatMessage>,
}

/// グループ参加のユースケース
pub struct ConnectGroupUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn ChatRepository>,
    /// Presence（接続中セッションの識別情報）
    presence: Arc<dyn Presence>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl ConnectGroupUseCase {
    /// 新しい ConnectGroupUseCase を作成
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        presence: Arc<dyn Presence>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            repository,
            presence,
            message_pusher,
        }
    }

    /// グループ参加を実行
    ///
    /// 検証と履歴取得が成功した場合にのみ `group` をセッションに束縛する。
    /// 成功応答の送信は呼び出し側が行い、その後 [`Self::announce`] を呼ぶ。
    pub async fn execute(
        &self,
        session: SessionId,
        group: &GroupName,
        password: &PasswordDigest,
    ) -> Result<JoinSnapshot, ConnectGroupError> {
        let stored = self
            .repository
            .fetch_group_password(group)
            .await?
            .ok_or(ConnectGroupError::GroupNotFound)?;

        if !password.matches(&stored) {
            return Err(ConnectGroupError::InvalidPassword);
        }

        let before_bind = self.repository.fetch_messages(group).await?;

        let members = self.presence.join_group(session, group)?;

        // 束縛後に読んだ履歴は、束縛前に配送対象が決まったメッセージをすべて含む
        let history = match self.repository.fetch_messages(group).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(
                    "Session {}: re-reading history of '{}' failed, using the earlier read: {}",
                    session,
                    group,
                    e
                );
                before_bind
            }
        };
        tracing::info!(
            "Session {} joined group '{}' ({} other member(s), {} message(s) of history)",
            session,
            group,
            members.len(),
            history.len()
        );

        Ok(JoinSnapshot { members, history })
    }

    /// 参加者に `inform_joiner` を送り、ロスターに載せたメンバーに `user_joined` を通知する
    ///
    /// 後から参加したセッションはロスターで参加者を知るため、`user_joined` は送らない。
    pub fn announce(&self, session: SessionId, username: &Username, snapshot: JoinSnapshot) {
        let usernames = snapshot
            .members
            .iter()
            .map(|member| member.username.as_str().to_string())
            .collect();
        let messages = snapshot
            .history
            .into_iter()
            .map(HistoryRecord::from)
            .collect();

        self.message_pusher
            .unicast(session, Packet::inform_joiner(usernames, messages));
        for member in snapshot.members {
            self.message_pusher
                .unicast(member.session, Packet::user_joined(username.as_str()));
        }
    }
}
