//! UseCase: 切断処理
//!
//! セッションはディスパッチャから取り除かれた後にここへ渡される。
//! グループ参加中だった場合のみ、残りのメンバーに `user_left` を通知する。

use std::sync::Arc;

use hiroba_shared::protocol::Packet;

use crate::domain::{MessagePusher, SessionId, SessionState};

/// 切断のユースケース
pub struct DisconnectUserUseCase {
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl DisconnectUserUseCase {
    /// 新しい DisconnectUserUseCase を作成
    pub fn new(message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self { message_pusher }
    }

    /// 切断を実行
    ///
    /// # Returns
    ///
    /// `user_left` を通知した場合は `true`
    pub fn execute(&self, session: SessionId, last_state: &SessionState) -> bool {
        match last_state {
            SessionState::InGroup { username, group } => {
                tracing::info!("'{}' (session {}) left group '{}'", username, session, group);
                self.message_pusher
                    .broadcast(group, Packet::user_left(username.as_str()), Some(session));
                true
            }
            SessionState::LoggedIn { username } => {
                tracing::info!("'{}' (session {}) disconnected", username, session);
                false
            }
            SessionState::LoggedOut => {
                tracing::debug!("Anonymous session {} disconnected", session);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GroupName, MockMessagePusher, Username};

    #[test]
    fn test_disconnect_in_group_notifies_members() {
        // テスト項目: グループ参加中のセッションが切断すると user_left が通知される
        // given (前提条件):
        let mut pusher = MockMessagePusher::new();
        pusher
            .expect_broadcast()
            .withf(|group, packet, exclude| {
                group.as_str() == "general"
                    && *packet == Packet::user_left("alice")
                    && *exclude == Some(SessionId::new(1))
            })
            .times(1)
            .return_const(());
        let usecase = DisconnectUserUseCase::new(Arc::new(pusher));
        let state = SessionState::InGroup {
            username: Username::new("alice").unwrap(),
            group: GroupName::new("general").unwrap(),
        };

        // when (操作):
        let announced = usecase.execute(SessionId::new(1), &state);

        // then (期待する結果):
        assert!(announced);
    }

    #[test]
    fn test_disconnect_without_group_is_silent() {
        // テスト項目: グループ未参加のセッションの切断は何も通知しない
        // given (前提条件):
        let mut pusher = MockMessagePusher::new();
        pusher.expect_broadcast().never();
        pusher.expect_unicast().never();
        let usecase = DisconnectUserUseCase::new(Arc::new(pusher));

        // when (操作):
        let logged_in = usecase.execute(
            SessionId::new(1),
            &SessionState::LoggedIn {
                username: Username::new("alice").unwrap(),
            },
        );
        let logged_out = usecase.execute(SessionId::new(2), &SessionState::LoggedOut);

        // then (期待する結果):
        assert!(!logged_in);
        assert!(!logged_out);
    }
}
