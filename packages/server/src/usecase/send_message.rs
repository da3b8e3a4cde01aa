//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 履歴への追記と、送信者を除くグループメンバーへの中継
//!
//! ### どのような状況を想定しているか
//! - 正常系：クライアントが付与した時刻をそのまま使う
//! - 正常系：時刻がなければサーバーの時計で `HH:MM` を付与する
//! - 異常系：永続化に失敗したメッセージは中継されない

use std::sync::Arc;

use hiroba_shared::{
    protocol::Packet,
    time::{Clock, message_time_now},
};

use crate::domain::{
    ChatMessage, ChatRepository, GroupName, MessagePusher, MessageText, MessageTime, SessionId,
    Username,
};

use super::error::SendMessageError;

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn ChatRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    /// 時刻が省略されたメッセージに使う時計
    clock: Arc<dyn Clock>,
}

impl SendMessageUseCase {
    /// 新しい SendMessageUseCase を作成
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
            clock,
        }
    }

    /// メッセージ送信を実行
    ///
    /// # Arguments
    ///
    /// * `sender_session` - 送信元セッション（中継対象から除外される）
    /// * `sender` / `group` - 送信元セッションに束縛済みの識別情報
    /// * `text` - 前後の空白を除去済みの本文
    /// * `time` - クライアントが付与した時刻（なければサーバーで付与）
    ///
    /// # Returns
    ///
    /// 永続化・中継したメッセージ
    pub async fn execute(
        &self,
        sender_session: SessionId,
        sender: &Username,
        group: &GroupName,
        text: MessageText,
        time: Option<MessageTime>,
    ) -> Result<ChatMessage, SendMessageError> {
        let time = match time {
            Some(time) => time,
            None => MessageTime::new(&message_time_now(self.clock.as_ref()))?,
        };
        let message = ChatMessage::new(group.clone(), sender.clone(), text, time);

        // 1. 履歴に追記（失敗した場合は中継しない）
        self.repository.add_message(&message).await?;

        // 2. 送信者以外のメンバーへ中継（送信者はローカルでエコー済み）
        self.message_pusher.broadcast(
            group,
            Packet::relayed_message(
                message.sender.as_str(),
                message.text.as_str(),
                message.time.as_str(),
            ),
            Some(sender_session),
        );

        tracing::debug!("'{}' posted to '{}'", sender, group);
        Ok(message)
    }
}
