//! Entities

use hiroba_shared::protocol::HistoryRecord;

use super::value_object::{GroupName, MessageText, MessageTime, Username};

/// 永続化されるチャットメッセージ（追記のみ、更新・削除はしない）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub group: GroupName,
    pub sender: Username,
    pub text: MessageText,
    pub time: MessageTime,
}

impl ChatMessage {
    pub fn new(group: GroupName, sender: Username, text: MessageText, time: MessageTime) -> Self {
        Self {
            group,
            sender,
            text,
            time,
        }
    }
}

impl From<ChatMessage> for HistoryRecord {
    fn from(message: ChatMessage) -> Self {
        Self {
            sender: message.sender.into_string(),
            text: message.text.into_string(),
            time: message.time.into_string(),
        }
    }
}

/// セッションのプロトコル上の状態
///
/// `LoggedOut → LoggedIn → InGroup` の順にしか進まない。
/// グループ参加中なのにユーザー名がない状態は表現できない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn { username: Username },
    InGroup { username: Username, group: GroupName },
}

impl SessionState {
    pub fn username(&self) -> Option<&Username> {
        match self {
            SessionState::LoggedOut => None,
            SessionState::LoggedIn { username } | SessionState::InGroup { username, .. } => {
                Some(username)
            }
        }
    }

    pub fn group(&self) -> Option<&GroupName> {
        match self {
            SessionState::InGroup { group, .. } => Some(group),
            _ => None,
        }
    }
}
