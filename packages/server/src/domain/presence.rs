//! Presence / MessagePusher trait 定義
//!
//! 接続中セッションの状態参照と、セッションへのパケット配送の抽象化。
//! 具体的な実装は UI 層のディスパッチャ（`ui::Dispatcher`）が提供します。
//!
//! どちらも配送をキューに積むだけで完了を待たない（fire-and-forget）ため、
//! 同期メソッドとして定義しています。

use hiroba_shared::protocol::Packet;

use super::{BindError, GroupName, SessionId, Username};

/// グループ参加中のセッション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub session: SessionId,
    pub username: Username,
}

/// 接続中セッションの識別情報への操作
#[cfg_attr(test, mockall::automock)]
pub trait Presence: Send + Sync {
    /// ユーザー名をセッションに束縛する
    ///
    /// 「他の接続中セッションが同名を保持していないこと」の確認と束縛は
    /// 一つの原子的な操作として行われる。
    fn claim_username(&self, session: SessionId, username: &Username) -> Result<(), BindError>;

    /// グループ名をセッションに束縛し、その時点で参加済みの他のメンバーを返す（接続順）
    ///
    /// 束縛とメンバー一覧の取得は一つの原子的な操作として行われる。
    /// 同時に参加した 2 セッションのうち、後に束縛された側だけが相手を一覧に含む。
    fn join_group(
        &self,
        session: SessionId,
        group: &GroupName,
    ) -> Result<Vec<GroupMember>, BindError>;
}

/// セッションへのパケット配送
#[cfg_attr(test, mockall::automock)]
pub trait MessagePusher: Send + Sync {
    /// 接続中であれば 1 セッションに配送、そうでなければ何もしない
    fn unicast(&self, target: SessionId, packet: Packet);

    /// `group` に参加中の全セッション（`exclude` を除く）に配送
    fn broadcast(&self, group: &GroupName, packet: Packet, exclude: Option<SessionId>);
}
