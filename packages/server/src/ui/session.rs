//! Client Session
//!
//! 1 接続につき 1 つ。ソケットはワーカースレッド上のタスクが専有し、
//! 他スレッドからの送信・切断要求はすべて inbox（チャネル）経由で届く。
//! 識別情報（ユーザー名・グループ名）は他スレッドからも読まれるため RwLock で保護する。

use std::{net::SocketAddr, sync::Arc};

use futures_util::{SinkExt, StreamExt};
use hiroba_shared::protocol::{Packet, PacketCodec, ProtocolError};
use parking_lot::RwLock;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_util::codec::Framed;

use crate::domain::{BindError, GroupName, SessionId, SessionState, Username};

use super::handler::PacketHandler;

/// セッションタスクへの要求
#[derive(Debug)]
pub enum SessionCommand {
    Send(Packet),
    Disconnect,
}

/// セッションタスクからハンドラへ通知されるイベント
#[derive(Debug)]
pub enum SessionEvent {
    Connected,
    PacketReceived(Packet),
    Error(ProtocolError),
    Disconnected,
}

#[derive(Debug, Default)]
struct Identity {
    username: Option<Username>,
    group: Option<GroupName>,
}

/// セッションの共有部分（ディスパッチャと所有ワーカーの双方が参照する）
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    peer: SocketAddr,
    worker: usize,
    identity: RwLock<Identity>,
    inbox: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        worker: usize,
        inbox: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self {
            id,
            peer,
            worker,
            identity: RwLock::new(Identity::default()),
            inbox,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// 所有ワーカーの番号
    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn username(&self) -> Option<Username> {
        self.identity.read().username.clone()
    }

    pub fn group(&self) -> Option<GroupName> {
        self.identity.read().group.clone()
    }

    /// 現在のプロトコル状態（一度のロックで読む）
    pub fn state(&self) -> SessionState {
        let identity = self.identity.read();
        match (&identity.username, &identity.group) {
            (Some(username), Some(group)) => SessionState::InGroup {
                username: username.clone(),
                group: group.clone(),
            },
            (Some(username), None) => SessionState::LoggedIn {
                username: username.clone(),
            },
            (None, _) => SessionState::LoggedOut,
        }
    }

    pub fn is_member_of(&self, group: &GroupName) -> bool {
        self.identity.read().group.as_ref() == Some(group)
    }

    /// ユーザー名を設定（一度だけ）
    pub fn set_username(&self, username: Username) -> Result<(), BindError> {
        let mut identity = self.identity.write();
        if identity.username.is_some() {
            return Err(BindError::AlreadyBound);
        }
        identity.username = Some(username);
        Ok(())
    }

    /// グループ名を設定（一度だけ、ユーザー名の設定後）
    pub fn set_group(&self, group: GroupName) -> Result<(), BindError> {
        let mut identity = self.identity.write();
        if identity.username.is_none() {
            return Err(BindError::NotLoggedIn);
        }
        if identity.group.is_some() {
            return Err(BindError::AlreadyBound);
        }
        identity.group = Some(group);
        Ok(())
    }

    /// 送信を所有ワーカーに予約する。セッションが終了済みなら `false`
    pub fn send(&self, packet: Packet) -> bool {
        self.inbox.send(SessionCommand::Send(packet)).is_ok()
    }

    /// 切断を要求する。完了すると `Disconnected` イベントが発生する
    pub fn disconnect(&self) {
        let _ = self.inbox.send(SessionCommand::Disconnect);
    }
}

/// ワーカー上で動くセッションタスク
pub struct SessionTask {
    handle: Arc<SessionHandle>,
    socket: std::net::TcpStream,
    inbox: mpsc::UnboundedReceiver<SessionCommand>,
    handler: Arc<PacketHandler>,
    max_frame_len: usize,
}

impl SessionTask {
    pub fn new(
        handle: Arc<SessionHandle>,
        socket: std::net::TcpStream,
        inbox: mpsc::UnboundedReceiver<SessionCommand>,
        handler: Arc<PacketHandler>,
        max_frame_len: usize,
    ) -> Self {
        Self {
            handle,
            socket,
            inbox,
            handler,
            max_frame_len,
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    /// 所有ワーカーのランタイム上で実行する
    pub async fn run(self) {
        let Self {
            handle,
            socket,
            mut inbox,
            handler,
            max_frame_len,
        } = self;

        let stream = match TcpStream::from_std(socket) {
            Ok(stream) => stream,
            Err(e) => {
                handler.on_event(&handle, SessionEvent::Error(e.into())).await;
                handler.on_event(&handle, SessionEvent::Disconnected).await;
                return;
            }
        };
        let mut framed = Framed::new(stream, PacketCodec::with_max_frame_len(max_frame_len));

        handler.on_event(&handle, SessionEvent::Connected).await;

        loop {
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(SessionCommand::Send(packet)) => match framed.send(packet).await {
                        Ok(()) => {}
                        Err(e) if e.is_io() => {
                            handler.on_event(&handle, SessionEvent::Error(e)).await;
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Session {}: dropping unsendable packet: {}",
                                handle.id(),
                                e
                            );
                        }
                    },
                    Some(SessionCommand::Disconnect) | None => break,
                },
                frame = framed.next() => match frame {
                    Some(Ok(packet)) => {
                        handler
                            .on_event(&handle, SessionEvent::PacketReceived(packet))
                            .await;
                    }
                    Some(Err(e)) => {
                        handler.on_event(&handle, SessionEvent::Error(e)).await;
                        break;
                    }
                    None => break,
                },
            }
        }

        if let Err(e) = framed.close().await {
            tracing::debug!("Session {} closed uncleanly: {}", handle.id(), e);
        }
        handler.on_event(&handle, SessionEvent::Disconnected).await;
    }
}
