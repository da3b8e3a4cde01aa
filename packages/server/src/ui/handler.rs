//! Protocol Handler
//!
//! セッションイベントを受け取り、セッションの状態に応じたハンドラにパケットを振り分ける。
//!
//! - `LoggedOut`: `register` / `login`
//! - `LoggedIn`: `connect_group`
//! - `InGroup`: `message`
//!
//! 必須フィールドの欠落・型違い・空値はプロトコル違反として黙って破棄する（応答しない）。
//! ビジネスルール上の拒否のみ `{success: false, reason}` で応答する。

use std::sync::Arc;

use hiroba_shared::{
    protocol::{Packet, PacketType, field},
    time::Clock,
};

use crate::{
    domain::{
        ChatRepository, GroupName, MessagePusher, MessageText, MessageTime, PasswordDigest,
        SessionState, Username,
    },
    usecase::{
        ConnectGroupUseCase, DisconnectUserUseCase, LoginUserUseCase, RegisterUserUseCase,
        SendMessageUseCase,
    },
};

use super::{
    dispatcher::Dispatcher,
    session::{SessionEvent, SessionHandle},
};

/// `username` + `password` を値オブジェクトとして取り出す
fn credentials(packet: &Packet) -> Option<(Username, PasswordDigest)> {
    let username = Username::new(packet.str_field(field::USERNAME)?).ok()?;
    let password = PasswordDigest::new(packet.str_field(field::PASSWORD)?).ok()?;
    Some((username, password))
}

/// Protocol Handler
pub struct PacketHandler {
    dispatcher: Arc<Dispatcher>,
    register_user: RegisterUserUseCase,
    login_user: LoginUserUseCase,
    connect_group: ConnectGroupUseCase,
    send_message: SendMessageUseCase,
    disconnect_user: DisconnectUserUseCase,
}

impl PacketHandler {
    /// ディスパッチャを Presence / MessagePusher としてユースケースを組み立てる
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        repository: Arc<dyn ChatRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            register_user: RegisterUserUseCase::new(repository.clone()),
            login_user: LoginUserUseCase::new(repository.clone(), dispatcher.clone()),
            connect_group: ConnectGroupUseCase::new(
                repository.clone(),
                dispatcher.clone(),
                dispatcher.clone(),
            ),
            send_message: SendMessageUseCase::new(repository, dispatcher.clone(), clock),
            disconnect_user: DisconnectUserUseCase::new(dispatcher.clone()),
            dispatcher,
        }
    }

    pub async fn on_event(&self, session: &SessionHandle, event: SessionEvent) {
        match event {
            SessionEvent::Connected => {
                tracing::info!(
                    "Session {} connected from {} on worker {}",
                    session.id(),
                    session.peer(),
                    session.worker()
                );
            }
            SessionEvent::PacketReceived(packet) => self.on_packet(session, packet).await,
            SessionEvent::Error(e) => {
                tracing::warn!("Session {} ({}) error: {}", session.id(), session.peer(), e);
            }
            SessionEvent::Disconnected => {
                let Some(removed) = self.dispatcher.remove(session.id()) else {
                    return;
                };
                self.disconnect_user.execute(removed.id(), &removed.state());
            }
        }
    }

    async fn on_packet(&self, session: &SessionHandle, packet: Packet) {
        let Some(kind) = packet.kind() else {
            tracing::debug!(
                "Session {}: ignoring packet of unknown type {:?}",
                session.id(),
                packet.raw_type()
            );
            return;
        };

        match (session.state(), kind) {
            (SessionState::LoggedOut, PacketType::Register) => {
                self.handle_register(session, &packet).await
            }
            (SessionState::LoggedOut, PacketType::Login) => {
                self.handle_login(session, &packet).await
            }
            (SessionState::LoggedIn { username }, PacketType::ConnectGroup) => {
                self.handle_connect_group(session, &username, &packet).await
            }
            (SessionState::InGroup { username, group }, PacketType::Message) => {
                self.handle_message(session, &username, &group, &packet)
                    .await
            }
            (state, kind) => {
                tracing::debug!(
                    "Session {}: dropping '{}' in state {:?}",
                    session.id(),
                    kind,
                    state
                );
            }
        }
    }

    fn reply(&self, session: &SessionHandle, packet: Packet) {
        self.dispatcher.unicast(session.id(), packet);
    }

    async fn handle_register(&self, session: &SessionHandle, packet: &Packet) {
        let Some((username, password)) = credentials(packet) else {
            tracing::debug!("Session {}: malformed register", session.id());
            return;
        };

        match self.register_user.execute(&username, &password).await {
            Ok(()) => self.reply(session, Packet::success(PacketType::Register)),
            Err(e) => match e.rejection_reason() {
                Some(reason) => {
                    self.reply(session, Packet::failure(PacketType::Register, &reason))
                }
                None => tracing::warn!("Session {}: register dropped: {}", session.id(), e),
            },
        }
    }

    async fn handle_login(&self, session: &SessionHandle, packet: &Packet) {
        let Some((username, password)) = credentials(packet) else {
            tracing::debug!("Session {}: malformed login", session.id());
            return;
        };

        match self
            .login_user
            .execute(session.id(), &username, &password)
            .await
        {
            Ok(()) => self.reply(session, Packet::success(PacketType::Login)),
            Err(e) => match e.rejection_reason() {
                Some(reason) => self.reply(session, Packet::failure(PacketType::Login, &reason)),
                None => tracing::warn!("Session {}: login dropped: {}", session.id(), e),
            },
        }
    }

    async fn handle_connect_group(
        &self,
        session: &SessionHandle,
        username: &Username,
        packet: &Packet,
    ) {
        let fields = (
            packet.str_field(field::USERNAME),
            packet.str_field(field::GROUP_NAME),
            packet.str_field(field::PASSWORD),
        );
        let (Some(_), Some(group), Some(password)) = fields else {
            tracing::debug!("Session {}: malformed connect_group", session.id());
            return;
        };
        let (Ok(group), Ok(password)) = (GroupName::new(group), PasswordDigest::new(password))
        else {
            tracing::debug!("Session {}: empty connect_group field", session.id());
            return;
        };

        match self
            .connect_group
            .execute(session.id(), &group, &password)
            .await
        {
            Ok(snapshot) => {
                self.reply(session, Packet::success(PacketType::ConnectGroup));
                self.connect_group.announce(session.id(), username, snapshot);
            }
            Err(e) => match e.rejection_reason() {
                Some(reason) => {
                    self.reply(session, Packet::failure(PacketType::ConnectGroup, &reason))
                }
                None => tracing::warn!("Session {}: connect_group dropped: {}", session.id(), e),
            },
        }
    }

    async fn handle_message(
        &self,
        session: &SessionHandle,
        username: &Username,
        group: &GroupName,
        packet: &Packet,
    ) {
        let Some(text) = packet
            .str_field(field::TEXT)
            .and_then(|text| MessageText::new(text).ok())
        else {
            tracing::debug!("Session {}: empty message", session.id());
            return;
        };
        let time = packet
            .str_field(field::TIME)
            .and_then(|time| MessageTime::new(time).ok());

        if let Err(e) = self
            .send_message
            .execute(session.id(), username, group, text, time)
            .await
        {
            tracing::warn!("Session {}: {}", session.id(), e);
        }
    }
}
