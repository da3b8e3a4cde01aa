//! UseCase テスト用のフェイク実装

use std::collections::BTreeMap;

use hiroba_shared::protocol::Packet;
use parking_lot::Mutex;

use crate::domain::{
    BindError, GroupMember, GroupName, MessagePusher, Presence, SessionId, Username,
};

/// 配送されたパケットの記録
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Unicast(SessionId, Packet),
    Broadcast(GroupName, Packet, Option<SessionId>),
}

/// 配送を記録するだけの MessagePusher
#[derive(Default)]
pub struct RecordingPusher {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingPusher {
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }
}

impl MessagePusher for RecordingPusher {
    fn unicast(&self, target: SessionId, packet: Packet) {
        self.deliveries.lock().push(Delivery::Unicast(target, packet));
    }

    fn broadcast(&self, group: &GroupName, packet: Packet, exclude: Option<SessionId>) {
        self.deliveries
            .lock()
            .push(Delivery::Broadcast(group.clone(), packet, exclude));
    }
}

/// セッション ID 順（= 接続順）に識別情報を保持する Presence
#[derive(Default)]
pub struct FakePresence {
    sessions: Mutex<BTreeMap<SessionId, (Option<Username>, Option<GroupName>)>>,
}

impl FakePresence {
    pub fn connect(&self, session: SessionId) {
        self.sessions.lock().insert(session, (None, None));
    }

    pub fn identity(&self, session: SessionId) -> Option<(Option<Username>, Option<GroupName>)> {
        self.sessions.lock().get(&session).cloned()
    }
}

impl Presence for FakePresence {
    fn claim_username(&self, session: SessionId, username: &Username) -> Result<(), BindError> {
        let mut sessions = self.sessions.lock();
        if sessions
            .values()
            .any(|(name, _)| name.as_ref() == Some(username))
        {
            return Err(BindError::UsernameTaken);
        }
        let (name, _) = sessions
            .get_mut(&session)
            .ok_or(BindError::UnknownSession)?;
        if name.is_some() {
            return Err(BindError::AlreadyBound);
        }
        *name = Some(username.clone());
        Ok(())
    }

    fn join_group(
        &self,
        session: SessionId,
        group: &GroupName,
    ) -> Result<Vec<GroupMember>, BindError> {
        let mut sessions = self.sessions.lock();
        let (name, bound) = sessions
            .get_mut(&session)
            .ok_or(BindError::UnknownSession)?;
        if name.is_none() {
            return Err(BindError::NotLoggedIn);
        }
        if bound.is_some() {
            return Err(BindError::AlreadyBound);
        }
        *bound = Some(group.clone());

        Ok(sessions
            .iter()
            .filter(|(id, _)| **id != session)
            .filter_map(|(id, (name, bound))| match (name, bound) {
                (Some(name), Some(bound)) if bound == group => Some(GroupMember {
                    session: *id,
                    username: name.clone(),
                }),
                _ => None,
            })
            .collect())
    }
}
