//! Packet model: a flat JSON object with a `type` discriminator.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names used on the wire.
pub mod field {
    pub const TYPE: &str = "type";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const GROUP_NAME: &str = "group_name";
    pub const TEXT: &str = "text";
    pub const SENDER: &str = "sender";
    pub const TIME: &str = "time";
    pub const SUCCESS: &str = "success";
    pub const REASON: &str = "reason";
    pub const USERNAMES: &str = "usernames";
    pub const MESSAGES: &str = "messages";
}

/// Packet type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Login,
    Register,
    ConnectGroup,
    Message,
    UserJoined,
    UserLeft,
    InformJoiner,
}

impl PacketType {
    pub const ALL: [PacketType; 7] = [
        PacketType::Login,
        PacketType::Register,
        PacketType::ConnectGroup,
        PacketType::Message,
        PacketType::UserJoined,
        PacketType::UserLeft,
        PacketType::InformJoiner,
    ];

    /// Wire spelling of this type
    pub fn as_str(self) -> &'static str {
        match self {
            PacketType::Login => "login",
            PacketType::Register => "register",
            PacketType::ConnectGroup => "connect_group",
            PacketType::Message => "message",
            PacketType::UserJoined => "user_joined",
            PacketType::UserLeft => "user_left",
            PacketType::InformJoiner => "inform_joiner",
        }
    }

    /// Match a wire value against the vocabulary, ignoring ASCII case.
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted chat line as carried in `inform_joiner.messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub sender: String,
    pub text: String,
    pub time: String,
}

/// A decoded packet.
///
/// Fields are looked up leniently: a missing or wrong-typed field reads as `None`
/// so callers can drop non-conforming packets without an error path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Packet(Map<String, Value>);

impl Packet {
    /// Empty packet of the given type
    pub fn new(kind: PacketType) -> Self {
        Self::default().with(field::TYPE, kind.as_str())
    }

    /// Set a field, replacing any previous value
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Raw `type` string, if present and a string
    pub fn raw_type(&self) -> Option<&str> {
        self.str_field(field::TYPE)
    }

    /// Known packet type, matched case-insensitively
    pub fn kind(&self) -> Option<PacketType> {
        self.raw_type().and_then(PacketType::from_wire)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String field, `None` when missing or not a string
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Boolean field, `None` when missing or not a boolean
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Array of strings, `None` when missing or when any element is not a string
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        self.0
            .get(key)?
            .as_array()?
            .iter()
            .map(|value| value.as_str().map(str::to_string))
            .collect()
    }

    /// `messages` history, `None` when missing or malformed
    pub fn history(&self) -> Option<Vec<HistoryRecord>> {
        serde_json::from_value(self.0.get(field::MESSAGES)?.clone()).ok()
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_object(self) -> Map<String, Value> {
        self.0
    }

    // ------------------------------------------------------------------
    // client → server
    // ------------------------------------------------------------------

    pub fn register(username: &str, password_digest: &str) -> Self {
        Self::new(PacketType::Register)
            .with(field::USERNAME, username)
            .with(field::PASSWORD, password_digest)
    }

    pub fn login(username: &str, password_digest: &str) -> Self {
        Self::new(PacketType::Login)
            .with(field::USERNAME, username)
            .with(field::PASSWORD, password_digest)
    }

    pub fn connect_group(username: &str, group_name: &str, password_digest: &str) -> Self {
        Self::new(PacketType::ConnectGroup)
            .with(field::USERNAME, username)
            .with(field::GROUP_NAME, group_name)
            .with(field::PASSWORD, password_digest)
    }

    /// Outgoing chat line; the server stamps the time when `time` is `None`.
    pub fn chat(text: &str, time: Option<&str>) -> Self {
        let packet = Self::new(PacketType::Message).with(field::TEXT, text);
        match time {
            Some(time) => packet.with(field::TIME, time),
            None => packet,
        }
    }

    // ------------------------------------------------------------------
    // server → client
    // ------------------------------------------------------------------

    /// `{type, success: true}`
    pub fn success(kind: PacketType) -> Self {
        Self::new(kind).with(field::SUCCESS, true)
    }

    /// `{type, success: false, reason}`
    pub fn failure(kind: PacketType, reason: &str) -> Self {
        Self::new(kind)
            .with(field::SUCCESS, false)
            .with(field::REASON, reason)
    }

    pub fn user_joined(username: &str) -> Self {
        Self::new(PacketType::UserJoined).with(field::USERNAME, username)
    }

    pub fn user_left(username: &str) -> Self {
        Self::new(PacketType::UserLeft).with(field::USERNAME, username)
    }

    /// Chat line relayed to the rest of a group
    pub fn relayed_message(sender: &str, text: &str, time: &str) -> Self {
        Self::new(PacketType::Message)
            .with(field::SENDER, sender)
            .with(field::TEXT, text)
            .with(field::TIME, time)
    }

    /// Roster and history unicast to a session that just joined a group
    pub fn inform_joiner(usernames: Vec<String>, messages: Vec<HistoryRecord>) -> Self {
        let messages: Vec<Value> = messages
            .into_iter()
            .map(|record| {
                let mut entry = Map::new();
                entry.insert(field::SENDER.to_string(), record.sender.into());
                entry.insert(field::TEXT.to_string(), record.text.into());
                entry.insert(field::TIME.to_string(), record.time.into());
                Value::Object(entry)
            })
            .collect();

        Self::new(PacketType::InformJoiner)
            .with(field::USERNAMES, usernames)
            .with(field::MESSAGES, messages)
    }
}

impl From<Map<String, Value>> for Packet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
