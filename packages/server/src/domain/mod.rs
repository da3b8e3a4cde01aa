//! Domain layer: value objects, entities and the interfaces the use cases depend on.

pub mod entity;
pub mod error;
pub mod presence;
pub mod repository;
pub mod value_object;

pub use entity::{ChatMessage, SessionState};
pub use error::{BindError, RepositoryError, ValueObjectError};
pub use presence::{GroupMember, MessagePusher, Presence};
pub use repository::ChatRepository;
pub use value_object::{GroupName, MessageText, MessageTime, PasswordDigest, SessionId, Username};

#[cfg(test)]
pub use presence::{MockMessagePusher, MockPresence};
#[cfg(test)]
pub use repository::MockChatRepository;
