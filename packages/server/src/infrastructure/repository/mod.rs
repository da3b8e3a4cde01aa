//! ChatRepository implementations.

pub mod inmemory;
pub mod sqlite;

pub use inmemory::InMemoryChatRepository;
pub use sqlite::{SqliteChatRepository, SqliteConnectionManager, SqlitePool};
