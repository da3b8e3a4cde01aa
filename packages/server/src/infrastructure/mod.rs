//! Infrastructure layer: connection pool and persistence gateways.

pub mod pool;
pub mod repository;

pub use pool::{
    ConnectionManager, ConnectionPool, PoolConfig, PoolError, PoolStatus, PooledConnection,
};
pub use repository::{
    InMemoryChatRepository, SqliteChatRepository, SqliteConnectionManager, SqlitePool,
};
