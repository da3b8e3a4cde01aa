//! Hiroba group chat server.
//!
//! Accepts TCP clients speaking length-prefixed JSON, authenticates them and relays
//! messages inside password-protected groups. State lives in a SQLite file.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server
//! cargo run --bin hiroba-server -- --host 0.0.0.0 --port 30000 --database chat.db
//! cargo run --bin hiroba-server -- add-group --name general --password secret
//! ```

use std::{error::Error, path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use hiroba_server::{
    config::{DEFAULT_HOST, DEFAULT_PORT, ServerConfig},
    domain::{ChatRepository, GroupName, PasswordDigest},
    infrastructure::{
        ConnectionPool, InMemoryChatRepository, PoolConfig, SqliteChatRepository,
        SqliteConnectionManager, SqlitePool,
    },
    ui::{Server, shutdown_signal},
};
use hiroba_shared::{
    digest::password_digest, logger::setup_logger, protocol::DEFAULT_MAX_FRAME_LEN,
    time::SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "hiroba-server")]
#[command(about = "Multi-user group chat server over TCP", long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(short = 'd', long, default_value = "hiroba.db", global = true)]
    database: PathBuf,

    /// Keep everything in memory (nothing survives a restart)
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(flatten)]
    pool: PoolArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of worker threads (defaults to the hardware thread count)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Largest accepted packet in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,
}

#[derive(clap::Args, Debug)]
struct PoolArgs {
    /// Maximum number of database connections
    #[arg(long, default_value_t = 50)]
    pool_max_connections: usize,

    /// How long a request may wait for a free connection (milliseconds)
    #[arg(long, default_value_t = 1000)]
    pool_max_wait_ms: u64,

    /// Re-check period while waiting for a connection (milliseconds)
    #[arg(long, default_value_t = 200)]
    pool_wait_interval_ms: u64,

    /// Idle connection reap period (seconds)
    #[arg(long, default_value_t = 300)]
    pool_reap_interval_secs: u64,
}

impl PoolArgs {
    fn to_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.pool_max_connections,
            max_wait: Duration::from_millis(self.pool_max_wait_ms),
            wait_interval: Duration::from_millis(self.pool_wait_interval_ms),
            reap_interval: Duration::from_secs(self.pool_reap_interval_secs),
            test_on_borrow: true,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a chat group
    AddGroup {
        /// Group name
        #[arg(short = 'n', long)]
        name: String,

        /// Group password (stored as a digest)
        #[arg(short = 'P', long)]
        password: String,
    },
}

/// Repository plus the pool behind it, if any
struct Storage {
    repository: Arc<dyn ChatRepository>,
    pool: Option<Arc<SqlitePool>>,
}

impl Storage {
    fn open(args: &Args) -> Result<Self, Box<dyn Error>> {
        if args.in_memory {
            tracing::warn!("Using in-memory storage; nothing will be persisted");
            return Ok(Self {
                repository: Arc::new(InMemoryChatRepository::new()),
                pool: None,
            });
        }

        let pool = ConnectionPool::new(
            SqliteConnectionManager::new(&args.database),
            args.pool.to_config(),
        );
        pool.start_reaper()?;
        let repository = SqliteChatRepository::open(pool.clone())?;
        Ok(Self {
            repository: Arc::new(repository),
            pool: Some(pool),
        })
    }

    fn close(self) {
        if let Some(pool) = self.pool {
            pool.close();
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let result = match &args.command {
        Some(Command::AddGroup { name, password }) => add_group(&args, name, password).await,
        None => serve(&args).await,
    };
    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(args: &Args) -> Result<(), Box<dyn Error>> {
    let storage = Storage::open(args)?;

    let config = ServerConfig {
        host: args.serve.host.clone(),
        port: args.serve.port,
        workers: args.serve.workers,
        max_frame_len: args.serve.max_frame_len,
    };
    let mut server = Server::new(config, storage.repository.clone(), Arc::new(SystemClock));
    if let Err(e) = server.listen().await {
        storage.close();
        return Err(e.into());
    }
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await;
    server.shutdown().await;
    storage.close();
    Ok(())
}

async fn add_group(args: &Args, name: &str, password: &str) -> Result<(), Box<dyn Error>> {
    let group = GroupName::new(name)?;
    let digest = PasswordDigest::new(&password_digest(password))?;

    let storage = Storage::open(args)?;
    let result = async {
        if storage.repository.group_exists(&group).await? {
            return Err(format!("group '{}' already exists", group).into());
        }
        storage.repository.add_group(&group, &digest).await?;
        tracing::info!("Created group '{}'", group);
        Ok::<(), Box<dyn Error>>(())
    }
    .await;
    storage.close();
    result
}
