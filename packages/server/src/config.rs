//! Server configuration.

use std::{num::NonZeroUsize, thread};

use hiroba_shared::protocol::DEFAULT_MAX_FRAME_LEN;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 30000;

/// Listening and worker settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on worker threads; `None` uses the hardware thread count
    pub workers: Option<usize>,
    /// Largest accepted frame payload in bytes
    pub max_frame_len: usize,
}

impl ServerConfig {
    /// Ideal number of worker contexts (at least 1)
    pub fn ideal_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .max(1)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            workers: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
