//! Server execution logic.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use hiroba_shared::time::Clock;
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{config::ServerConfig, domain::ChatRepository};

use super::{dispatcher::Dispatcher, handler::PacketHandler};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server is already listening")]
    AlreadyListening,
}

/// TCP chat server
///
/// # Example
///
/// ```ignore
/// let mut server = Server::new(ServerConfig::default(), repository, Arc::new(SystemClock));
/// let addr = server.listen().await?;
/// shutdown_signal().await;
/// server.shutdown().await;
/// ```
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    handler: Arc<PacketHandler>,
    shutdown: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        repository: Arc<dyn ChatRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(config.ideal_workers()));
        let handler = Arc::new(PacketHandler::new(dispatcher.clone(), repository, clock));
        Self {
            config,
            dispatcher,
            handler,
            shutdown: CancellationToken::new(),
            accept_task: None,
            local_addr: None,
        }
    }

    /// Bind and start accepting in the background
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound; the caller treats this as fatal.
    pub async fn listen(&mut self) -> Result<SocketAddr, ServerError> {
        if self.accept_task.is_some() {
            return Err(ServerError::AlreadyListening);
        }

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        tracing::info!(
            "Chat server listening on {} ({} worker(s) max)",
            local_addr,
            self.dispatcher.ideal_workers()
        );

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            self.dispatcher.clone(),
            self.handler.clone(),
            self.config.max_frame_len,
            self.shutdown.clone(),
        )));
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Signal every session to disconnect, then stop accepting
    pub fn stop(&self) {
        self.dispatcher.stop_all();
        self.shutdown.cancel();
    }

    /// Stop, then wait for the accept loop and every worker to finish
    pub async fn shutdown(mut self) {
        self.stop();

        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Accept loop ended abnormally: {}", e);
            }
        }

        let dispatcher = self.dispatcher.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.join_workers()).await {
            tracing::warn!("Failed to join workers: {}", e);
        }
        tracing::info!("Chat server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    handler: Arc<PacketHandler>,
    max_frame_len: usize,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // the session is re-registered on its worker's reactor
                    let socket = match stream.into_std() {
                        Ok(socket) => socket,
                        Err(e) => {
                            tracing::warn!("Discarding connection from {}: {}", peer, e);
                            continue;
                        }
                    };
                    if dispatcher
                        .attach(socket, peer, handler.clone(), max_frame_len)
                        .is_none()
                    {
                        tracing::warn!("Discarded connection from {}", peer);
                    }
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }
    tracing::info!("Stopped accepting connections");
}
