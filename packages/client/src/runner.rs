//! Client execution logic with reconnection support.

use std::time::Duration;

use crate::{
    domain::{should_attempt_reconnect, should_exit_immediately},
    error::ClientError,
    session::run_client_session,
};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Connection and identity settings for one client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// `host:port` of the chat server
    pub addr: String,
    pub username: String,
    /// Plaintext; only its digest is sent
    pub password: String,
    pub group: String,
    pub group_password: String,
    /// Register the user before the first login
    pub register: bool,
}

/// Run the chat client with reconnection logic
///
/// Registration is attempted on the first connection only; reconnects log in again
/// and rejoin the same group.
pub async fn run_client(options: ClientOptions) -> Result<(), ClientError> {
    let mut reconnect_count = 0;
    let mut register = options.register;

    loop {
        tracing::info!(
            "Attempting to connect to {} as '{}' (attempt {}/{})",
            options.addr,
            options.username,
            reconnect_count + 1,
            MAX_RECONNECT_ATTEMPTS
        );

        let error = match run_client_session(&options, &mut register).await {
            Ok(()) => {
                tracing::info!("Client session ended normally");
                return Ok(());
            }
            Err(e) => e,
        };

        if should_exit_immediately(&error) {
            return Err(error);
        }

        tracing::warn!("Connection lost: {}", error);
        reconnect_count += 1;
        if !should_attempt_reconnect(&error, reconnect_count, MAX_RECONNECT_ATTEMPTS) {
            tracing::error!(
                "Failed to reconnect after {} attempts. Exiting.",
                MAX_RECONNECT_ATTEMPTS
            );
            return Err(error);
        }

        tracing::info!(
            "Reconnecting in {} seconds... (attempt {}/{})",
            RECONNECT_INTERVAL_SECS,
            reconnect_count + 1,
            MAX_RECONNECT_ATTEMPTS
        );
        tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)).await;
    }
}
