//! Hiroba terminal chat client with reconnection support.
//!
//! Logs in (optionally registering first), joins a group and sends every line typed
//! at the prompt as a chat message. Rejections from the server end the client;
//! lost connections are retried (max 5 attempts with 5 second interval).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-client -- -u alice -p secret -g general -G grouppass --register
//! cargo run --bin hiroba-client -- -u bob -p secret -g general -G grouppass
//! ```

use clap::Parser;

use hiroba_client::{ClientOptions, run_client};
use hiroba_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hiroba-client")]
#[command(about = "Terminal chat client for the Hiroba TCP chat server", long_about = None)]
struct Args {
    /// Server address
    #[arg(short = 'a', long, default_value = "127.0.0.1:30000")]
    addr: String,

    /// Username to log in as
    #[arg(short = 'u', long)]
    username: String,

    /// Account password
    #[arg(short = 'p', long)]
    password: String,

    /// Group to join
    #[arg(short = 'g', long)]
    group: String,

    /// Group password
    #[arg(short = 'G', long)]
    group_password: String,

    /// Register the account before logging in
    #[arg(short = 'r', long)]
    register: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let options = ClientOptions {
        addr: args.addr,
        username: args.username,
        password: args.password,
        group: args.group,
        group_password: args.group_password,
        register: args.register,
    };

    // Run the client
    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
