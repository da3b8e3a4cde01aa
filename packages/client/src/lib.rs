//! Terminal client for the Hiroba chat server.
//!
//! Logs in, joins one group and then relays lines typed at the prompt as chat
//! messages while printing whatever the server pushes.

mod domain;
pub mod error;
mod formatter;
mod runner;
mod session;
mod ui;

pub use error::ClientError;
pub use runner::{ClientOptions, run_client};
pub use session::MAX_SERVER_FRAME_LEN;
