//! UI layer: TCP server, dispatcher, worker contexts, sessions and the protocol handler.

pub mod dispatcher;
pub mod handler;
pub mod server;
pub mod session;
pub mod signal;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use handler::PacketHandler;
pub use server::{Server, ServerError};
pub use session::{SessionCommand, SessionEvent, SessionHandle};
pub use signal::shutdown_signal;
