//! Code shared between the Hiroba chat server and its terminal client.
//!
//! - `protocol`: packet model and the length-prefixed JSON wire codec
//! - `digest`: client-side password digest
//! - `time`: clock abstraction used to stamp chat messages
//! - `logger`: tracing subscriber setup for the binaries

pub mod digest;
pub mod logger;
pub mod protocol;
pub mod time;
