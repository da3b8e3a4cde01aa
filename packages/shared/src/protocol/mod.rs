//! Wire protocol.
//!
//! Every packet travels as `[u32 big-endian length][UTF-8 JSON object]`.
//! The JSON object always carries a `type` string; see [`PacketType`] for the vocabulary.

mod codec;
mod error;
mod packet;

pub use codec::{DEFAULT_MAX_FRAME_LEN, LENGTH_HEADER_LEN, NULL_FRAME_MARKER, PacketCodec};
pub use error::ProtocolError;
pub use packet::{HistoryRecord, Packet, PacketType, field};
