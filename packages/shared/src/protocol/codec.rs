//! Length-prefixed JSON codec for tokio.
//!
//! Frame layout: a 4-byte big-endian payload length followed by the payload.
//! A length of `0xFFFF_FFFF` marks a null byte array (as written by Qt-style
//! serializers) and is read as an empty payload.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use super::{Packet, ProtocolError};

/// Size of the length header in bytes
pub const LENGTH_HEADER_LEN: usize = 4;

/// Length value marking a null payload
pub const NULL_FRAME_MARKER: u32 = u32::MAX;

/// Default upper bound for a single incoming payload
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Largest payload the length header can describe
pub const MAX_ENCODED_FRAME_LEN: usize = (NULL_FRAME_MARKER - 1) as usize;

/// Codec turning a byte stream into [`Packet`]s and back.
///
/// `max_frame_len` bounds what the peer may send us. Outgoing frames are only
/// limited by what the length header can hold.
///
/// A complete frame whose payload is not a JSON object is logged and skipped;
/// decoding continues with the next frame in the buffer.
#[derive(Debug, Clone)]
pub struct PacketCodec {
    max_frame_len: usize,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_payload(payload: &[u8]) -> Result<Packet, String> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(Packet::from(map)),
        Ok(_) => Err("top-level value is not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
        loop {
            if src.len() < LENGTH_HEADER_LEN {
                return Ok(None);
            }

            let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
            let payload_len = if declared == NULL_FRAME_MARKER {
                0
            } else {
                declared as usize
            };

            if payload_len > self.max_frame_len {
                return Err(ProtocolError::FrameTooLarge {
                    len: payload_len,
                    max: self.max_frame_len,
                });
            }

            let frame_len = LENGTH_HEADER_LEN + payload_len;
            if src.len() < frame_len {
                src.reserve(frame_len - src.len());
                return Ok(None);
            }

            src.advance(LENGTH_HEADER_LEN);
            let payload = src.split_to(payload_len);

            match parse_payload(&payload) {
                Ok(packet) => return Ok(Some(packet)),
                Err(reason) => {
                    tracing::warn!(
                        "Discarding invalid packet ({}): {}",
                        reason,
                        String::from_utf8_lossy(&payload)
                    );
                }
            }
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let body = serde_json::to_vec(&packet)?;
        let len = u32::try_from(body.len())
            .ok()
            .filter(|len| *len != NULL_FRAME_MARKER)
            .ok_or(ProtocolError::FrameTooLarge {
                len: body.len(),
                max: MAX_ENCODED_FRAME_LEN,
            })?;

        dst.reserve(LENGTH_HEADER_LEN + body.len());
        dst.put_u32(len);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PacketType, field};

    fn frame(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        // テスト項目: フレームが揃うまでパケットを返さない
        // given (前提条件):
        let mut codec = PacketCodec::new();
        let full = frame(br#"{"type":"login"}"#);
        let mut buf = BytesMut::from(&full[..6]);

        // when (操作):
        let partial = codec.decode(&mut buf).unwrap();
        buf.extend_from_slice(&full[6..]);
        let complete = codec.decode(&mut buf).unwrap();

        // then (期待する結果):
        assert!(partial.is_none());
        assert_eq!(complete.unwrap().kind(), Some(PacketType::Login));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_emits_one_packet_per_frame() {
        // テスト項目: 連結された複数フレームから 1 フレームずつパケットが得られる
        // given (前提条件):
        let mut codec = PacketCodec::new();
        let mut buf = frame(br#"{"type":"login"}"#);
        buf.extend_from_slice(&frame(br#"{"type":"register"}"#));

        // when (操作):
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        let third = codec.decode(&mut buf).unwrap();

        // then (期待する結果):
        assert_eq!(first.kind(), Some(PacketType::Login));
        assert_eq!(second.kind(), Some(PacketType::Register));
        assert!(third.is_none());
    }

    #[test]
    fn test_decode_skips_malformed_and_non_object_payloads() {
        // テスト項目: 不正な JSON やオブジェクト以外のペイロードは読み捨てられる
        // given (前提条件):
        let mut codec = PacketCodec::new();
        let mut buf = frame(b"{not json");
        buf.extend_from_slice(&frame(b"[1,2,3]"));
        buf.extend_from_slice(&frame(br#"{"type":"message","text":"hi"}"#));

        // when (操作):
        let packet = codec.decode(&mut buf).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(packet.kind(), Some(PacketType::Message));
        assert_eq!(packet.str_field(field::TEXT), Some("hi"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_null_marker_is_discarded() {
        // テスト項目: null マーカー (0xFFFFFFFF) は空ペイロードとして読み捨てられる
        // given (前提条件):
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(NULL_FRAME_MARKER);

        // when (操作):
        let result = codec.decode(&mut buf).unwrap();

        // then (期待する結果):
        assert!(result.is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        // テスト項目: 上限を超えるフレーム長はエラーになる
        // given (前提条件):
        let mut codec = PacketCodec::with_max_frame_len(8);
        let mut buf = frame(br#"{"type":"login"}"#);

        // when (操作):
        let result = codec.decode(&mut buf);

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { len: 16, max: 8 })
        ));
    }

    #[test]
    fn test_encode_writes_big_endian_length_prefix() {
        // テスト項目: エンコード結果がビッグエンディアンの長さヘッダを持つ
        // given (前提条件):
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();

        // when (操作):
        codec
            .encode(Packet::user_left("alice"), &mut buf)
            .unwrap();

        // then (期待する結果):
        let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(declared, buf.len() - LENGTH_HEADER_LEN);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Packet::user_left("alice"));
    }

    #[test]
    fn test_encode_ignores_decode_limit() {
        // テスト項目: 受信上限を超えるパケットも送信できる
        // given (前提条件):
        let mut codec = PacketCodec::with_max_frame_len(8);
        let mut buf = BytesMut::new();

        // when (操作):
        let result = codec.encode(Packet::user_left("alice"), &mut buf);

        // then (期待する結果):
        assert!(result.is_ok());
        let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert!(declared > codec.max_frame_len());
        assert_eq!(declared, buf.len() - LENGTH_HEADER_LEN);
    }
}
