//! Domain logic for client-side operations.
//!
//! Pure functions deciding what to do with server replies and connection errors.

use hiroba_shared::protocol::{Packet, PacketType, field};

use crate::error::ClientError;

/// Outcome of a request/reply step during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Accepted,
    Rejected(String),
}

/// Interpret `packet` as the reply to a `step` request.
///
/// Returns `None` when the packet is something else (e.g. a broadcast that
/// arrived in between) and the caller should keep waiting.
pub fn reply_outcome(packet: &Packet, step: PacketType) -> Option<ReplyOutcome> {
    if packet.kind() != Some(step) {
        return None;
    }
    match packet.bool_field(field::SUCCESS)? {
        true => Some(ReplyOutcome::Accepted),
        false => Some(ReplyOutcome::Rejected(
            packet
                .str_field(field::REASON)
                .unwrap_or("no reason given")
                .to_string(),
        )),
    }
}

/// Check if the client should exit immediately based on the error type.
///
/// A rejection will be repeated on every retry, so there is no point reconnecting.
pub fn should_exit_immediately(error: &ClientError) -> bool {
    matches!(error, ClientError::Rejected { .. })
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `error` - The client error that occurred
/// * `current_attempt` - The current reconnection attempt count (0-indexed)
/// * `max_attempts` - The maximum number of reconnection attempts allowed
pub fn should_attempt_reconnect(
    error: &ClientError,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    if should_exit_immediately(error) {
        return false;
    }
    current_attempt < max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected() -> ClientError {
        ClientError::Rejected {
            step: PacketType::Login,
            reason: "invalid password".to_string(),
        }
    }

    #[test]
    fn test_reply_outcome_accepted() {
        // テスト項目: 対応する種別の success: true は受理と判定される
        // given (前提条件):
        let packet = Packet::success(PacketType::Login);

        // when (操作):
        let outcome = reply_outcome(&packet, PacketType::Login);

        // then (期待する結果):
        assert_eq!(outcome, Some(ReplyOutcome::Accepted));
    }

    #[test]
    fn test_reply_outcome_rejected_with_reason() {
        // テスト項目: success: false は理由付きの拒否と判定される
        // given (前提条件):
        let packet = Packet::failure(PacketType::ConnectGroup, "invalid password");

        // when (操作):
        let outcome = reply_outcome(&packet, PacketType::ConnectGroup);

        // then (期待する結果):
        assert_eq!(
            outcome,
            Some(ReplyOutcome::Rejected("invalid password".to_string()))
        );
    }

    #[test]
    fn test_reply_outcome_ignores_other_packets() {
        // テスト項目: 別種別のパケットや success を欠くパケットは応答とみなさない
        // given (前提条件):
        let broadcast = Packet::user_joined("bob");
        let no_success = Packet::new(PacketType::Login);

        // when (操作):
        let first = reply_outcome(&broadcast, PacketType::Login);
        let second = reply_outcome(&no_success, PacketType::Login);

        // then (期待する結果):
        assert_eq!(first, None);
        assert_eq!(second, None);
    }

    #[test]
    fn test_should_exit_immediately_on_rejection() {
        // テスト項目: サーバーに拒否された場合、即座に終了すべきと判定される
        // given (前提条件):
        let error = rejected();

        // when (操作):
        let result = should_exit_immediately(&error);

        // then (期待する結果):
        assert!(result);
        assert!(!should_attempt_reconnect(&error, 0, 5));
    }

    #[test]
    fn test_should_attempt_reconnect_within_limit() {
        // テスト項目: 接続断は上限未満なら再接続、上限に達したら再接続しない
        // given (前提条件):
        let error = ClientError::ConnectionClosed;

        // when (操作):
        let first = should_attempt_reconnect(&error, 0, 5);
        let last = should_attempt_reconnect(&error, 4, 5);
        let exhausted = should_attempt_reconnect(&error, 5, 5);

        // then (期待する結果):
        assert!(first);
        assert!(last);
        assert!(!exhausted);
    }
}
