//! Time-related utilities with clock abstraction for testability.

use chrono::{DateTime, FixedOffset, Local, TimeZone};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Current wall-clock time with its UTC offset
    fn now(&self) -> DateTime<FixedOffset>;
}

/// System clock implementation (uses the local system time)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: DateTime<FixedOffset>,
}

impl FixedClock {
    /// Create a new fixed clock returning the given instant
    pub fn new(fixed_time: DateTime<FixedOffset>) -> Self {
        Self { fixed_time }
    }

    /// Fixed clock at `hour:minute` on 2024-01-01 in UTC, or `None` for an invalid time
    pub fn at(hour: u32, minute: u32) -> Option<Self> {
        let utc = FixedOffset::east_opt(0)?;
        let fixed_time = utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).single()?;
        Some(Self::new(fixed_time))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.fixed_time
    }
}

/// Format a time the way chat messages carry it on the wire (`HH:MM`).
pub fn format_message_time(time: &DateTime<FixedOffset>) -> String {
    time.format("%H:%M").to_string()
}

/// Current message time according to `clock`.
pub fn message_time_now(clock: &dyn Clock) -> String {
    format_message_time(&clock.now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_increasing_times() {
        // テスト項目: SystemClock が呼び出すたびに単調に増加する時刻を返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let first = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let second = clock.now();

        // then (期待する結果):
        assert!(second >= first);
    }

    #[test]
    fn test_fixed_clock_returns_consistent_time() {
        // テスト項目: FixedClock が複数回呼び出しても同じ時刻を返す
        // given (前提条件):
        let clock = FixedClock::at(9, 5).unwrap();

        // when (操作):
        let first = clock.now();
        let second = clock.now();

        // then (期待する結果):
        assert_eq!(first, second);
    }

    #[test]
    fn test_fixed_clock_rejects_invalid_time() {
        // テスト項目: 存在しない時刻では FixedClock を作成できない
        // given (前提条件):

        // when (操作):
        let clock = FixedClock::at(25, 0);

        // then (期待する結果):
        assert!(clock.is_none());
    }

    #[test]
    fn test_message_time_is_zero_padded_hours_and_minutes() {
        // テスト項目: メッセージ時刻が HH:MM 形式でゼロ埋めされる
        // given (前提条件):
        let clock = FixedClock::at(9, 5).unwrap();

        // when (操作):
        let formatted = message_time_now(&clock);

        // then (期待する結果):
        assert_eq!(formatted, "09:05");
    }
}
