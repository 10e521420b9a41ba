//! Time source and calendar helpers
//!
//! Contract stages are derived from the current time on every call, so the
//! engines consume a [`Clock`] instead of caching "now".

use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Seconds in a day.
pub const DAY: i64 = 86_400;

/// Seconds in a 365-day year.
pub const YEAR: i64 = 365 * DAY;

/// Monotonic current-time query.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and simulations.
///
/// Time never moves backwards: requests to rewind are ignored.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Move the clock forward to `time`. Earlier values are ignored.
    pub fn advance_to(&self, time: Timestamp) {
        self.now.fetch_max(time, Ordering::SeqCst);
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        if seconds > 0 {
            self.now.fetch_add(seconds, Ordering::SeqCst);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Midnight UTC of the given calendar day, `None` for an invalid date.
pub fn utc_midnight(year: i32, month: u32, day: u32) -> Option<Timestamp> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .map(|dt| dt.timestamp())
}

/// The same calendar day in `count` consecutive years starting at `first_year`.
pub fn annual_checkpoints(first_year: i32, month: u32, day: u32, count: usize) -> Vec<Timestamp> {
    (0..count)
        .filter_map(|offset| utc_midnight(first_year + offset as i32, month, day))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_monotonic() {
        let clock = ManualClock::new(100);
        clock.advance_to(50);
        assert_eq!(clock.now(), 100);
        clock.advance_to(200);
        assert_eq!(clock.now(), 200);
        clock.advance(-10);
        assert_eq!(clock.now(), 200);
        clock.advance(DAY);
        assert_eq!(clock.now(), 200 + DAY);
    }

    #[test]
    fn test_utc_midnight() {
        assert_eq!(utc_midnight(2018, 12, 1), Some(1_543_622_400));
        assert_eq!(utc_midnight(2018, 2, 30), None);
    }

    #[test]
    fn test_annual_checkpoints() {
        let times = annual_checkpoints(2018, 12, 1, 5);
        assert_eq!(
            times,
            vec![1_543_622_400, 1_575_158_400, 1_606_780_800, 1_638_316_800, 1_669_852_800]
        );
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
