//! Time Provider Abstraction
//!
//! All entity timestamps are Unix nanoseconds (`i64`). The [`Clock`] trait lets drivers
//! and the engine read "now" without touching the system clock directly, so retention
//! and relative `range` queries can be tested deterministically.
//!
//! # Examples
//!
//! ```rust
//! use trakhound_core::models::time::{Clock, ManualClock};
//!
//! let clock = ManualClock::new(1_000);
//! clock.advance(500);
//! assert_eq!(clock.now_nanos(), 1_500);
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Source of the current time in Unix nanoseconds
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        now_nanos()
    }
}

/// Manually driven clock
///
/// Shared behind an `Arc`, the same instance can be advanced by a test while drivers
/// read from it.
#[derive(Debug, Default)]
pub struct ManualClock {
    current: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            current: AtomicI64::new(start),
        }
    }

    pub fn set(&self, nanos: i64) {
        self.current.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, nanos: i64) {
        self.current.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Current system time in Unix nanoseconds
pub fn now_nanos() -> i64 {
    to_nanos(Utc::now())
}

pub fn to_nanos(time: DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt()
        .unwrap_or_else(|| time.timestamp().saturating_mul(NANOS_PER_SECOND))
}

pub fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Parse a timestamp literal into Unix nanoseconds
///
/// Accepts RFC 3339 (`2024-03-01T10:00:00Z`), naive date-times (`2024-03-01 10:00:00`),
/// plain dates (`2024-03-01`) and raw integer nanoseconds.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(nanos) = text.parse::<i64>() {
        return Some(nanos);
    }

    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(to_nanos(time.with_timezone(&Utc)));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(text, format) {
            return Some(to_nanos(Utc.from_utc_datetime(&time)));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| to_nanos(Utc.from_utc_datetime(&time)))
}

fn unit_seconds(unit: &str) -> Option<f64> {
    let seconds = match unit {
        "y" | "year" | "years" => 365.0 * 86_400.0,
        "mo" | "month" | "months" => 30.0 * 86_400.0,
        "w" | "week" | "weeks" => 7.0 * 86_400.0,
        "d" | "day" | "days" => 86_400.0,
        "h" | "hr" | "hour" | "hours" => 3_600.0,
        "m" | "min" | "minute" | "minutes" => 60.0,
        "s" | "sec" | "second" | "seconds" => 1.0,
        "ms" | "millisecond" | "milliseconds" => 1e-3,
        "us" | "microsecond" | "microseconds" => 1e-6,
        "ns" | "nanosecond" | "nanoseconds" => 1e-9,
        _ => return None,
    };
    Some(seconds)
}

/// Parse a duration token into nanoseconds
///
/// Numeric input is taken as nanoseconds. Otherwise every `<number><unit>` pair is
/// summed, so `1h 30m` and `90min` are equivalent.
pub fn parse_duration(text: &str) -> Option<i64> {
    let text = text.trim().trim_start_matches('-');
    if text.is_empty() {
        return None;
    }

    if let Ok(nanos) = text.parse::<i64>() {
        return Some(nanos);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut total: f64 = 0.0;
    let mut matched = false;

    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let number_start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        if number_start == i {
            return None;
        }
        let amount: f64 = chars[number_start..i].iter().collect::<String>().parse().ok()?;

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let unit_start = i;
        while i < chars.len() && chars[i].is_ascii_alphabetic() {
            i += 1;
        }
        let unit = chars[unit_start..i].iter().collect::<String>().to_ascii_lowercase();

        total += amount * unit_seconds(&unit)? * NANOS_PER_SECOND as f64;
        matched = true;
    }

    matched.then_some(total as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(10);
        clock.advance(5);
        assert_eq!(clock.now_nanos(), 15);
        clock.set(1);
        assert_eq!(clock.now_nanos(), 1);
    }

    #[test]
    fn test_system_clock_is_close_to_now() {
        let a = SystemClock.now_nanos();
        let b = now_nanos();
        assert!((b - a).abs() < NANOS_PER_SECOND);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let date = parse_timestamp("2024-03-01").unwrap();
        let rfc = parse_timestamp("2024-03-01T00:00:00Z").unwrap();
        let naive = parse_timestamp("2024-03-01 00:00:00").unwrap();
        assert_eq!(date, rfc);
        assert_eq!(date, naive);
        assert_eq!(parse_timestamp("12345"), Some(12345));
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("10s"), Some(10 * NANOS_PER_SECOND));
        assert_eq!(parse_duration("1h 30m"), parse_duration("90min"));
        assert_eq!(parse_duration("2d"), Some(2 * 86_400 * NANOS_PER_SECOND));
        assert_eq!(parse_duration("-1h"), Some(3_600 * NANOS_PER_SECOND));
        assert_eq!(parse_duration("500"), Some(500));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_nanos_round_trip_through_datetime() {
        let nanos = 1_700_000_000_123_456_789;
        assert_eq!(to_nanos(from_nanos(nanos)), nanos);
    }
}
