//! Quota accounting windows.
//!
//! Window identity is a pure function of the clock reading: a minute window is
//! the UTC timestamp truncated to the minute, a day window is the calendar date
//! in a fixed reference timezone. Skew between callers is not compensated.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Minute,
    Day,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Day => "day",
        }
    }

    /// Retry hint handed to callers that exhausted this window.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Day => 3600,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete accounting period, e.g. `day/2026-10-19` or
/// `minute/2026-10-19T08:41`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub window: Window,
    pub bucket: String,
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.window, self.bucket)
    }
}

/// Maps clock readings onto window keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowClock {
    reference: FixedOffset,
}

impl Default for WindowClock {
    fn default() -> Self {
        Self {
            reference: Utc.fix(),
        }
    }
}

impl WindowClock {
    /// `None` when the offset is outside +/- 24h.
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|reference| Self { reference })
    }

    pub fn key(&self, window: Window, now: DateTime<Utc>) -> WindowKey {
        let bucket = match window {
            Window::Minute => now
                .with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now)
                .format("%Y-%m-%dT%H:%M")
                .to_string(),
            Window::Day => now
                .with_timezone(&self.reference)
                .date_naive()
                .format("%Y-%m-%d")
                .to_string(),
        };
        WindowKey { window, bucket }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_minute_truncation() {
        let clock = WindowClock::default();
        // 2023-11-14T22:13:20Z
        let t = at(1_700_000_000);
        let k = clock.key(Window::Minute, t);
        assert_eq!(k.bucket, "2023-11-14T22:13");
        assert_eq!(clock.key(Window::Minute, at(1_700_000_039)), k);
        assert_ne!(clock.key(Window::Minute, at(1_700_000_040)), k);
    }

    #[test]
    fn test_day_uses_reference_offset() {
        // 2023-11-14T22:13:20Z is already the 15th at UTC+02:00
        let t = at(1_700_000_000);
        assert_eq!(WindowClock::default().key(Window::Day, t).bucket, "2023-11-14");
        let plus_two = WindowClock::with_offset_minutes(120).unwrap();
        assert_eq!(plus_two.key(Window::Day, t).bucket, "2023-11-15");
    }

    #[test]
    fn test_offset_out_of_range_rejected() {
        assert!(WindowClock::with_offset_minutes(24 * 60).is_none());
        assert!(WindowClock::with_offset_minutes(i32::MAX).is_none());
        assert!(WindowClock::with_offset_minutes(-330).is_some());
    }

    #[test]
    fn test_key_display() {
        let k = WindowClock::default().key(Window::Day, at(0));
        assert_eq!(k.to_string(), "day/1970-01-01");
    }
}
