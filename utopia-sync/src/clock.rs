//! Conversions between wall-clock timestamps and elapsed-second durations.
//!
//! Every function takes `now` explicitly so callers (and tests) decide which
//! instant "now" is.

use time::{Duration, OffsetDateTime};

use crate::domain::TimeEntry;

/// Whole seconds elapsed between `start` and `now`.
///
/// A `now` before `start` (clock skew between devices) yields zero rather
/// than a negative duration.
pub fn elapsed_seconds(start: OffsetDateTime, now: OffsetDateTime) -> i64 {
    (now - start).whole_seconds().max(0)
}

/// The instant a stopped entry ended.
pub fn stop_time(start: OffsetDateTime, duration_secs: i64) -> OffsetDateTime {
    start + Duration::seconds(duration_secs)
}

/// Duration of `entry`, counting a running entry up to `now`.
pub fn current_duration(entry: &TimeEntry, now: OffsetDateTime) -> i64 {
    entry
        .duration
        .unwrap_or_else(|| elapsed_seconds(entry.start, now))
}

/// Formats seconds as `H:MM:SS`.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

pub fn display_duration(entry: &TimeEntry, now: OffsetDateTime) -> String {
    format_duration(current_duration(entry, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn elapsed_is_whole_seconds() {
        let start = datetime!(2020-01-01 10:00:00.000 UTC);
        let now = datetime!(2020-01-01 10:05:30.900 UTC);
        assert_eq!(elapsed_seconds(start, now), 330);
    }

    #[test]
    fn elapsed_never_negative() {
        let start = datetime!(2020-01-01 10:00 UTC);
        let now = datetime!(2020-01-01 09:59 UTC);
        assert_eq!(elapsed_seconds(start, now), 0);
    }

    #[test]
    fn stop_time_adds_duration() {
        let start = datetime!(2020-01-01 10:00 UTC);
        assert_eq!(stop_time(start, 90), datetime!(2020-01-01 10:01:30 UTC));
    }

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(59), "0:00:59");
        assert_eq!(format_duration(3661), "1:01:01");
        assert_eq!(format_duration(36_000), "10:00:00");
    }
}
