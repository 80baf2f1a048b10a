//! Task lifecycle timestamp normalization.
//!
//! The scheduler reports lifecycle instants in several shapes depending on
//! which API path produced them: structured SDK datetimes, ISO-8601 strings
//! with a numeric offset or `Z` suffix, naive space-separated strings, or the
//! literal `"null"`. Everything is normalized to integer epoch milliseconds;
//! anything missing or unparseable degrades to `None` rather than an error,
//! and absence propagates into the derived durations.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

/// Parse one textual instant to epoch milliseconds.
///
/// Tries the permissive offset-aware parsers first, then falls back to a
/// fixed-width prefix parse (date, time, up to six fractional digits).
/// The fallback discards any offset suffix the permissive parsers rejected
/// and interprets the wall-clock fields as UTC, so mixed-offset inputs that
/// land on it are shifted relative to each other.
pub fn parse_instant_ms(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() || s == "null" {
        return None;
    }

    // RFC 3339 covers `2025-09-18T01:41:57.128000+08:00` and the `Z` suffix.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }

    // Space-separated variant carrying an explicit offset.
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.timestamp_millis());
    }

    // Fixed-width fallback, offset suffix (if any) discarded.
    let prefix: String = s.chars().take(26).collect();
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&prefix, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }

    None
}

/// An instant as it appears in scheduler JSON output: either an already
/// structured epoch value (seconds, possibly fractional) or a textual
/// timestamp in one of the supported encodings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawInstant {
    Seconds(f64),
    Text(String),
}

impl RawInstant {
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            RawInstant::Seconds(s) => Some((s * 1000.0) as i64),
            RawInstant::Text(s) => parse_instant_ms(s),
        }
    }
}

/// One task's lifecycle record, in epoch milliseconds.
///
/// `pull_started`/`pull_stopped` are only reported when an image pull
/// actually happened; a pre-cached image legitimately leaves them absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskTimestamps {
    pub created: Option<i64>,
    pub started: Option<i64>,
    pub pull_started: Option<i64>,
    pub pull_stopped: Option<i64>,
}

impl TaskTimestamps {
    pub fn from_strings(
        created: Option<&str>,
        started: Option<&str>,
        pull_started: Option<&str>,
        pull_stopped: Option<&str>,
    ) -> Self {
        Self {
            created: created.and_then(parse_instant_ms),
            started: started.and_then(parse_instant_ms),
            pull_started: pull_started.and_then(parse_instant_ms),
            pull_stopped: pull_stopped.and_then(parse_instant_ms),
        }
    }

    /// Derive the duration metrics. Pure; no clamping is applied, so a
    /// negative `prepare_ms` is preserved if the source data produces one.
    pub fn durations(&self) -> DurationMetrics {
        let total_ms = match (self.created, self.started) {
            (Some(created), Some(started)) => Some(started - created),
            _ => None,
        };
        let pull_ms = match (self.pull_started, self.pull_stopped) {
            (Some(started), Some(stopped)) => Some(stopped - started),
            _ => None,
        };
        let prepare_ms = match (total_ms, pull_ms) {
            (Some(total), Some(pull)) => Some(total - pull),
            _ => None,
        };
        DurationMetrics {
            total_ms,
            pull_ms,
            prepare_ms,
        }
    }
}

/// Durations derived from one [`TaskTimestamps`], each absent whenever an
/// operand was absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DurationMetrics {
    pub total_ms: Option<i64>,
    pub pull_ms: Option<i64>,
    pub prepare_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn utc_ms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .timestamp_millis()
            + i64::from(ms)
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let got = parse_instant_ms("2025-09-18T01:41:57.128000+08:00").unwrap();
        assert_eq!(got, utc_ms(2025, 9, 17, 17, 41, 57, 128));
    }

    #[test]
    fn parses_rfc3339_zulu() {
        let got = parse_instant_ms("2025-09-18T01:41:57.128Z").unwrap();
        assert_eq!(got, utc_ms(2025, 9, 18, 1, 41, 57, 128));
    }

    #[test]
    fn parses_space_separated_with_offset() {
        let with_space = parse_instant_ms("2025-09-18 01:41:57.128000+08:00").unwrap();
        let with_t = parse_instant_ms("2025-09-18T01:41:57.128000+08:00").unwrap();
        assert_eq!(with_space, with_t);
    }

    #[test]
    fn parses_naive_space_separated() {
        let got = parse_instant_ms("2025-09-18 01:41:57.128").unwrap();
        assert_eq!(got, utc_ms(2025, 9, 18, 1, 41, 57, 128));
    }

    #[test]
    fn null_and_empty_are_absent() {
        assert_eq!(parse_instant_ms("null"), None);
        assert_eq!(parse_instant_ms(""), None);
        assert_eq!(parse_instant_ms("   "), None);
    }

    #[test]
    fn garbage_is_absent_not_an_error() {
        assert_eq!(parse_instant_ms("yesterday-ish"), None);
        assert_eq!(parse_instant_ms("2025-99-99T99:99:99"), None);
    }

    // Pins the documented gap: an offset the permissive parsers reject is
    // discarded by the fixed-width fallback, so the value reads as UTC
    // wall-clock time rather than the instant the offset described.
    #[test]
    fn fallback_discards_offset() {
        let got = parse_instant_ms("2025-09-18T01:41:57.128000+0800").unwrap();
        assert_eq!(got, utc_ms(2025, 9, 18, 1, 41, 57, 128));
    }

    #[test]
    fn round_trip_offset_encodings_agree() {
        let instant = utc_ms(2025, 9, 18, 1, 0, 2, 500);
        for encoded in [
            "2025-09-18T01:00:02.500+00:00",
            "2025-09-18T01:00:02.500Z",
            "2025-09-18T09:00:02.500+08:00",
            "2025-09-18 01:00:02.500+00:00",
        ] {
            assert_eq!(parse_instant_ms(encoded), Some(instant), "{encoded}");
        }
    }

    #[test]
    fn raw_instant_seconds_and_text() {
        assert_eq!(
            RawInstant::Seconds(1_700_000_000.5).to_millis(),
            Some(1_700_000_000_500)
        );
        assert_eq!(
            RawInstant::Text("2025-09-18T01:41:57.128Z".into()).to_millis(),
            Some(utc_ms(2025, 9, 18, 1, 41, 57, 128))
        );
        assert_eq!(RawInstant::Text("null".into()).to_millis(), None);
    }

    #[test]
    fn derives_all_three_durations() {
        let ts = TaskTimestamps::from_strings(
            Some("2025-09-18T01:00:00.000+00:00"),
            Some("2025-09-18T01:00:02.500+00:00"),
            Some("2025-09-18T01:00:00.500+00:00"),
            Some("2025-09-18T01:00:02.000+00:00"),
        );
        let d = ts.durations();
        assert_eq!(d.total_ms, Some(2500));
        assert_eq!(d.pull_ms, Some(1500));
        assert_eq!(d.prepare_ms, Some(1000));
    }

    #[test]
    fn cached_image_leaves_pull_and_prepare_absent() {
        let ts = TaskTimestamps::from_strings(
            Some("2025-09-18T01:00:00.000Z"),
            Some("2025-09-18T01:00:02.500Z"),
            None,
            Some("null"),
        );
        let d = ts.durations();
        assert_eq!(d.total_ms, Some(2500));
        assert_eq!(d.pull_ms, None);
        assert_eq!(d.prepare_ms, None);
    }

    #[test]
    fn missing_started_leaves_total_absent() {
        let ts = TaskTimestamps {
            created: Some(1_000),
            started: None,
            pull_started: Some(1_100),
            pull_stopped: Some(1_600),
        };
        let d = ts.durations();
        assert_eq!(d.total_ms, None);
        assert_eq!(d.pull_ms, Some(500));
        assert_eq!(d.prepare_ms, None);
    }

    // Epoch-zero instants are present values, not "missing".
    #[test]
    fn epoch_zero_counts_as_present() {
        let ts = TaskTimestamps {
            created: Some(0),
            started: Some(1_000),
            ..Default::default()
        };
        assert_eq!(ts.durations().total_ms, Some(1000));
    }

    // The derivation performs no clamping; pull longer than total yields a
    // negative prepare.
    #[test]
    fn negative_prepare_is_preserved() {
        let ts = TaskTimestamps {
            created: Some(10_000),
            started: Some(12_000),
            pull_started: Some(9_000),
            pull_stopped: Some(12_500),
        };
        let d = ts.durations();
        assert_eq!(d.total_ms, Some(2000));
        assert_eq!(d.pull_ms, Some(3500));
        assert_eq!(d.prepare_ms, Some(-1500));
    }
}
