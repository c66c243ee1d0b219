//! Time types for event records.
//!
//! This module provides [`EventTime`] for representing event start/end times
//! (which may be either a specific instant or an all-day date), [`TimeWindow`]
//! for the run horizon, and [`parse_datetime`] for the structured date strings
//! found in feeds, APIs and structured page data.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Timezone used for naive times when neither the source nor the
/// configuration names one.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

/// Represents the time of an event.
///
/// - **DateTime**: A specific point in time (stored as UTC)
/// - **AllDay**: A date without a specific time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific datetime, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day event date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a new `EventTime::DateTime` from a UTC datetime.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates a new `EventTime::DateTime` from a datetime in any timezone.
    pub fn from_local<Z: TimeZone>(dt: DateTime<Z>) -> Self {
        Self::DateTime(dt.with_timezone(&Utc))
    }

    /// Creates a new `EventTime::DateTime` from a wall-clock time in `tz`.
    pub fn from_naive(naive: NaiveDateTime, tz: &Tz) -> Self {
        Self::DateTime(localize(naive, tz))
    }

    /// Creates a new `EventTime::AllDay` from a date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns `true` if this is a specific datetime.
    pub fn is_datetime(&self) -> bool {
        matches!(self, Self::DateTime(_))
    }

    /// Converts to a UTC datetime for comparison purposes.
    ///
    /// For all-day events, returns midnight UTC on that date.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    /// Returns the calendar date of this time as seen in `tz`.
    pub fn local_date(&self, tz: &Tz) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.with_timezone(tz).date_naive(),
            Self::AllDay(date) => *date,
        }
    }

    /// Returns the time `duration` later.
    ///
    /// All-day times always advance to the following day, since an all-day
    /// event ends at the start of the next date.
    pub fn plus(&self, duration: Duration) -> Self {
        match self {
            Self::DateTime(dt) => Self::DateTime(*dt + duration),
            Self::AllDay(date) => Self::AllDay(date.succ_opt().unwrap_or(*date)),
        }
    }

    /// Absolute distance between two times.
    pub fn distance(&self, other: &EventTime) -> Duration {
        (self.to_utc_datetime() - other.to_utc_datetime()).abs()
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime()
            .cmp(&other.to_utc_datetime())
            .then_with(|| other.is_all_day().cmp(&self.is_all_day()))
    }
}

/// A time window used to bound which events a run keeps.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window reaching `behind` into the past and `ahead` into the
    /// future of `now`. Signs are ignored.
    pub fn around(now: DateTime<Utc>, behind: Duration, ahead: Duration) -> Self {
        Self {
            start: now - behind.abs(),
            end: now + ahead.abs(),
        }
    }

    /// Checks if a datetime falls within this window.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks if an event with given start and end times overlaps with this window.
    ///
    /// An event overlaps if it starts before the window ends AND ends after the window starts.
    pub fn overlaps_event(&self, event_start: &EventTime, event_end: &EventTime) -> bool {
        let start = event_start.to_utc_datetime();
        let end = event_end.to_utc_datetime();
        start < self.end && end > self.start
    }
}

/// Resolves an IANA timezone name such as `America/New_York`.
pub fn resolve_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Converts a wall-clock time in `tz` to UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times that
/// fall in a DST gap are moved forward by one hour.
pub fn localize(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S",
    "%Y%m%dT%H%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// Parses a structured datetime string.
///
/// Accepts RFC 3339, ISO 8601 with or without an offset, RFC 2822, and the
/// iCalendar basic format (`20251023T190000Z`, `20251023T190000`,
/// `20251023`). Times without an offset are read as wall-clock times in `tz`;
/// bare dates become all-day times.
///
/// Free-text forms like "Sept 27, 6-9pm" are handled by
/// [`crate::when::parse_when`].
pub fn parse_datetime(input: &str, tz: &Tz) -> Option<EventTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(EventTime::from_local(dt));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(EventTime::from_local(dt));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(EventTime::from_local(dt));
    }

    if let Some(body) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        for fmt in ["%Y%m%dT%H%M%S", "%Y-%m-%dT%H:%M:%S", "%Y%m%dT%H%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(body, fmt) {
                return Some(EventTime::from_utc(naive.and_utc()));
            }
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(EventTime::from_naive(naive, tz));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(EventTime::from_date(date));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    mod event_time {
        use super::*;

        #[test]
        fn to_utc_datetime() {
            let dt = utc(2025, 2, 5, 10, 30, 0);
            assert_eq!(EventTime::from_utc(dt).to_utc_datetime(), dt);
            assert_eq!(
                EventTime::from_date(date(2025, 2, 5)).to_utc_datetime(),
                utc(2025, 2, 5, 0, 0, 0)
            );
        }

        #[test]
        fn local_date_uses_timezone() {
            // 02:00 UTC is still the previous evening in New York
            let et = EventTime::from_utc(utc(2025, 10, 24, 2, 0, 0));
            assert_eq!(et.local_date(&DEFAULT_TIMEZONE), date(2025, 10, 23));
            assert_eq!(et.local_date(&chrono_tz::UTC), date(2025, 10, 24));
        }

        #[test]
        fn plus_advances_all_day_by_one_date() {
            let et = EventTime::from_date(date(2025, 12, 31));
            assert_eq!(et.plus(Duration::hours(2)), EventTime::from_date(date(2026, 1, 1)));

            let et = EventTime::from_utc(utc(2025, 2, 5, 10, 0, 0));
            assert_eq!(
                et.plus(Duration::minutes(90)),
                EventTime::from_utc(utc(2025, 2, 5, 11, 30, 0))
            );
        }

        #[test]
        fn ordering() {
            let et1 = EventTime::from_utc(utc(2025, 2, 5, 10, 0, 0));
            let et2 = EventTime::from_utc(utc(2025, 2, 5, 11, 0, 0));
            let et3 = EventTime::from_date(date(2025, 2, 5));
            let midnight = EventTime::from_utc(utc(2025, 2, 5, 0, 0, 0));

            assert!(et3 < et1);
            assert!(et1 < et2);
            assert!(et3 < midnight);
            assert_eq!(et1.distance(&et2), Duration::hours(1));
        }

        #[test]
        fn serde_roundtrip() {
            let et = EventTime::from_utc(utc(2025, 2, 5, 10, 30, 0));
            let json = serde_json::to_string(&et).unwrap();
            let parsed: EventTime = serde_json::from_str(&json).unwrap();
            assert_eq!(et, parsed);
        }
    }

    mod time_window {
        use super::*;

        #[test]
        fn around_now() {
            let now = utc(2025, 2, 5, 12, 0, 0);
            let window = TimeWindow::around(now, Duration::days(1), Duration::days(7));
            assert_eq!(window.start, utc(2025, 2, 4, 12, 0, 0));
            assert_eq!(window.end, utc(2025, 2, 12, 12, 0, 0));
        }

        #[test]
        fn negative_spans_are_flipped() {
            let now = utc(2025, 2, 5, 12, 0, 0);
            let window = TimeWindow::around(now, Duration::days(-1), Duration::days(-2));
            assert_eq!(window.start, utc(2025, 2, 4, 12, 0, 0));
            assert_eq!(window.end, utc(2025, 2, 7, 12, 0, 0));
        }

        #[test]
        fn overlaps_event() {
            let window = TimeWindow::around(utc(2025, 2, 5, 13, 0, 0), Duration::hours(4), Duration::hours(4));

            let start = EventTime::from_utc(utc(2025, 2, 5, 8, 0, 0));
            let end = EventTime::from_utc(utc(2025, 2, 5, 10, 0, 0));
            assert!(window.overlaps_event(&start, &end));

            let start = EventTime::from_utc(utc(2025, 2, 5, 8, 0, 0));
            let end = EventTime::from_utc(utc(2025, 2, 5, 9, 0, 0));
            assert!(!window.overlaps_event(&start, &end));

            let start = EventTime::from_utc(utc(2025, 2, 5, 17, 0, 0));
            let end = EventTime::from_utc(utc(2025, 2, 5, 18, 0, 0));
            assert!(!window.overlaps_event(&start, &end));
            assert!(window.contains(utc(2025, 2, 5, 9, 0, 0)));
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn rfc3339_with_offset() {
            let et = parse_datetime("2025-10-23T19:00:00-04:00", &DEFAULT_TIMEZONE).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 10, 23, 23, 0, 0)));
        }

        #[test]
        fn offset_without_colon() {
            let et = parse_datetime("2025-10-23T19:00:00-0400", &DEFAULT_TIMEZONE).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 10, 23, 23, 0, 0)));
        }

        #[test]
        fn naive_iso_uses_timezone() {
            let et = parse_datetime("2025-10-23T19:00:00", &DEFAULT_TIMEZONE).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 10, 23, 23, 0, 0)));

            let et = parse_datetime("2025-01-15 19:30", &DEFAULT_TIMEZONE).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 1, 16, 0, 30, 0)));
        }

        #[test]
        fn ics_basic_forms() {
            assert_eq!(
                parse_datetime("20250205T143000Z", &DEFAULT_TIMEZONE),
                Some(EventTime::from_utc(utc(2025, 2, 5, 14, 30, 0)))
            );
            assert_eq!(
                parse_datetime("20250205T093000", &DEFAULT_TIMEZONE),
                Some(EventTime::from_utc(utc(2025, 2, 5, 14, 30, 0)))
            );
            assert_eq!(
                parse_datetime("20250210", &DEFAULT_TIMEZONE),
                Some(EventTime::from_date(date(2025, 2, 10)))
            );
        }

        #[test]
        fn rfc2822() {
            let et = parse_datetime("Thu, 23 Oct 2025 19:00:00 +0000", &DEFAULT_TIMEZONE).unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2025, 10, 23, 19, 0, 0)));
        }

        #[test]
        fn bare_date_is_all_day() {
            let et = parse_datetime("2025-10-23", &DEFAULT_TIMEZONE).unwrap();
            assert!(et.is_all_day());
        }

        #[test]
        fn rejects_garbage() {
            assert!(parse_datetime("", &DEFAULT_TIMEZONE).is_none());
            assert!(parse_datetime("next tuesday-ish", &DEFAULT_TIMEZONE).is_none());
        }

        #[test]
        fn dst_gap_moves_forward() {
            let naive = date(2025, 3, 9).and_hms_opt(2, 30, 0).unwrap();
            assert_eq!(localize(naive, &DEFAULT_TIMEZONE), utc(2025, 3, 9, 7, 30, 0));
        }

        #[test]
        fn resolves_iana_names() {
            assert_eq!(resolve_timezone("America/Chicago"), Some(chrono_tz::America::Chicago));
            assert!(resolve_timezone("Mars/Olympus").is_none());
        }
    }
}
