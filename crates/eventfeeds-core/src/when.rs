//! Free-text date and time parsing.
//!
//! Event pages describe times loosely: "Sept 27, 6–9pm", "September 27
//! 7:30pm", "10:00 to 5:00 pm", "Oct 3 - Oct 5". [`parse_when`] turns such
//! text into a start and an optional end, reading wall-clock values in the
//! given timezone and filling a missing date from `now`.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};

use crate::time::EventTime;

static MONTH_DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s+(\d{4})\b)?",
    )
    .expect("Invalid month date regex")
});

static NUMERIC_DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").expect("Invalid numeric date regex")
});

static ISO_DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("Invalid ISO date regex")
});

static TIME_RANGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])?\.?\s?(?:m\b\.?)?\s*(?:-|–|—|\bto\b|\buntil\b|\btill\b)\s*(\d{1,2})(?::(\d{2}))?\s*(?:([ap])\.?\s?m\b\.?)?",
    )
    .expect("Invalid time range regex")
});

static CLOCK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s?m\b\.?").expect("Invalid clock regex")
});

static COLON_TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("Invalid colon time regex"));

static NAMED_TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(noon|midnight)\b").expect("Invalid named time regex"));

/// Dates without a year that fall further than this in the past are read as
/// next year's.
const YEAR_ROLLOVER_DAYS: i64 = 180;

/// The result of parsing a free-text time description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct When {
    /// When the event starts.
    pub start: EventTime,
    /// When the event ends, if the text named an end.
    pub end: Option<EventTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    fn from_capture(c: Option<regex::Match<'_>>) -> Option<Self> {
        match c?.as_str().to_ascii_lowercase().as_str() {
            "a" => Some(Self::Am),
            "p" => Some(Self::Pm),
            _ => None,
        }
    }

    fn flip(self) -> Self {
        match self {
            Self::Am => Self::Pm,
            Self::Pm => Self::Am,
        }
    }
}

/// Parses free text describing when an event happens.
///
/// Returns `None` when the text names neither a date nor a time. A time
/// without a date falls on `now`'s date in `tz`; a date without a time
/// yields an all-day start.
pub fn parse_when(text: &str, tz: &Tz, now: DateTime<Utc>) -> Option<When> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }

    let today = now.with_timezone(tz).date_naive();
    let dates = find_dates(&text, today);
    let remainder = blank_out(&text, dates.iter().map(|(span, _)| span.clone()));
    let times = find_times(&remainder);

    let start_date = dates.first().map(|(_, d)| *d);
    let end_date = dates.get(1).map(|(_, d)| *d).filter(|d| Some(*d) > start_date);

    match (start_date, times) {
        (None, None) => None,
        (Some(date), None) => Some(When {
            start: EventTime::from_date(date),
            end: end_date.map(|d| EventTime::from_date(d).plus(Duration::days(1))),
        }),
        (date, Some((start_time, end_time))) => {
            let date = date.unwrap_or(today);
            let start = EventTime::from_naive(date.and_time(start_time), tz);
            let end = end_time.map(|t| {
                let mut end_day = end_date.unwrap_or(date);
                if end_day == date && t <= start_time {
                    end_day = end_day.succ_opt().unwrap_or(end_day);
                }
                EventTime::from_naive(end_day.and_time(t), tz)
            });
            Some(When { start, end })
        }
    }
}

fn find_dates(text: &str, today: NaiveDate) -> Vec<(Range<usize>, NaiveDate)> {
    let mut found = Vec::new();

    for caps in MONTH_DATE_REGEX.captures_iter(text) {
        let month = month_number(&caps[1]);
        let day = caps[2].parse().ok();
        let year = caps.get(3).and_then(|y| y.as_str().parse().ok());
        if let (Some(month), Some(day)) = (month, day)
            && let Some(date) = build_date(year, month, day, today)
        {
            found.push((span(&caps), date));
        }
    }

    for caps in NUMERIC_DATE_REGEX.captures_iter(text) {
        let month = caps[1].parse().ok();
        let day = caps[2].parse().ok();
        let year = caps.get(3).and_then(|y| {
            let y: i32 = y.as_str().parse().ok()?;
            Some(if y < 100 { 2000 + y } else { y })
        });
        if let (Some(month), Some(day)) = (month, day)
            && let Some(date) = build_date(year, month, day, today)
        {
            found.push((span(&caps), date));
        }
    }

    for caps in ISO_DATE_REGEX.captures_iter(text) {
        let parts = (caps[1].parse().ok(), caps[2].parse().ok(), caps[3].parse().ok());
        if let (Some(y), Some(m), Some(d)) = parts
            && let Some(date) = NaiveDate::from_ymd_opt(y, m, d)
        {
            found.push((span(&caps), date));
        }
    }

    found.sort_by_key(|(span, _)| span.start);
    found
}

fn span(caps: &Captures<'_>) -> Range<usize> {
    caps.get(0).map(|m| m.range()).unwrap_or(0..0)
}

fn build_date(year: Option<i32>, month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(y) => NaiveDate::from_ymd_opt(y, month, day),
        None => {
            let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if (today - date).num_days() > YEAR_ROLLOVER_DAYS {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(date)
            }
        }
    }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn blank_out(text: &str, spans: impl Iterator<Item = Range<usize>>) -> String {
    let mut out = text.to_string();
    for span in spans {
        if let Some(slice) = out.get(span.clone()) {
            let blank = " ".repeat(slice.len());
            out.replace_range(span, &blank);
        }
    }
    out
}

/// Finds a start time and optional end time.
fn find_times(text: &str) -> Option<(NaiveTime, Option<NaiveTime>)> {
    for caps in TIME_RANGE_REGEX.captures_iter(text) {
        if let Some(range) = range_from_captures(&caps) {
            return Some(range);
        }
    }

    if let Some(caps) = CLOCK_REGEX.captures(text) {
        let hour = caps[1].parse().ok()?;
        let minute = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let meridiem = Meridiem::from_capture(caps.get(3));
        return clock(hour, minute, meridiem).map(|t| (t, None));
    }

    if let Some(caps) = COLON_TIME_REGEX.captures(text) {
        let hour = caps[1].parse().ok()?;
        let minute = caps[2].parse().ok()?;
        return clock(hour, minute, None).map(|t| (t, None));
    }

    NAMED_TIME_REGEX.captures(text).map(|caps| {
        let time = if caps[1].eq_ignore_ascii_case("noon") {
            NaiveTime::from_hms_opt(12, 0, 0)
        } else {
            Some(NaiveTime::MIN)
        };
        (time.unwrap_or(NaiveTime::MIN), None)
    })
}

fn range_from_captures(caps: &Captures<'_>) -> Option<(NaiveTime, Option<NaiveTime>)> {
    let start_hour: u32 = caps[1].parse().ok()?;
    let start_minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let end_hour: u32 = caps[4].parse().ok()?;
    let end_minute: u32 = caps.get(5).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let mut start_mer = Meridiem::from_capture(caps.get(3));
    let mut end_mer = Meridiem::from_capture(caps.get(6));

    // "5-12" alone is more likely an age range than a time range
    let has_clock_hint = caps.get(2).is_some()
        || caps.get(5).is_some()
        || start_mer.is_some()
        || end_mer.is_some();
    if !has_clock_hint {
        return None;
    }

    match (start_mer, end_mer) {
        (None, Some(m)) => {
            let end = clock(end_hour, end_minute, Some(m))?;
            let guess = clock(start_hour, start_minute, Some(m))?;
            start_mer = Some(if guess > end { m.flip() } else { m });
        }
        (Some(m), None) if end_hour <= 12 => {
            let start = clock(start_hour, start_minute, Some(m))?;
            let guess = clock(end_hour, end_minute, Some(m))?;
            end_mer = Some(if guess < start { m.flip() } else { m });
        }
        _ => {}
    }

    let start = clock(start_hour, start_minute, start_mer)?;
    let end = clock(end_hour, end_minute, end_mer)?;
    Some((start, Some(end)))
}

fn clock(hour: u32, minute: u32, meridiem: Option<Meridiem>) -> Option<NaiveTime> {
    let hour = match meridiem {
        None => hour,
        Some(_) if !(1..=12).contains(&hour) => return None,
        Some(Meridiem::Am) => hour % 12,
        Some(Meridiem::Pm) => hour % 12 + 12,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}
