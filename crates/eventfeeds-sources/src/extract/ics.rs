//! iCalendar (RFC 5545) feeds.
//!
//! Feeds are parsed with `icalendar` first. Real-world feeds are often
//! slightly broken, so when the strict parser rejects a document (or finds
//! no events in one that clearly has some) a tolerant line scanner takes
//! over.

use std::sync::LazyLock;

use eventfeeds_core::text::unescape_ics_text;
use eventfeeds_core::{EventTime, resolve_timezone};
use icalendar::{Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike};
use regex::Regex;
use tracing::{debug, warn};

use super::resolve_url;
use crate::raw_event::{RawEvent, RawWhen};

static CALENDAR_TZ_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^X-WR-TIMEZONE(?:;[^:\r\n]*)?:([^\r\n]+)").expect("Invalid X-WR-TIMEZONE regex")
});

/// Parses an ICS document into candidate records.
///
/// `feed_url` resolves relative `URL` properties.
pub fn parse_ics(ics: &str, source: &str, feed_url: &str) -> Vec<RawEvent> {
    let calendar_tz = CALENDAR_TZ_REGEX
        .captures(ics)
        .map(|caps| caps[1].trim().to_string());

    match ics.parse::<Calendar>() {
        Ok(calendar) => {
            let events: Vec<RawEvent> = calendar
                .iter()
                .filter_map(|component| match component {
                    CalendarComponent::Event(event) => {
                        parse_event(event, source, feed_url, calendar_tz.as_deref())
                    }
                    _ => None,
                })
                .collect();
            if events.is_empty() && ics.contains("BEGIN:VEVENT") {
                debug!(source = %source, "strict ICS parse found no events, scanning lines");
                return parse_ics_lenient(ics, source, feed_url);
            }
            events
        }
        Err(e) => {
            warn!(source = %source, error = %e, "ICS rejected by strict parser, scanning lines");
            parse_ics_lenient(ics, source, feed_url)
        }
    }
}

fn clean_text(value: &str) -> String {
    if value.contains('\\') {
        unescape_ics_text(value)
    } else {
        value.to_string()
    }
}

fn parse_event(event: &Event, source: &str, feed_url: &str, calendar_tz: Option<&str>) -> Option<RawEvent> {
    let start = event.get_start()?;

    let mut raw = RawEvent::new(source).with_start(convert_date_time(start));
    if let Some(end) = event.get_end() {
        raw = raw.with_end(convert_date_time(end));
    }

    if let Some(uid) = event.get_uid() {
        raw = raw.with_uid(uid);
    }
    if let Some(summary) = event.get_summary() {
        raw = raw.with_title(clean_text(summary));
    }
    if let Some(description) = event
        .get_description()
        .or_else(|| event.property_value("X-ALT-DESC"))
    {
        raw = raw.with_description(clean_text(description));
    }
    if let Some(location) = event.get_location() {
        raw = raw.with_location(clean_text(location));
    }
    if let Some(link) = event
        .property_value("URL")
        .and_then(|href| resolve_url(feed_url, href))
    {
        raw = raw.with_link(link);
    }
    if let Some(tz) = calendar_tz {
        raw = raw.with_timezone(tz);
    }

    debug!(uid = ?raw.uid, title = ?raw.title, start = ?raw.start, "parsed ICS event");
    Some(raw)
}

/// Converts an ICS time; floating and unresolvable-zone times stay text so
/// the normalizer can place them in the right zone.
fn convert_date_time(dt: DatePerhapsTime) -> RawWhen {
    match dt {
        DatePerhapsTime::Date(date) => RawWhen::Parsed(EventTime::from_date(date)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => RawWhen::Parsed(EventTime::from_utc(dt)),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            RawWhen::text(naive.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            match resolve_timezone(tzid.trim_matches('"')) {
                Some(tz) => RawWhen::Parsed(EventTime::from_naive(date_time, &tz)),
                None => RawWhen::text(date_time.format("%Y-%m-%dT%H:%M:%S").to_string()),
            }
        }
    }
}

/// Joins folded continuation lines (RFC 5545 section 3.1).
fn unfold(ics: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in ics.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix([' ', '\t'])
            && let Some(last) = lines.last_mut()
        {
            last.push_str(rest);
            continue;
        }
        lines.push(line.to_string());
    }
    lines
}

/// A content line split into name, parameters and value.
struct ContentLine<'a> {
    name: &'a str,
    params: Vec<(&'a str, &'a str)>,
    value: &'a str,
}

impl<'a> ContentLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let (head, value) = line.split_once(':')?;
        let mut parts = head.split(';');
        let name = parts.next()?.trim();
        let params = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim().trim_matches('"')))
            .collect();
        Some(Self { name, params, value })
    }

    fn param(&self, key: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }
}

/// Scans VEVENT blocks line by line, tolerating structural errors.
pub fn parse_ics_lenient(ics: &str, source: &str, feed_url: &str) -> Vec<RawEvent> {
    let calendar_tz = CALENDAR_TZ_REGEX
        .captures(ics)
        .map(|caps| caps[1].trim().to_string());

    let mut events = Vec::new();
    let mut current: Option<RawEvent> = None;

    for line in unfold(ics) {
        let upper = line.trim().to_ascii_uppercase();
        if upper == "BEGIN:VEVENT" {
            current = Some(RawEvent::new(source));
            continue;
        }
        if upper == "END:VEVENT" {
            if let Some(mut raw) = current.take()
                && raw.start.is_some()
            {
                if raw.timezone.is_none()
                    && let Some(ref tz) = calendar_tz
                {
                    raw = raw.with_timezone(tz.clone());
                }
                events.push(raw);
            }
            continue;
        }
        let Some(raw) = current.as_mut() else {
            continue;
        };
        let Some(content) = ContentLine::parse(&line) else {
            continue;
        };

        let value = clean_text(content.value);
        let taken = std::mem::take(raw);
        *raw = match content.name.to_ascii_uppercase().as_str() {
            "UID" => taken.with_uid(value),
            "SUMMARY" => taken.with_title(value),
            "LOCATION" => taken.with_location(value),
            "DESCRIPTION" => taken.with_description(value),
            "URL" => match resolve_url(feed_url, &value) {
                Some(link) => taken.with_link(link),
                None => taken,
            },
            "DTSTART" | "DTEND" => {
                let is_start = content.name.eq_ignore_ascii_case("DTSTART");
                let mut updated = if is_start {
                    taken.with_start_text(value)
                } else {
                    taken.with_end_text(value)
                };
                if let Some(tzid) = content.param("TZID")
                    && updated.timezone.is_none()
                {
                    updated = updated.with_timezone(tzid);
                }
                updated
            }
            _ => taken,
        };
    }

    debug!(source = %source, count = events.len(), "scanned ICS lines");
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    const FEED: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//Library//Events//EN\r
X-WR-TIMEZONE:America/New_York\r
BEGIN:VEVENT\r
UID:story-1@library\r
DTSTAMP:20251001T120000Z\r
DTSTART:20251023T140000Z\r
DTEND:20251023T150000Z\r
SUMMARY:Story Time for Toddlers\r
LOCATION:Central Library\\, Room 2\r
DESCRIPTION:Songs\\, rhymes and a craft.\\nAges 1-3.\r
URL:/events/story-1\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:fair-1@library\r
DTSTAMP:20251001T120000Z\r
DTSTART;VALUE=DATE:20251025\r
SUMMARY:Book Fair\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:yoga-1@library\r
DTSTAMP:20251001T120000Z\r
DTSTART;TZID=America/New_York:20251024T180000\r
SUMMARY:Chair Yoga\r
END:VEVENT\r
END:VCALENDAR\r
";

    mod strict {
        use super::*;

        #[test]
        fn parses_events() {
            let events = parse_ics(FEED, "library", "https://library.example.org/calendar.ics");
            assert_eq!(events.len(), 3);

            let story = &events[0];
            assert_eq!(story.uid.as_deref(), Some("story-1@library"));
            assert_eq!(story.title.as_deref(), Some("Story Time for Toddlers"));
            assert_eq!(story.location.as_deref(), Some("Central Library, Room 2"));
            assert_eq!(
                story.description.as_deref(),
                Some("Songs, rhymes and a craft.\nAges 1-3.")
            );
            assert_eq!(
                story.link.as_deref(),
                Some("https://library.example.org/events/story-1")
            );
            assert_eq!(
                story.start,
                Some(RawWhen::Parsed(EventTime::from_utc(
                    Utc.with_ymd_and_hms(2025, 10, 23, 14, 0, 0).unwrap()
                )))
            );
            assert_eq!(story.source, "library");
        }

        #[test]
        fn all_day_and_zoned_times() {
            let events = parse_ics(FEED, "library", "https://library.example.org/calendar.ics");

            let fair = &events[1];
            assert_eq!(
                fair.start,
                Some(RawWhen::Parsed(EventTime::from_date(
                    NaiveDate::from_ymd_opt(2025, 10, 25).unwrap()
                )))
            );
            assert_eq!(fair.end, None);

            // 18:00 EDT is 22:00 UTC
            let yoga = &events[2];
            assert_eq!(
                yoga.start,
                Some(RawWhen::Parsed(EventTime::from_utc(
                    Utc.with_ymd_and_hms(2025, 10, 24, 22, 0, 0).unwrap()
                )))
            );
            assert_eq!(yoga.timezone.as_deref(), Some("America/New_York"));
        }
    }

    mod lenient {
        use super::*;

        #[test]
        fn unfolds_continuation_lines() {
            let lines = unfold("SUMMARY:Fall\r\n  Festival\r\nEND:VEVENT");
            assert_eq!(lines, vec!["SUMMARY:Fall Festival", "END:VEVENT"]);
        }

        #[test]
        fn scans_broken_calendar() {
            // no END:VCALENDAR and a stray line the strict parser rejects
            let broken = "BEGIN:VCALENDAR\n\
                garbage line without colon\n\
                BEGIN:VEVENT\n\
                SUMMARY:Downtown Art Walk\n\
                DTSTART;TZID=America/New_York:20251003T170000\n\
                DTEND;TZID=America/New_York:20251003T200000\n\
                LOCATION:Caroline St\n\
                URL:https://art.example/walk\n\
                END:VEVENT\n\
                BEGIN:VEVENT\n\
                SUMMARY:No start, skipped\n\
                END:VEVENT\n";
            let events = parse_ics_lenient(broken, "arts", "https://art.example/feed.ics");
            assert_eq!(events.len(), 1);

            let walk = &events[0];
            assert_eq!(walk.title.as_deref(), Some("Downtown Art Walk"));
            assert_eq!(walk.start, Some(RawWhen::text("20251003T170000")));
            assert_eq!(walk.end, Some(RawWhen::text("20251003T200000")));
            assert_eq!(walk.timezone.as_deref(), Some("America/New_York"));
            assert_eq!(walk.location.as_deref(), Some("Caroline St"));
            assert_eq!(walk.link.as_deref(), Some("https://art.example/walk"));
        }

        #[test]
        fn content_line_params() {
            let line = ContentLine::parse("DTSTART;VALUE=DATE;TZID=\"America/Chicago\":20251003").unwrap();
            assert_eq!(line.name, "DTSTART");
            assert_eq!(line.param("tzid"), Some("America/Chicago"));
            assert_eq!(line.param("VALUE"), Some("DATE"));
            assert_eq!(line.value, "20251003");
        }
    }
}
