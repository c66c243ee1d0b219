//! [`RawEvent`] to [`EventRecord`] conversion.
//!
//! The normalizer:
//! 1. Resolves start and end times (structured formats first, then free text)
//! 2. Cleans the title, peeling a trailing "at <place>" into the location
//! 3. Converts HTML descriptions to plain text, keeping the markup aside
//! 4. Assigns a stable id
//! 5. Drops records outside the configured horizon

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use eventfeeds_core::text::{
    clean_title_and_location, collapse_whitespace, decode_entities, looks_like_html, strip_html_to_text,
};
use eventfeeds_core::{EventRecord, EventTime, TimeWindow, parse_datetime, parse_when, resolve_timezone};
use tracing::debug;
use uuid::Uuid;

use crate::raw_event::{RawEvent, RawWhen};

/// Default event length when a source gives no end.
pub const DEFAULT_DURATION_MINUTES: i64 = 120;

/// Turns candidate records into [`EventRecord`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    tz: Tz,
    now: DateTime<Utc>,
    default_duration: Duration,
    window: Option<TimeWindow>,
}

impl Normalizer {
    /// Creates a normalizer interpreting naive times in `tz`.
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            now: Utc::now(),
            default_duration: Duration::minutes(DEFAULT_DURATION_MINUTES),
            window: None,
        }
    }

    /// Sets the reference time for dates given without a year or day.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// Drops records that do not overlap `window`.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    fn timezone_for(&self, raw: &RawEvent) -> Tz {
        match raw.timezone.as_deref() {
            Some(name) => resolve_timezone(name).unwrap_or_else(|| {
                debug!(source = %raw.source, timezone = %name, "unknown timezone hint, using default");
                self.tz
            }),
            None => self.tz,
        }
    }

    /// Parses a start, which may also carry an end ("Oct 3, 6-9pm").
    fn resolve_start(&self, when: &RawWhen, tz: &Tz) -> Option<(EventTime, Option<EventTime>)> {
        match when {
            RawWhen::Parsed(time) => Some((*time, None)),
            RawWhen::Text(text) => parse_datetime(text, tz)
                .map(|t| (t, None))
                .or_else(|| parse_when(text, tz, self.now).map(|w| (w.start, w.end))),
        }
    }

    fn resolve_end(&self, when: &RawWhen, tz: &Tz) -> Option<EventTime> {
        match when {
            RawWhen::Parsed(time) => Some(*time),
            RawWhen::Text(text) => {
                parse_datetime(text, tz).or_else(|| parse_when(text, tz, self.now).map(|w| w.start))
            }
        }
    }

    /// Normalizes one candidate.
    ///
    /// Returns `None` when no start can be parsed or the record falls
    /// outside the horizon.
    pub fn normalize(&self, raw: &RawEvent, priority: i32) -> Option<EventRecord> {
        let tz = self.timezone_for(raw);

        let Some((start, text_end)) = raw.start.as_ref().and_then(|w| self.resolve_start(w, &tz)) else {
            debug!(source = %raw.source, title = ?raw.title, start = ?raw.start, "dropping record without a start");
            return None;
        };
        let end = raw
            .end
            .as_ref()
            .and_then(|w| self.resolve_end(w, &tz))
            .or(text_end)
            .filter(|end| *end > start);

        let source_title = collapse_whitespace(&decode_entities(raw.title.as_deref().unwrap_or_default()));
        let (title, location) = clean_title_and_location(
            &source_title,
            raw.location.as_deref().map(decode_entities).as_deref(),
        );

        let id = match raw.uid.as_deref() {
            Some(uid) => uid.to_string(),
            None => stable_id(raw.link.as_deref(), &title, &start, location.as_deref()),
        };

        let mut record = EventRecord::new(id, title, start, &raw.source)
            .with_source_title(source_title)
            .with_priority(priority);
        if let Some(end) = end {
            record = record.with_end(end);
        }
        if let Some(location) = location {
            record = record.with_location(location);
        }
        if let Some(ref link) = raw.link {
            record = record.with_url(link);
        }
        if let Some(ref description) = raw.description {
            if looks_like_html(description) {
                let text = strip_html_to_text(description);
                if !text.is_empty() {
                    record = record.with_description(text);
                }
                record = record.with_description_html(description);
            } else {
                let text = decode_entities(description).trim().to_string();
                if !text.is_empty() {
                    record = record.with_description(text);
                }
            }
        }

        if let Some(ref window) = self.window {
            let effective_end = record.effective_end(self.default_duration);
            if !window.overlaps_event(&record.start, &effective_end) {
                debug!(source = %record.source, title = %record.title, "outside horizon");
                return None;
            }
        }

        Some(record)
    }

    /// Normalizes every candidate from one source.
    pub fn normalize_all(&self, raws: &[RawEvent], priority: i32) -> Vec<EventRecord> {
        raws.iter().filter_map(|raw| self.normalize(raw, priority)).collect()
    }
}

/// UUIDv5 over the link and start, or the title, start and location.
pub fn stable_id(link: Option<&str>, title: &str, start: &EventTime, location: Option<&str>) -> String {
    let start = start.to_utc_datetime().to_rfc3339();
    let key = match link {
        Some(link) => format!("{}|{}", link, start),
        None => format!(
            "{}|{}|{}",
            collapse_whitespace(title).to_lowercase(),
            start,
            location.unwrap_or_default()
        ),
    };
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}
