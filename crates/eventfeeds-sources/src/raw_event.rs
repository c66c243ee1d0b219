//! Raw documents and candidate records produced by source adapters.
//!
//! A [`RawDocument`] is a fetched body and lives only until its extractor
//! has run. A [`RawEvent`] is the candidate record an extractor emits; the
//! normalizer turns it into an [`EventRecord`](eventfeeds_core::EventRecord).

use chrono::{DateTime, Utc};
use eventfeeds_core::EventTime;
use serde::{Deserialize, Serialize};

/// A fetched page, feed or API response.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Id of the source the document was fetched for.
    pub source_id: String,
    /// The URL that was requested.
    pub url: String,
    /// The decoded body.
    pub body: String,
    /// When the body was fetched from the network.
    pub fetched_at: DateTime<Utc>,
    /// The server answered 304 and `body` is the cached copy.
    pub not_modified: bool,
    /// The cached copy was fresh enough that no request was made.
    pub from_cache: bool,
}

impl RawDocument {
    /// Creates a document freshly fetched from the network.
    pub fn new(source_id: impl Into<String>, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            body: body.into(),
            fetched_at: Utc::now(),
            not_modified: false,
            from_cache: false,
        }
    }

    /// Returns true when the body came out of the cache store.
    pub fn is_cached(&self) -> bool {
        self.not_modified || self.from_cache
    }
}

/// A start or end time as the source gave it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RawWhen {
    /// Already parsed by the extractor (ICS properties, API timestamps).
    Parsed(EventTime),
    /// Text still to be parsed by the normalizer.
    Text(String),
}

impl RawWhen {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

impl From<EventTime> for RawWhen {
    fn from(t: EventTime) -> Self {
        Self::Parsed(t)
    }
}

/// A candidate event record, before normalization.
///
/// Every field except `source` is optional. Builder methods ignore blank
/// strings so extractors can pass scraped text through unconditionally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Identifier the source assigned, such as an iCalendar UID.
    pub uid: Option<String>,
    pub title: Option<String>,
    pub start: Option<RawWhen>,
    pub end: Option<RawWhen>,
    pub location: Option<String>,
    /// Description as scraped; may contain HTML.
    pub description: Option<String>,
    /// Link to the event's own page.
    pub link: Option<String>,
    /// IANA timezone for naive times, when the source declared one.
    pub timezone: Option<String>,
    /// Id of the configured source.
    pub source: String,
}

fn non_blank(s: impl Into<String>) -> Option<String> {
    let s = s.into();
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}

impl RawEvent {
    /// Creates an empty candidate for `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = non_blank(uid);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = non_blank(title);
        self
    }

    pub fn with_start(mut self, start: impl Into<RawWhen>) -> Self {
        self.start = Some(start.into());
        self
    }

    /// Sets the start from text; blank text leaves it unset.
    pub fn with_start_text(mut self, text: impl Into<String>) -> Self {
        self.start = non_blank(text).map(RawWhen::Text);
        self
    }

    pub fn with_end(mut self, end: impl Into<RawWhen>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn with_end_text(mut self, text: impl Into<String>) -> Self {
        self.end = non_blank(text).map(RawWhen::Text);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = non_blank(location);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = non_blank(description);
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = non_blank(link);
        self
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = non_blank(tz);
        self
    }

    /// Fills the link only when the extractor found none.
    pub fn or_link(mut self, link: &str) -> Self {
        if self.link.is_none() {
            self.link = non_blank(link);
        }
        self
    }

    /// Returns true when the candidate carries a title.
    pub fn has_title(&self) -> bool {
        self.title.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn builders_skip_blank_values() {
        let raw = RawEvent::new("library")
            .with_title("  Story Time ")
            .with_location("   ")
            .with_start_text("")
            .with_link("https://example.org/e/1");

        assert_eq!(raw.title.as_deref(), Some("Story Time"));
        assert_eq!(raw.location, None);
        assert_eq!(raw.start, None);
        assert_eq!(raw.source, "library");
        assert!(raw.has_title());
    }

    #[test]
    fn or_link_keeps_existing() {
        let raw = RawEvent::new("src")
            .with_link("https://a.example/1")
            .or_link("https://b.example/page");
        assert_eq!(raw.link.as_deref(), Some("https://a.example/1"));

        let raw = RawEvent::new("src").or_link("https://b.example/page");
        assert_eq!(raw.link.as_deref(), Some("https://b.example/page"));
    }

    #[test]
    fn parsed_start_from_event_time() {
        let day = NaiveDate::from_ymd_opt(2025, 10, 4).unwrap();
        let raw = RawEvent::new("src").with_start(EventTime::from_date(day));
        assert_eq!(raw.start, Some(RawWhen::Parsed(EventTime::from_date(day))));
    }

    #[test]
    fn document_cache_flags() {
        let mut doc = RawDocument::new("src", "https://example.org", "body");
        assert!(!doc.is_cached());
        doc.not_modified = true;
        assert!(doc.is_cached());
    }
}
