//! Event types shared by every stage of a run.
//!
//! - [`EventRecord`]: the normalized, source-agnostic event
//! - [`CategoryTag`]: the closed set of feed categories an event can carry

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::EventTime;

/// Title used when a source gives an event no usable title.
pub const UNTITLED: &str = "(untitled)";

/// A category label attached to an event record.
///
/// Each tag corresponds to one output feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryTag {
    Family,
    Adult,
    Recurring,
}

impl CategoryTag {
    /// All tags, in feed order.
    pub const ALL: [CategoryTag; 3] = [Self::Family, Self::Adult, Self::Recurring];

    /// Returns the lowercase name used in configuration and feed file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Adult => "adult",
            Self::Recurring => "recurring",
        }
    }

    /// Returns a human-readable feed title.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Family => "Family Events",
            Self::Adult => "Adult Events",
            Self::Recurring => "Recurring Events",
        }
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for CategoryTag {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "family" => Ok(Self::Family),
            "adult" => Ok(Self::Adult),
            "recurring" => Ok(Self::Recurring),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// A normalized event from any source.
///
/// Created by the normalizer, tagged by the classifier and possibly merged by
/// the deduplicator. `start` is always present; every other field is optional
/// and has a defined fallback when written to a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Stable identifier, written as the iCalendar UID.
    pub id: String,
    /// The event title.
    pub title: String,
    /// Title as the source gave it, when cleaning changed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    /// When the event starts.
    pub start: EventTime,
    /// When the event ends, if the source said.
    pub end: Option<EventTime>,
    /// Free-text venue or address.
    pub location: Option<String>,
    /// Plain-text description.
    pub description: Option<String>,
    /// Original HTML description, when the source supplied markup.
    pub description_html: Option<String>,
    /// Link to the event's page.
    pub url: Option<String>,
    /// Identifier of the source that produced this record.
    pub source: String,
    /// Priority of the producing source; higher wins when merging.
    pub priority: i32,
    /// Category tags assigned by the classifier.
    pub tags: BTreeSet<CategoryTag>,
    /// Every source that contributed to this record, including `source`.
    pub merged_sources: BTreeSet<String>,
}

impl EventRecord {
    /// Creates a record with required fields.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: EventTime,
        source: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let title = title.into();
        let title = if title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            title
        };
        Self {
            id: id.into(),
            title,
            source_title: None,
            start,
            end: None,
            location: None,
            description: None,
            description_html: None,
            url: None,
            merged_sources: BTreeSet::from([source.clone()]),
            source,
            priority: 0,
            tags: BTreeSet::new(),
        }
    }

    /// Returns true if this is an all-day event.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Returns the end time, falling back to `start + default_duration`.
    ///
    /// An end that is not after the start is ignored.
    pub fn effective_end(&self, default_duration: Duration) -> EventTime {
        match self.end {
            Some(end) if end > self.start => end,
            _ => self.start.plus(default_duration),
        }
    }

    /// Title and description joined, as seen by the classifier.
    ///
    /// Uses the source's own title so words peeled into the location
    /// still count.
    pub fn classification_text(&self) -> String {
        let title = self.source_title.as_deref().unwrap_or(&self.title);
        match self.description.as_deref() {
            Some(desc) if !desc.is_empty() => format!("{} {}", title, desc),
            _ => title.to_string(),
        }
    }

    /// Counts the optional fields that are filled in.
    pub fn completeness(&self) -> usize {
        [
            self.end.is_some(),
            self.location.is_some(),
            self.description.is_some(),
            self.url.is_some(),
            self.start.is_datetime(),
            self.title != UNTITLED,
        ]
        .into_iter()
        .filter(|filled| *filled)
        .count()
    }

    /// Returns true if the record carries `tag`.
    pub fn has_tag(&self, tag: CategoryTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Builder method to set the end time.
    pub fn with_end(mut self, end: EventTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to record the uncleaned source title.
    ///
    /// Ignored when it matches the cleaned title.
    pub fn with_source_title(mut self, source_title: impl Into<String>) -> Self {
        let source_title = source_title.into();
        let source_title = source_title.trim();
        if !source_title.is_empty() && source_title != self.title {
            self.source_title = Some(source_title.to_string());
        }
        self
    }

    /// Builder method to set the plain-text description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder method to set the HTML description.
    pub fn with_description_html(mut self, html: impl Into<String>) -> Self {
        self.description_html = Some(html.into());
        self
    }

    /// Builder method to set the event URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Builder method to set the source priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to add a tag.
    pub fn with_tag(mut self, tag: CategoryTag) -> Self {
        self.tags.insert(tag);
        self
    }
}
