//! Calendar feed generation.
//!
//! One `.ics` file per [`CategoryTag`] plus an optional combined feed. Files
//! are rewritten on every run; a category with no events still gets a valid
//! empty calendar so subscribers never see a missing file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use eventfeeds_core::{CategoryTag, EventRecord, EventTime};
use icalendar::{Calendar, Component, EventLike, Property, ValueType};
use tracing::{debug, info};

use crate::config::OutputSettings;
use crate::error::{FeedError, FeedResult};

/// Product identifier written to every feed.
pub const PRODID: &str = "-//fxbg-event-feeds//eventfeeds//EN";

/// File name of the combined feed.
pub const COMBINED_FEED: &str = "all.ics";

/// Writes the per-category feeds.
#[derive(Debug, Clone)]
pub struct FeedWriter {
    dir: PathBuf,
    combined: bool,
    calendar_name: String,
    default_duration: Duration,
    dtstamp: DateTime<Utc>,
}

/// One written feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFeed {
    pub path: PathBuf,
    pub events: usize,
}

impl FeedWriter {
    pub fn new(output: &OutputSettings, default_duration: Duration) -> Self {
        Self {
            dir: output.dir.clone(),
            combined: output.combined,
            calendar_name: output.calendar_name.clone(),
            default_duration,
            dtstamp: Utc::now(),
        }
    }

    /// Sets the DTSTAMP written to every event.
    pub fn with_dtstamp(mut self, dtstamp: DateTime<Utc>) -> Self {
        self.dtstamp = dtstamp;
        self
    }

    fn feed_name(&self, label: &str) -> String {
        if self.calendar_name.is_empty() {
            label.to_string()
        } else {
            format!("{}: {}", self.calendar_name, label)
        }
    }

    /// Renders one calendar.
    pub fn render<'a>(&self, name: &str, records: impl IntoIterator<Item = &'a EventRecord>) -> String {
        let mut records: Vec<&EventRecord> = records.into_iter().collect();
        records.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

        let mut cal = Calendar::new();
        cal.append_property(Property::new("X-WR-CALNAME", name));
        for record in records {
            cal.push(self.event_component(record));
        }
        set_prodid(&cal.done().to_string())
    }

    fn event_component(&self, record: &EventRecord) -> icalendar::Event {
        let mut event = icalendar::Event::new();
        event.uid(&record.id);
        event.add_property("DTSTAMP", self.dtstamp.format("%Y%m%dT%H%M%SZ").to_string());
        event.summary(&record.title);

        add_time_property(&mut event, "DTSTART", &record.start);
        add_time_property(&mut event, "DTEND", &record.effective_end(self.default_duration));

        if let Some(ref location) = record.location {
            event.location(location);
        }
        if let Some(ref description) = record.description {
            event.description(description);
        }
        if let Some(ref url) = record.url {
            event.add_property("URL", url);
        }
        for tag in &record.tags {
            event.append_multi_property(Property::new("CATEGORIES", tag.as_str()));
        }
        if let Some(ref html) = record.description_html {
            let mut prop = Property::new("X-ALT-DESC", html);
            prop.add_parameter("FMTTYPE", "text/html");
            event.append_property(prop);
        }
        event.done()
    }

    /// Writes every category feed, plus `all.ics` when enabled.
    pub fn write_all(&self, records: &[EventRecord]) -> FeedResult<Vec<WrittenFeed>> {
        fs::create_dir_all(&self.dir).map_err(|source| FeedError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let mut written = Vec::new();
        for tag in CategoryTag::ALL {
            let members: Vec<&EventRecord> = records.iter().filter(|r| r.has_tag(tag)).collect();
            let content = self.render(&self.feed_name(tag.display_name()), members.iter().copied());
            let path = self.dir.join(format!("{}.ics", tag.as_str()));
            write_atomic(&path, &content)?;
            debug!(path = %path.display(), events = members.len(), "wrote feed");
            written.push(WrittenFeed {
                path,
                events: members.len(),
            });
        }

        if self.combined {
            let content = self.render(&self.feed_name("All Events"), records);
            let path = self.dir.join(COMBINED_FEED);
            write_atomic(&path, &content)?;
            written.push(WrittenFeed {
                path,
                events: records.len(),
            });
        }

        info!(dir = %self.dir.display(), feeds = written.len(), "feeds written");
        Ok(written)
    }
}

/// Adds DTSTART/DTEND: `VALUE=DATE` for all-day times, UTC otherwise.
fn add_time_property(event: &mut icalendar::Event, name: &str, time: &EventTime) {
    match time {
        EventTime::AllDay(date) => {
            let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            event.append_property(prop);
        }
        EventTime::DateTime(dt) => {
            event.add_property(name, dt.format("%Y%m%dT%H%M%SZ").to_string());
        }
    }
}

/// Replaces the library's default PRODID line with ours.
fn set_prodid(ics: &str) -> String {
    let mut out = String::with_capacity(ics.len());
    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            out.push_str("PRODID:");
            out.push_str(PRODID);
        } else {
            out.push_str(line);
        }
        out.push_str("\r\n");
    }
    out
}

fn write_atomic(path: &Path, content: &str) -> FeedResult<()> {
    let temp_path = path.with_extension("ics.tmp");
    fs::write(&temp_path, content).map_err(|source| FeedError::Write {
        path: temp_path.clone(),
        source,
    })?;
    fs::rename(&temp_path, path).map_err(|source| FeedError::Write {
        path: path.to_path_buf(),
        source,
    })
}
