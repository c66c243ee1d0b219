//! RSS 2.0 and Atom feeds.
//!
//! Each `<item>` or `<entry>` becomes one candidate. The start time comes
//! from the first of `ev:startdate`, `start_time`, `pubDate`, `published`,
//! `updated`, `dc:date` or `created` that is present.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use super::resolve_url;
use crate::raw_event::RawEvent;

const START_FIELDS: &[&str] = &[
    "startdate",
    "start_time",
    "pubdate",
    "published",
    "updated",
    "date",
    "created",
];

const END_FIELDS: &[&str] = &["enddate", "end_time"];

fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or_default().to_ascii_lowercase()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

/// Parses an RSS or Atom document.
pub fn parse_feed(xml: &str, source: &str, feed_url: &str) -> Vec<RawEvent> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut fields: Option<HashMap<String, String>> = None;
    let mut current_element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "item" | "entry" => fields = Some(HashMap::new()),
                    "link" if fields.is_some() => {
                        store_atom_link(&e, fields.as_mut());
                        current_element = Some(local);
                    }
                    _ if fields.is_some() => current_element = Some(local),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == "link" {
                    store_atom_link(&e, fields.as_mut());
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref());
                if (local == "item" || local == "entry")
                    && let Some(done) = fields.take()
                {
                    items.push(done);
                }
                current_element = None;
            }
            Ok(Event::Text(t)) => {
                if let (Some(map), Some(elem)) = (fields.as_mut(), current_element.as_ref()) {
                    let text = t.unescape().unwrap_or_default().to_string();
                    map.entry(elem.clone()).or_default().push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(map), Some(elem)) = (fields.as_mut(), current_element.as_ref()) {
                    let text = String::from_utf8_lossy(&c.into_inner()).to_string();
                    map.entry(elem.clone()).or_default().push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(source = %source, error = %e, "feed XML error, keeping items read so far");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    let events: Vec<RawEvent> = items
        .into_iter()
        .map(|f| item_to_raw(&f, source, feed_url))
        .filter(RawEvent::has_title)
        .collect();
    debug!(source = %source, count = events.len(), "parsed feed items");
    events
}

fn store_atom_link(e: &BytesStart<'_>, fields: Option<&mut HashMap<String, String>>) {
    let Some(map) = fields else {
        return;
    };
    let rel = attribute(e, "rel");
    if let Some(href) = attribute(e, "href")
        && rel.as_deref().is_none_or(|r| r == "alternate")
    {
        map.entry("link".to_string()).or_insert(href);
    }
}

fn first_of<'a>(fields: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn item_to_raw(fields: &HashMap<String, String>, source: &str, feed_url: &str) -> RawEvent {
    let mut raw = RawEvent::new(source);
    if let Some(title) = first_of(fields, &["title"]) {
        raw = raw.with_title(title);
    }
    if let Some(link) = first_of(fields, &["link"]).and_then(|l| resolve_url(feed_url, l)) {
        raw = raw.with_link(link);
    }
    if let Some(desc) = first_of(fields, &["encoded", "description", "content", "summary"]) {
        raw = raw.with_description(desc);
    }
    if let Some(location) = first_of(fields, &["location"]) {
        raw = raw.with_location(location);
    }
    if let Some(start) = first_of(fields, START_FIELDS) {
        raw = raw.with_start_text(start);
    }
    if let Some(end) = first_of(fields, END_FIELDS) {
        raw = raw.with_end_text(end);
    }
    if let Some(uid) = first_of(fields, &["guid", "id"]) {
        raw = raw.with_uid(uid);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_event::RawWhen;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:ev="http://purl.org/rss/1.0/modules/event/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Downtown Events</title>
    <item>
      <title>First Friday Art Walk</title>
      <link>/events/art-walk</link>
      <guid>art-walk-2025-10</guid>
      <description><![CDATA[<p>Galleries open late &amp; live music.</p>]]></description>
      <pubDate>Mon, 29 Sep 2025 12:00:00 GMT</pubDate>
      <ev:startdate>2025-10-03T17:00:00-04:00</ev:startdate>
      <ev:enddate>2025-10-03T21:00:00-04:00</ev:enddate>
      <ev:location>Caroline Street</ev:location>
    </item>
    <item>
      <title>Farmers Market</title>
      <link>https://downtown.example/market</link>
      <pubDate>Sat, 04 Oct 2025 08:00:00 -0400</pubDate>
    </item>
    <item>
      <description>untitled items are dropped</description>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Library</title>
  <entry>
    <title>Teen Game Night</title>
    <link rel="alternate" href="https://library.example/e/42"/>
    <link rel="enclosure" href="https://library.example/flyer.pdf"/>
    <id>urn:uuid:42</id>
    <published>2025-10-07T22:00:00Z</published>
    <summary>Board games and snacks.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let events = parse_feed(RSS, "downtown", "https://downtown.example/feed");
        assert_eq!(events.len(), 2);

        let walk = &events[0];
        assert_eq!(walk.title.as_deref(), Some("First Friday Art Walk"));
        assert_eq!(walk.link.as_deref(), Some("https://downtown.example/events/art-walk"));
        assert_eq!(walk.uid.as_deref(), Some("art-walk-2025-10"));
        assert_eq!(walk.start, Some(RawWhen::text("2025-10-03T17:00:00-04:00")));
        assert_eq!(walk.end, Some(RawWhen::text("2025-10-03T21:00:00-04:00")));
        assert_eq!(walk.location.as_deref(), Some("Caroline Street"));
        assert_eq!(
            walk.description.as_deref(),
            Some("<p>Galleries open late &amp; live music.</p>")
        );

        let market = &events[1];
        assert_eq!(market.start, Some(RawWhen::text("Sat, 04 Oct 2025 08:00:00 -0400")));
        assert_eq!(market.end, None);
    }

    #[test]
    fn parses_atom_entries() {
        let events = parse_feed(ATOM, "library", "https://library.example/atom.xml");
        assert_eq!(events.len(), 1);

        let night = &events[0];
        assert_eq!(night.title.as_deref(), Some("Teen Game Night"));
        assert_eq!(night.link.as_deref(), Some("https://library.example/e/42"));
        assert_eq!(night.start, Some(RawWhen::text("2025-10-07T22:00:00Z")));
        assert_eq!(night.description.as_deref(), Some("Board games and snacks."));
        assert_eq!(night.uid.as_deref(), Some("urn:uuid:42"));
    }

    #[test]
    fn truncated_feed_keeps_complete_items() {
        let truncated = &RSS[..RSS.find("<item>\n      <title>Farmers").unwrap() + 30];
        let events = parse_feed(truncated, "downtown", "https://downtown.example/feed");
        assert_eq!(events.len(), 1);
    }
}
