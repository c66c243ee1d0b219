//! schema.org structured data: JSON-LD blocks and microdata.

use std::sync::LazyLock;

use eventfeeds_core::text::{collapse_whitespace, decode_entities};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::trace;

use super::{element_text, resolve_url};
use crate::raw_event::RawEvent;

static JSONLD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("Invalid JSON-LD selector")
});

static ITEMSCOPE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[itemscope][itemtype]").expect("Invalid itemscope selector"));

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Invalid link selector"));

/// Every JSON-LD block on the page that parses as JSON.
pub fn jsonld_blocks(doc: &Html) -> Vec<Value> {
    doc.select(&JSONLD_SELECTOR)
        .filter_map(|script| {
            let text = script.text().collect::<String>();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(v) => Some(v),
                Err(e) => {
                    trace!(error = %e, "skipping unparseable JSON-LD block");
                    None
                }
            }
        })
        .collect()
}

fn type_names(node: &Value) -> Vec<&str> {
    match node.get("@type") {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// True for `Event`, its subtypes (`MusicEvent`, `SocialEvent`, ...) and `Festival`.
pub fn is_event_node(node: &Value) -> bool {
    type_names(node)
        .iter()
        .any(|t| t.ends_with("Event") || *t == "Festival")
}

/// Collects event nodes from a JSON-LD value: the value itself, `@graph`
/// members, top-level arrays and `ItemList` elements.
pub fn event_nodes(value: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    collect_event_nodes(value, &mut out, 0);
    out
}

fn collect_event_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>, depth: usize) {
    if depth > 4 {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_event_nodes(item, out, depth + 1);
            }
        }
        Value::Object(map) => {
            if is_event_node(value) {
                out.push(value);
            }
            if let Some(graph) = map.get("@graph") {
                collect_event_nodes(graph, out, depth + 1);
            }
            if let Some(Value::Array(elements)) = map.get("itemListElement") {
                for element in elements {
                    collect_event_nodes(element.get("item").unwrap_or(element), out, depth + 1);
                }
            }
        }
        _ => {}
    }
}

/// A string property, accepting numbers, `{"@value": ...}` wrappers and
/// arrays (first usable element).
pub fn json_str(node: &Value, key: &str) -> Option<String> {
    node.get(key).and_then(scalar_str)
}

fn scalar_str(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => return map.get("@value").and_then(scalar_str),
        Value::Array(items) => return items.iter().find_map(scalar_str),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Formats a schema.org `location` as "Venue - street locality region postal".
pub fn format_location(location: &Value) -> Option<String> {
    let text = match location {
        Value::String(s) => s.clone(),
        Value::Array(items) => return items.iter().find_map(format_location),
        Value::Object(_) => {
            let name = json_str(location, "name").unwrap_or_default();
            let address = match location.get("address") {
                Some(Value::String(s)) => s.clone(),
                Some(addr @ Value::Object(_)) => ["streetAddress", "addressLocality", "addressRegion", "postalCode"]
                    .iter()
                    .filter_map(|k| json_str(addr, k))
                    .collect::<Vec<_>>()
                    .join(" "),
                _ => String::new(),
            };
            let address = if address.is_empty() {
                json_str(location, "url").filter(|_| name.is_empty()).unwrap_or_default()
            } else {
                address
            };
            format!("{} - {}", name, address)
                .trim_matches(|c: char| c == ' ' || c == '-')
                .to_string()
        }
        _ => return None,
    };
    let text = collapse_whitespace(&decode_entities(&text));
    (!text.is_empty()).then_some(text)
}

/// Builds a candidate from one JSON-LD event node.
///
/// Returns `None` when the node has no name.
pub fn event_from_node(node: &Value, source: &str, page_url: &str) -> Option<RawEvent> {
    let name = json_str(node, "name")?;
    let mut raw = RawEvent::new(source).with_title(collapse_whitespace(&decode_entities(&name)));

    if let Some(start) = json_str(node, "startDate").or_else(|| json_str(node, "start_date")) {
        raw = raw.with_start_text(start);
    }
    if let Some(end) = json_str(node, "endDate").or_else(|| json_str(node, "end_date")) {
        raw = raw.with_end_text(end);
    }
    if let Some(description) = json_str(node, "description") {
        raw = raw.with_description(description);
    }
    if let Some(location) = node.get("location").and_then(format_location) {
        raw = raw.with_location(location);
    }
    if let Some(link) = json_str(node, "url").and_then(|u| resolve_url(page_url, &u)) {
        raw = raw.with_link(link);
    }
    if let Some(id) = json_str(node, "@id") {
        raw = raw.with_uid(id);
    }
    Some(raw)
}

/// Extracts every JSON-LD event on the page.
pub fn jsonld_events(doc: &Html, source: &str, page_url: &str) -> Vec<RawEvent> {
    jsonld_blocks(doc)
        .iter()
        .flat_map(event_nodes)
        .filter_map(|node| event_from_node(node, source, page_url))
        .collect()
}

fn itemprop(scope: ElementRef<'_>, prop: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"[itemprop="{}"]"#, prop)).ok()?;
    let el = scope.select(&selector).next()?;
    let value = el
        .value()
        .attr("content")
        .or_else(|| el.value().attr("datetime"))
        .map(str::to_string)
        .unwrap_or_else(|| element_text(el));
    let value = collapse_whitespace(&value);
    (!value.is_empty()).then_some(value)
}

/// Extracts microdata events (`itemtype` containing `schema.org/Event`).
pub fn microdata_events(doc: &Html, source: &str, page_url: &str) -> Vec<RawEvent> {
    let mut out = Vec::new();
    for scope in doc.select(&ITEMSCOPE_SELECTOR) {
        let itemtype = scope.value().attr("itemtype").unwrap_or_default().to_ascii_lowercase();
        if !itemtype.contains("schema.org/event") {
            continue;
        }
        let Some(title) = itemprop(scope, "name").or_else(|| itemprop(scope, "summary")) else {
            continue;
        };

        let mut raw = RawEvent::new(source).with_title(title);
        if let Some(start) = itemprop(scope, "startDate").or_else(|| itemprop(scope, "startTime")) {
            raw = raw.with_start_text(start);
        }
        if let Some(end) = itemprop(scope, "endDate").or_else(|| itemprop(scope, "endTime")) {
            raw = raw.with_end_text(end);
        }
        if let Some(description) = itemprop(scope, "description") {
            raw = raw.with_description(description);
        }
        if let Some(location) = location_microdata(scope) {
            raw = raw.with_location(location);
        }
        let href = scope
            .select(&LINK_SELECTOR)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve_url(page_url, href))
            .unwrap_or_else(|| page_url.to_string());
        out.push(raw.with_link(href));
    }
    out
}

fn location_microdata(scope: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse(r#"[itemprop="location"]"#).ok()?;
    let loc = scope.select(&selector).next()?;
    itemprop(loc, "name")
        .or_else(|| Some(element_text(loc)))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_event::RawWhen;
    use serde_json::json;

    mod jsonld {
        use super::*;

        #[test]
        fn finds_events_in_graph_and_lists() {
            let graph = json!({
                "@context": "https://schema.org",
                "@graph": [
                    {"@type": "WebPage", "name": "Calendar"},
                    {"@type": "MusicEvent", "name": "Jazz Night"},
                ]
            });
            assert_eq!(event_nodes(&graph).len(), 1);

            let list = json!([{"@type": "Festival", "name": "Fall Festival"}, {"@type": "Place"}]);
            assert_eq!(event_nodes(&list).len(), 1);

            let item_list = json!({
                "@type": "ItemList",
                "itemListElement": [
                    {"@type": "ListItem", "item": {"@type": "Event", "name": "A"}},
                    {"@type": "ListItem", "item": {"@type": ["Event", "Thing"], "name": "B"}},
                ]
            });
            assert_eq!(event_nodes(&item_list).len(), 2);
        }

        #[test]
        fn formats_locations() {
            let place = json!({
                "@type": "Place",
                "name": "Riverfront Park",
                "address": {
                    "streetAddress": "712 Sophia St",
                    "addressLocality": "Fredericksburg",
                    "addressRegion": "VA",
                    "postalCode": "22401"
                }
            });
            insta::assert_snapshot!(
                format_location(&place).unwrap(),
                @"Riverfront Park - 712 Sophia St Fredericksburg VA 22401"
            );
            assert_eq!(format_location(&json!("Town Hall")).as_deref(), Some("Town Hall"));
            assert_eq!(
                format_location(&json!({"name": "Online only"})).as_deref(),
                Some("Online only")
            );
            assert_eq!(format_location(&json!({})), None);
        }

        #[test]
        fn builds_candidates_from_page() {
            let page = r#"<html><head>
                <script type="application/ld+json">
                {"@context":"https://schema.org","@type":"Event","name":"Fall Festival &amp; Craft Fair",
                 "startDate":"2025-10-04T10:00:00-04:00","endDate":"2025-10-04T16:00:00-04:00",
                 "url":"/events/fall-festival","description":"Hayrides and cider.",
                 "location":{"@type":"Place","name":"Old Mill Park"}}
                </script>
                <script type="application/ld+json">{ broken json </script>
                </head><body></body></html>"#;
            let doc = Html::parse_document(page);
            let events = jsonld_events(&doc, "parks", "https://parks.example.gov/calendar");
            assert_eq!(events.len(), 1);

            let fest = &events[0];
            assert_eq!(fest.title.as_deref(), Some("Fall Festival & Craft Fair"));
            assert_eq!(fest.start, Some(RawWhen::text("2025-10-04T10:00:00-04:00")));
            assert_eq!(fest.end, Some(RawWhen::text("2025-10-04T16:00:00-04:00")));
            assert_eq!(fest.location.as_deref(), Some("Old Mill Park"));
            assert_eq!(fest.link.as_deref(), Some("https://parks.example.gov/events/fall-festival"));
        }

        #[test]
        fn node_without_name_is_skipped() {
            let node = json!({"@type": "Event", "startDate": "2025-10-04"});
            assert!(event_from_node(&node, "src", "https://example.org").is_none());
        }
    }

    mod microdata {
        use super::*;

        #[test]
        fn reads_itemprops() {
            let page = r#"<div itemscope itemtype="https://schema.org/Event">
                <a href="/e/pumpkin"><span itemprop="name">Pumpkin Carving</span></a>
                <meta itemprop="startDate" content="2025-10-23T18:00">
                <time itemprop="endDate" datetime="2025-10-23T20:00">8pm</time>
                <div itemprop="location" itemscope itemtype="https://schema.org/Place">
                    <span itemprop="name">Community Center</span>
                </div>
                <p itemprop="description">Bring   your own pumpkin.</p>
            </div>
            <div itemscope itemtype="https://schema.org/Organization"><span itemprop="name">Parks Dept</span></div>"#;
            let doc = Html::parse_document(page);
            let events = microdata_events(&doc, "parks", "https://parks.example.gov/calendar");
            assert_eq!(events.len(), 1);

            let carving = &events[0];
            assert_eq!(carving.title.as_deref(), Some("Pumpkin Carving"));
            assert_eq!(carving.start, Some(RawWhen::text("2025-10-23T18:00")));
            assert_eq!(carving.end, Some(RawWhen::text("2025-10-23T20:00")));
            assert_eq!(carving.location.as_deref(), Some("Community Center"));
            assert_eq!(carving.description.as_deref(), Some("Bring your own pumpkin."));
            assert_eq!(carving.link.as_deref(), Some("https://parks.example.gov/e/pumpkin"));
        }
    }
}
