//! Bandsintown artist and venue event API.

use serde_json::Value;
use tracing::info;

use crate::error::{SourceError, SourceResult};
use crate::extract::structured::json_str;
use crate::http::{FetchRequest, HttpFetcher};
use crate::raw_event::RawEvent;
use crate::source::{BoxFuture, EventSource};

/// Placeholder replaced with the app id in configured URLs.
pub const APP_ID_PLACEHOLDER: &str = "${BANDSINTOWN_APP_ID}";

fn lineup(item: &Value) -> Option<String> {
    let names: Vec<String> = item
        .get("lineup")?
        .as_array()?
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            other => json_str(other, "name"),
        })
        .filter(|s| !s.is_empty())
        .collect();
    (!names.is_empty()).then(|| names.join(" / "))
}

/// Parses the API response: a list of events or `{"events": [...]}`.
pub fn parse_events(body: &str, source: &str) -> SourceResult<Vec<RawEvent>> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| SourceError::parse(format!("Bandsintown returned invalid JSON: {}", e)).with_source(e))?;

    let items = match json {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("events") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    let mut out = Vec::new();
    for item in &items {
        let venue = item.get("venue").and_then(|v| json_str(v, "name"));
        let venue_label = venue.clone().unwrap_or_else(|| "Unknown venue".to_string());
        let title = match lineup(item) {
            Some(acts) => format!("{} @ {}", acts, venue_label),
            None => format!(
                "{} @ {}",
                json_str(item, "title").unwrap_or_else(|| "Live music".to_string()),
                venue_label
            ),
        };

        let mut raw = RawEvent::new(source).with_title(title);
        if let Some(start) = ["starts_at", "datetime", "start"]
            .iter()
            .find_map(|k| json_str(item, k))
        {
            raw = raw.with_start_text(start);
        }
        if let Some(end) = json_str(item, "ends_at") {
            raw = raw.with_end_text(end);
        }
        if let Some(venue) = venue {
            raw = raw.with_location(venue);
        }
        if let Some(description) = json_str(item, "description") {
            raw = raw.with_description(description);
        }
        if let Some(link) = json_str(item, "url").or_else(|| json_str(item, "offer_url")) {
            raw = raw.with_link(link);
        }
        if let Some(id) = json_str(item, "id") {
            raw = raw.with_uid(format!("bandsintown-{}", id));
        }
        out.push(raw);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct BandsintownSource {
    id: String,
    url: String,
    app_id: Option<String>,
}

impl BandsintownSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>, app_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            app_id,
        }
    }

    /// The request URL with the app id filled in, or `None` when one is
    /// needed and missing.
    fn request_url(&self) -> Option<String> {
        if !self.url.contains(APP_ID_PLACEHOLDER) {
            return Some(self.url.clone());
        }
        let app_id = self.app_id.as_deref()?;
        Some(self.url.replace(APP_ID_PLACEHOLDER, &urlencoding::encode(app_id)))
    }
}

impl EventSource for BandsintownSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "bandsintown"
    }

    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let Some(url) = self.request_url() else {
                info!(source = %self.id, "no Bandsintown app id, skipping");
                return Ok(Vec::new());
            };
            let doc = http
                .fetch(FetchRequest::new(&self.id, url).with_accept("application/json"))
                .await?;
            let events = parse_events(&doc.body, &self.id).map_err(|e| e.with_source_id(&self.id))?;
            info!(source = %self.id, count = events.len(), cached = doc.is_cached(), "Bandsintown events");
            Ok(events)
        })
    }
}
