//! Eventbrite, either by crawling public discovery pages or through the API.
//!
//! Discovery URLs (`/d/...` search pages, `/e/...` event pages) are crawled
//! page by page; every `/e/` detail page is then parsed, JSON-LD first. Any
//! other URL is treated as an API endpoint and needs a bearer token.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SourceError, SourceResult};
use crate::extract::html::page_dates;
use crate::extract::links::eventbrite_detail_links;
use crate::extract::select_text;
use crate::extract::structured::{json_str, jsonld_events};
use crate::http::{FetchRequest, HttpFetcher};
use crate::raw_event::RawEvent;
use crate::source::{BoxFuture, EventSource};

use super::DEFAULT_EVENTBRITE_PAGES;

static DISCOVERY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[^/]*eventbrite\.com/(d/|e/)").expect("Invalid Eventbrite discovery regex"));

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, [data-testid='event-title']").expect("Invalid title selector"));

static LOCATION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-testid='event-details-location'], [data-testid='location-info']")
        .expect("Invalid location selector")
});

/// Returns true for public Eventbrite pages (as opposed to API endpoints).
pub fn is_discovery_url(url: &str) -> bool {
    DISCOVERY_REGEX.is_match(url)
}

/// The `page`-th listing page of a discovery search.
fn list_page_url(base: &str, page: u32) -> String {
    if page <= 1 {
        return base.to_string();
    }
    let Ok(mut url) = Url::parse(base) else {
        return base.to_string();
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string());
    url.into()
}

/// Parses an event detail page. Requires a title and a start.
pub fn parse_detail_page(body: &str, source: &str, page_url: &str) -> Option<RawEvent> {
    let doc = Html::parse_document(body);

    if let Some(event) = jsonld_events(&doc, source, page_url)
        .into_iter()
        .find(|e| e.has_title() && e.start.is_some())
    {
        return Some(event.with_link(page_url));
    }

    let title = select_text(doc.root_element(), &TITLE_SELECTOR)?;
    let dates = page_dates(&doc, &["Date and time"]);
    if dates.is_empty() {
        return None;
    }

    let mut raw = dates.apply(RawEvent::new(source).with_title(title).with_link(page_url));
    if let Some(location) = select_text(doc.root_element(), &LOCATION_SELECTOR) {
        raw = raw.with_location(location);
    }
    Some(raw)
}

fn text_field(node: &Value, key: &str) -> Option<String> {
    let value = node.get(key)?;
    json_str(value, "text").or_else(|| json_str(node, key))
}

/// Parses an API response: `{"events": [...]}` or `{"data": [...]}`.
pub fn parse_api_events(body: &str, source: &str) -> SourceResult<Vec<RawEvent>> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| SourceError::parse(format!("Eventbrite API returned invalid JSON: {}", e)).with_source(e))?;

    let items = json
        .get("events")
        .or_else(|| json.get("data"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut out = Vec::new();
    for item in &items {
        let mut raw = RawEvent::new(source);
        if let Some(name) = text_field(item, "name") {
            raw = raw.with_title(name);
        }
        if let Some(description) = text_field(item, "description") {
            raw = raw.with_description(description);
        }

        let start = item.get("start");
        match start.and_then(|s| json_str(s, "local")) {
            Some(local) => raw = raw.with_start_text(local),
            None => {
                if let Some(start) = json_str(item, "start") {
                    raw = raw.with_start_text(start);
                }
            }
        }
        if let Some(tz) = start.and_then(|s| json_str(s, "timezone")) {
            raw = raw.with_timezone(tz);
        }
        if let Some(end) = item.get("end").and_then(|e| json_str(e, "local")) {
            raw = raw.with_end_text(end);
        }

        let venue = item
            .get("venue")
            .and_then(|v| json_str(v, "name"))
            .or_else(|| json_str(item, "venue_id").map(|id| format!("Venue ID {}", id)));
        if let Some(venue) = venue {
            raw = raw.with_location(venue);
        }
        if let Some(url) = json_str(item, "url") {
            raw = raw.with_link(url);
        }
        if let Some(id) = json_str(item, "id") {
            raw = raw.with_uid(format!("eventbrite-{}", id));
        }
        out.push(raw);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct EventbriteSource {
    id: String,
    url: String,
    pages: u32,
    token: Option<String>,
}

impl EventbriteSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            pages: DEFAULT_EVENTBRITE_PAGES,
            token: None,
        }
    }

    /// Maximum discovery pages to crawl.
    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = pages.max(1);
        self
    }

    /// Bearer token for API mode.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn discover(&self, http: &HttpFetcher) -> SourceResult<Vec<RawEvent>> {
        let mut detail_urls = BTreeSet::new();
        if Url::parse(&self.url).is_ok_and(|u| u.path().starts_with("/e/")) {
            detail_urls.insert(self.url.clone());
        } else {
            for page in 1..=self.pages {
                let url = list_page_url(&self.url, page);
                let doc = match http.get(&self.id, &url).await {
                    Ok(doc) => doc,
                    Err(e) if page == 1 => return Err(e),
                    Err(e) => {
                        debug!(source = %self.id, url = %url, error = %e, "stopping discovery");
                        break;
                    }
                };
                let links = eventbrite_detail_links(&Html::parse_document(&doc.body), &doc.url);
                let before = detail_urls.len();
                detail_urls.extend(links);
                debug!(source = %self.id, page, found = detail_urls.len() - before, "discovery page");
                if detail_urls.len() == before {
                    break;
                }
            }
        }

        let mut events = Vec::new();
        for url in &detail_urls {
            match http.get(&self.id, url).await {
                Ok(doc) => match parse_detail_page(&doc.body, &self.id, url) {
                    Some(event) => events.push(event),
                    None => debug!(source = %self.id, url = %url, "detail page without title or date"),
                },
                Err(e) => warn!(source = %self.id, url = %url, error = %e, "detail page failed"),
            }
        }
        info!(source = %self.id, pages = detail_urls.len(), count = events.len(), "Eventbrite discovery done");
        Ok(events)
    }

    async fn from_api(&self, http: &HttpFetcher) -> SourceResult<Vec<RawEvent>> {
        let Some(ref token) = self.token else {
            info!(source = %self.id, "no Eventbrite token, skipping API source");
            return Ok(Vec::new());
        };
        let request = FetchRequest::new(&self.id, &self.url)
            .with_bearer(token)
            .with_accept("application/json");
        let doc = http.fetch(request).await?;
        let events = parse_api_events(&doc.body, &self.id).map_err(|e| e.with_source_id(&self.id))?;
        info!(source = %self.id, count = events.len(), "Eventbrite API events");
        Ok(events)
    }
}

impl EventSource for EventbriteSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "eventbrite"
    }

    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        Box::pin(async move {
            if is_discovery_url(&self.url) {
                self.discover(http).await
            } else {
                self.from_api(http).await
            }
        })
    }
}
