//! Macaroni KID local family calendars.
//!
//! List pages are scanned for event detail links; when none turn up, the
//! site's sitemaps are crawled instead. Each detail page is read through its
//! "Add to Apple Calendar" `.ics` link when it has one, else from the HTML.

use std::collections::{BTreeSet, VecDeque};
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::{DEFAULT_MACARONIKID_LIST_PAGES, ICS_ACCEPT};
use crate::error::{SourceError, SourceResult};
use crate::extract::html::page_dates;
use crate::extract::ics::parse_ics;
use crate::extract::links::{find_ics_link, macaronikid_detail_links, robots_sitemaps, sitemap_locations};
use crate::extract::{element_text, select_text};
use crate::http::{FetchRequest, HttpFetcher};
use crate::raw_event::RawEvent;
use crate::source::{BoxFuture, EventSource};

/// Pages visited across all list URLs.
const MAX_LIST_PAGES_VISITED: usize = 20;
/// Nesting depth followed through sitemap indexes.
const SITEMAP_MAX_DEPTH: usize = 2;

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, [data-element='event-title']").expect("Invalid title selector"));

static DESCRIPTION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-element='event-description'], .article-content, .event-description")
        .expect("Invalid description selector")
});

static LOCATION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-element='event-location'], .event-location, .location, [itemprop='location']")
        .expect("Invalid location selector")
});

static DATE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-element='event-date'], .event-date, .event-time").expect("Invalid date selector")
});

/// Reads an event from a detail page without a calendar file.
pub fn parse_detail_html(body: &str, source: &str, page_url: &str) -> Option<RawEvent> {
    let doc = Html::parse_document(body);
    let root = doc.root_element();

    let title = select_text(root, &TITLE_SELECTOR)?;
    let mut raw = RawEvent::new(source).with_title(title).with_link(page_url);
    if let Some(description) = select_text(root, &DESCRIPTION_SELECTOR) {
        raw = raw.with_description(description);
    }
    if let Some(location) = select_text(root, &LOCATION_SELECTOR) {
        raw = raw.with_location(location);
    }

    let date_text = doc
        .select(&DATE_SELECTOR)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if date_text.is_empty() {
        raw = page_dates(&doc, &["Date", "Time", "When"]).apply(raw);
    } else {
        raw = raw.with_start_text(date_text);
    }
    Some(raw)
}

fn detail_ics_link(body: &str, page_url: &str) -> Option<String> {
    find_ics_link(&Html::parse_document(body), page_url)
}

#[derive(Debug, Clone)]
pub struct MacaroniKidSource {
    id: String,
    base_url: String,
    max_list_pages: u32,
    user_agent: Option<String>,
}

impl MacaroniKidSource {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_list_pages: DEFAULT_MACARONIKID_LIST_PAGES,
            user_agent: None,
        }
    }

    pub fn with_max_list_pages(mut self, pages: u32) -> Self {
        self.max_list_pages = pages;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// `/events`, `/events/calendar`, then the numbered list pages.
    fn list_urls(&self) -> Vec<String> {
        let mut urls = vec![
            format!("{}/events", self.base_url),
            format!("{}/events/calendar", self.base_url),
        ];
        urls.extend((1..=self.max_list_pages).map(|n| format!("{}/events?page={}", self.base_url, n)));
        urls
    }

    fn request(&self, url: &str) -> FetchRequest {
        let mut request = FetchRequest::new(&self.id, url).with_referer(format!("{}/", self.base_url));
        if let Some(ref ua) = self.user_agent {
            request = request.with_user_agent(ua);
        }
        request
    }

    async fn sitemap_links(&self, http: &HttpFetcher) -> BTreeSet<String> {
        let Ok(base) = Url::parse(&self.base_url) else {
            return BTreeSet::new();
        };
        let origin = base.origin().ascii_serialization();

        let mut queue: VecDeque<(String, usize)> = match http.fetch(self.request(&format!("{}/robots.txt", origin))).await {
            Ok(doc) => robots_sitemaps(&doc.body).into_iter().map(|u| (u, 0)).collect(),
            Err(e) => {
                debug!(source = %self.id, error = %e, "robots.txt unavailable for sitemap discovery");
                VecDeque::new()
            }
        };
        if queue.is_empty() {
            queue.push_back((format!("{}/sitemap.xml", origin), 0));
        }

        let mut found = BTreeSet::new();
        while let Some((sitemap, depth)) = queue.pop_front() {
            let doc = match http.fetch(self.request(&sitemap)).await {
                Ok(doc) => doc,
                Err(e) => {
                    debug!(source = %self.id, sitemap = %sitemap, error = %e, "sitemap fetch failed");
                    continue;
                }
            };
            let locations = sitemap_locations(&doc.body);
            if depth < SITEMAP_MAX_DEPTH {
                queue.extend(locations.sitemaps.into_iter().map(|u| (u, depth + 1)));
            }
            found.extend(locations.urls.into_iter().filter(|u| {
                u.contains("/events/")
                    && Url::parse(u).is_ok_and(|parsed| parsed.host_str() == base.host_str())
            }));
        }
        debug!(source = %self.id, count = found.len(), "sitemap event URLs");
        found
    }

    async fn detail_events(&self, http: &HttpFetcher, url: &str) -> SourceResult<Vec<RawEvent>> {
        let doc = http.fetch(self.request(url)).await?;

        if let Some(ics_url) = detail_ics_link(&doc.body, &doc.url) {
            match http
                .fetch(self.request(&ics_url).with_accept(ICS_ACCEPT))
                .await
            {
                Ok(ics) => {
                    let events: Vec<RawEvent> = parse_ics(&ics.body, &self.id, url)
                        .into_iter()
                        .map(|e| e.or_link(url))
                        .collect();
                    if !events.is_empty() {
                        return Ok(events);
                    }
                }
                Err(e) => debug!(source = %self.id, url = %ics_url, error = %e, "event .ics failed, reading HTML"),
            }
        }

        Ok(parse_detail_html(&doc.body, &self.id, url).into_iter().collect())
    }
}

impl EventSource for MacaroniKidSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "macaronikid"
    }

    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let mut detail_urls = BTreeSet::new();
            let mut visited = 0;
            let mut last_error: Option<SourceError> = None;

            for url in self.list_urls().into_iter().take(MAX_LIST_PAGES_VISITED) {
                match http.fetch(self.request(&url)).await {
                    Ok(doc) => {
                        visited += 1;
                        detail_urls.extend(macaronikid_detail_links(&doc.body, &doc.url));
                    }
                    Err(e) => {
                        debug!(source = %self.id, url = %url, error = %e, "list page failed");
                        last_error = Some(e);
                    }
                }
            }

            if detail_urls.is_empty() {
                debug!(source = %self.id, visited, "no detail links on list pages, trying sitemaps");
                detail_urls = self.sitemap_links(http).await;
            }
            if detail_urls.is_empty()
                && visited == 0
                && let Some(e) = last_error
            {
                return Err(e);
            }

            let mut events = Vec::new();
            for url in &detail_urls {
                match self.detail_events(http, url).await {
                    Ok(mut found) => events.append(&mut found),
                    Err(e) => warn!(source = %self.id, url = %url, error = %e, "detail page failed"),
                }
            }
            info!(
                source = %self.id,
                list_pages = visited,
                details = detail_urls.len(),
                count = events.len(),
                "Macaroni KID crawl done"
            );
            Ok(events)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{data_url, fetcher};
    use crate::raw_event::RawWhen;

    mod pages {
        use super::*;

        #[test]
        fn list_urls() {
            let source = MacaroniKidSource::new("mac", "https://town.macaronikid.com/").with_max_list_pages(2);
            assert_eq!(
                source.list_urls(),
                vec![
                    "https://town.macaronikid.com/events",
                    "https://town.macaronikid.com/events/calendar",
                    "https://town.macaronikid.com/events?page=1",
                    "https://town.macaronikid.com/events?page=2",
                ]
            );
        }

        #[test]
        fn detail_html_with_date_blocks() {
            let page = r#"<h1>Touch-a-Truck</h1>
                <div data-element="event-date">Saturday, October 25</div>
                <div class="event-time">10am - 1pm</div>
                <div data-element="event-location">Old Mill Park</div>
                <div data-element="event-description">Climb aboard fire trucks and diggers.</div>"#;
            let raw = parse_detail_html(page, "mac", "https://town.macaronikid.com/events/66f1c2a9e4b0").unwrap();
            assert_eq!(raw.title.as_deref(), Some("Touch-a-Truck"));
            assert_eq!(raw.start, Some(RawWhen::text("Saturday, October 25 10am - 1pm")));
            assert_eq!(raw.location.as_deref(), Some("Old Mill Park"));
            assert_eq!(raw.description.as_deref(), Some("Climb aboard fire trucks and diggers."));
            assert_eq!(raw.link.as_deref(), Some("https://town.macaronikid.com/events/66f1c2a9e4b0"));
        }

        #[test]
        fn detail_html_with_time_elements() {
            let page = r#"<h1>Library Lego Club</h1>
                <time datetime="2025-10-21T16:00:00">4pm</time><time datetime="2025-10-21T17:00:00">5pm</time>"#;
            let raw = parse_detail_html(page, "mac", "https://x.example/events/abcdef01").unwrap();
            assert_eq!(raw.start, Some(RawWhen::text("2025-10-21T16:00:00")));
            assert_eq!(raw.end, Some(RawWhen::text("2025-10-21T17:00:00")));
        }
    }

    #[tokio::test]
    async fn detail_prefers_calendar_file() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//MacKID//EN\r\n\
BEGIN:VEVENT\r\nUID:mk-1\r\nDTSTAMP:20251001T000000Z\r\nDTSTART:20251025T140000Z\r\n\
SUMMARY:Fall Festival\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let page = format!(
            r#"<h1>Fall Festival</h1><a href="{}">Add to Apple Calendar</a>"#,
            data_url("text/calendar", ics)
        );
        let detail = data_url("text/html", &page);
        let source = MacaroniKidSource::new("mac", "https://town.macaronikid.com");

        let events = source.detail_events(&fetcher(), &detail).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "mac");
        assert_eq!(events[0].uid.as_deref(), Some("mk-1"));
        assert_eq!(events[0].link.as_deref(), Some(detail.as_str()));
    }

    #[tokio::test]
    async fn detail_falls_back_to_html() {
        let page = r#"<h1>Puppet Show</h1><div class="event-date">Nov 1 11am</div>"#;
        let detail = data_url("text/html", page);
        let source = MacaroniKidSource::new("mac", "https://town.macaronikid.com");

        let events = source.detail_events(&fetcher(), &detail).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "mac");
        assert_eq!(events[0].start, Some(RawWhen::text("Nov 1 11am")));
    }
}
