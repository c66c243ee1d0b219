//! Link discovery: detail pages, sitemaps and per-event calendar files.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use quick_xml::events::Event;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::structured::{event_nodes, json_str, jsonld_blocks};
use super::{element_text, resolve_url};

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Invalid anchor selector"));

static EVENTBRITE_ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='/e/']").expect("Invalid Eventbrite anchor selector"));

static GENERATE_ICAL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='generate_ical']").expect("Invalid generate_ical selector"));

static MACKID_DETAIL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^/events/[0-9a-f]{8,}(?:/[\w\-]*)?/?$").expect("Invalid detail path regex")
});

static MACKID_EMBEDDED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)https?://[^"'\s]*?/events/[0-9a-f]{8,}(?:/[A-Za-z0-9\-_%]+)?|/events/[0-9a-f]{8,}(?:/[A-Za-z0-9\-_%]+)?"#,
    )
    .expect("Invalid embedded event URL regex")
});

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn same_host(a: &Url, b: &str) -> bool {
    match (a.host_str(), Url::parse(b).ok()) {
        (Some(host), Some(b)) => b.host_str().is_some_and(|h| h.eq_ignore_ascii_case(host)),
        _ => false,
    }
}

/// Eventbrite event pages linked from a listing page, sorted.
///
/// Organizer, collection and `/o/` profile links are skipped.
pub fn eventbrite_detail_links(doc: &Html, page_url: &str) -> Vec<String> {
    let mut links = BTreeSet::new();
    for a in doc.select(&EVENTBRITE_ANCHOR_SELECTOR) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(absolute) = resolve_url(page_url, strip_query(href)) else {
            continue;
        };
        let Ok(parsed) = Url::parse(&absolute) else {
            continue;
        };
        let path = parsed.path();
        if !path.starts_with("/e/")
            || ["/organizer/", "/o/", "/collections/"].iter().any(|p| path.contains(p))
        {
            continue;
        }
        links.insert(absolute);
    }
    links.into_iter().collect()
}

/// Returns true for a Macaroni KID event detail path such as
/// `/events/66f1c2a9e4b0/pumpkin-patch`.
pub fn is_macaronikid_detail(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path();
    let trimmed = path.trim_end_matches('/');
    MACKID_DETAIL_PATH.is_match(path) && !trimmed.ends_with("/events") && !trimmed.ends_with("/events/calendar")
}

/// Macaroni KID detail pages referenced by a listing page.
///
/// Links are gathered from anchors, JSON-LD event URLs and a scan of the raw
/// markup (script blobs included), then restricted to detail pages on the
/// listing's host.
pub fn macaronikid_detail_links(body: &str, page_url: &str) -> BTreeSet<String> {
    let Ok(page) = Url::parse(page_url) else {
        return BTreeSet::new();
    };

    let mut candidates = Vec::new();
    {
        let doc = Html::parse_document(body);
        for a in doc.select(&ANCHOR_SELECTOR) {
            if let Some(href) = a.value().attr("href")
                && href.contains("/events/")
            {
                candidates.push(href.to_string());
            }
        }
        for block in jsonld_blocks(&doc) {
            for node in event_nodes(&block) {
                if let Some(url) = json_str(node, "url") {
                    candidates.push(url);
                }
            }
        }
    }
    candidates.extend(MACKID_EMBEDDED_URL.find_iter(body).map(|m| m.as_str().to_string()));

    candidates
        .iter()
        .filter_map(|href| resolve_url(page_url, strip_query(href)))
        .filter(|url| same_host(&page, url) && is_macaronikid_detail(url))
        .collect()
}

/// `<loc>` entries of a sitemap document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapLocations {
    /// Child sitemaps of a sitemap index.
    pub sitemaps: Vec<String>,
    /// Page URLs of a `urlset`.
    pub urls: Vec<String>,
}

/// Parses a sitemap or sitemap index.
pub fn sitemap_locations(xml: &str) -> SitemapLocations {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut locations = SitemapLocations::default();
    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                stack.push(name);
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let len = stack.len();
                if len >= 2 && stack[len - 1] == "loc" {
                    let loc = t.unescape().unwrap_or_default().trim().to_string();
                    match stack[len - 2].as_str() {
                        _ if loc.is_empty() => {}
                        "sitemap" => locations.sitemaps.push(loc),
                        "url" => locations.urls.push(loc),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    locations
}

/// `Sitemap:` lines of a robots.txt file.
pub fn robots_sitemaps(robots: &str) -> Vec<String> {
    robots
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("sitemap")
                .then(|| value.trim().to_string())
        })
        .filter(|v| !v.is_empty())
        .collect()
}

/// First link to a `.ics` file or an "Apple Calendar" export.
pub fn find_ics_link(doc: &Html, page_url: &str) -> Option<String> {
    doc.select(&ANCHOR_SELECTOR).find_map(|a| {
        let href = a.value().attr("href")?.trim();
        let is_ics = strip_query(href).to_ascii_lowercase().ends_with(".ics")
            || element_text(a).to_lowercase().contains("apple calendar");
        if is_ics { resolve_url(page_url, href) } else { None }
    })
}

/// Calendar export link on a Thrillshare school site.
pub fn find_thrillshare_ics(doc: &Html, page_url: &str) -> Option<String> {
    let by_text = doc
        .select(&ANCHOR_SELECTOR)
        .find(|a| element_text(*a).contains("Download Calendar"));
    by_text
        .or_else(|| doc.select(&GENERATE_ICAL_SELECTOR).next())
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_url(page_url, href))
}
