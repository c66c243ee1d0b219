//! HTML pages without structured data.
//!
//! - [`extract_with_hints`]: items located by configured CSS selectors
//! - [`event_cards`]: common calendar-plugin markup (The Events Calendar,
//!   generic `.event` blocks, `<article>`s)
//! - [`page_fallback`]: one event from the page heading
//! - [`page_dates`]: best-effort start/end discovery on a detail page

use std::sync::LazyLock;

use eventfeeds_core::text::excerpt;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::structured::{event_nodes, json_str, jsonld_blocks};
use super::{element_text, parse_selector, resolve_url, select_text};
use crate::error::SourceResult;
use crate::raw_event::RawEvent;

static TIME_HINT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,2}(:\d{2})?\s*(?:a\.m\.|p\.m\.|am\b|pm\b)").expect("Invalid time hint regex")
});

static CARD_DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Mon|Tue|Wed|Thu|Fri|Sat|Sun)?\.?,?\s*[A-Z][a-z]+\.?\s*\d{1,2}[^|,]*?\d{1,2}:\d{2}\s*(?:AM|PM|am|pm)?")
        .expect("Invalid card date regex")
});

static DATETIME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time[datetime]").expect("Invalid time selector"));

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Invalid link selector"));

static HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3, h2, .event-title").expect("Invalid heading selector"));

static CARD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "article.type-tribe_events, .tribe-events-calendar-list__event, article.calendar-item, \
         li.event, div.event, article",
    )
    .expect("Invalid event card selector")
});

static CARD_VENUE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".tribe-events-calendar-list__event-venue, .event-venue, .location")
        .expect("Invalid venue selector")
});

static CARD_DESCRIPTION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        ".tribe-events-calendar-list__event-description, .entry-content, .event-description, p",
    )
    .expect("Invalid card description selector")
});

static PAGE_TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, .title").expect("Invalid page title selector"));

static PAGE_DATE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time, .date, p").expect("Invalid page date selector"));

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("Invalid body selector"));

static META_START_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "meta[itemprop='startDate'], meta[itemprop='startdate'], meta[property='event:start_time']",
    )
    .expect("Invalid start meta selector")
});

static META_END_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[itemprop='endDate'], meta[itemprop='enddate'], meta[property='event:end_time']")
        .expect("Invalid end meta selector")
});

static BLOCK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section, div").expect("Invalid block selector"));

/// Returns true if the text mentions a clock time such as "7pm" or "10:30 a.m.".
pub fn looks_like_time(text: &str) -> bool {
    TIME_HINT_REGEX.is_match(text)
}

/// CSS selectors describing a listing page, as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CssHints {
    /// One element per event.
    pub item: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

/// [`CssHints`] with every selector parsed.
#[derive(Debug, Clone)]
pub struct CompiledHints {
    item: Option<Selector>,
    title: Option<Selector>,
    date: Option<Selector>,
    time: Option<Selector>,
    location: Option<Selector>,
    description: Option<Selector>,
    link: Option<Selector>,
}

impl CssHints {
    /// Parses the selectors.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid selector.
    pub fn compile(&self) -> SourceResult<CompiledHints> {
        let parse = |css: &Option<String>| css.as_deref().map(parse_selector).transpose();
        Ok(CompiledHints {
            item: parse(&self.item)?,
            title: parse(&self.title)?,
            date: parse(&self.date)?,
            time: parse(&self.time)?,
            location: parse(&self.location)?,
            description: parse(&self.description)?,
            link: parse(&self.link)?,
        })
    }
}

fn pick(el: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    select_text(el, selector?)
}

/// Extracts items matched by `hints.item`.
///
/// Items with neither a `<time datetime>` element nor a clock time in their
/// text are skipped; they are usually headers or ads.
pub fn extract_with_hints(doc: &Html, hints: &CompiledHints, source: &str, page_url: &str) -> Vec<RawEvent> {
    let Some(ref item_selector) = hints.item else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for item in doc.select(item_selector) {
        let time_node = item.select(&DATETIME_SELECTOR).next();
        if time_node.is_none() && !looks_like_time(&element_text(item)) {
            continue;
        }

        let title = pick(item, hints.title.as_ref())
            .or_else(|| select_text(item, &HEADING_SELECTOR));
        let Some(title) = title else {
            continue;
        };

        let date_text = match (pick(item, hints.date.as_ref()), pick(item, hints.time.as_ref())) {
            (Some(date), Some(time)) if !date.contains(&time) => Some(format!("{} {}", date, time)),
            (Some(date), _) => Some(date),
            (None, time) => time,
        };
        let start = date_text.or_else(|| {
            time_node
                .and_then(|t| t.value().attr("datetime"))
                .map(str::to_string)
        });

        let link_el = match hints.link.as_ref() {
            Some(sel) => item.select(sel).next(),
            None => item.select(&LINK_SELECTOR).next(),
        };
        let link = link_el
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve_url(page_url, href));

        let mut raw = RawEvent::new(source).with_title(title);
        if let Some(start) = start {
            raw = raw.with_start_text(start);
        }
        if let Some(location) = pick(item, hints.location.as_ref()) {
            raw = raw.with_location(location);
        }
        if let Some(description) = pick(item, hints.description.as_ref()) {
            raw = raw.with_description(description);
        }
        if let Some(link) = link {
            raw = raw.with_link(link);
        }
        out.push(raw);
    }
    out
}

/// Extracts events from common calendar-plugin card markup.
///
/// Cards need a title and something that looks like a start.
pub fn event_cards(doc: &Html, source: &str, page_url: &str) -> Vec<RawEvent> {
    let mut out = Vec::new();
    for card in doc.select(&CARD_SELECTOR) {
        let anchor = card.select(&LINK_SELECTOR).next();
        let title = anchor
            .map(element_text)
            .filter(|t| !t.is_empty())
            .or_else(|| select_text(card, &HEADING_SELECTOR));
        let Some(title) = title else {
            continue;
        };
        let href = anchor
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve_url(page_url, href))
            .unwrap_or_else(|| page_url.to_string());

        let times: Vec<&str> = card
            .select(&DATETIME_SELECTOR)
            .filter_map(|t| t.value().attr("datetime"))
            .collect();
        let start = match times.first() {
            Some(first) => Some(first.to_string()),
            None => CARD_DATE_REGEX
                .find(&element_text(card))
                .map(|m| m.as_str().to_string()),
        };
        let Some(start) = start else {
            continue;
        };

        let mut raw = RawEvent::new(source)
            .with_title(title)
            .with_start_text(start)
            .with_link(href);
        if let Some(end) = times.get(1) {
            raw = raw.with_end_text(*end);
        }
        if let Some(location) = select_text(card, &CARD_VENUE_SELECTOR) {
            raw = raw.with_location(location);
        }
        if let Some(description) = select_text(card, &CARD_DESCRIPTION_SELECTOR) {
            raw = raw.with_description(description);
        }
        out.push(raw);
    }
    out
}

/// Builds a single candidate from the page heading.
pub fn page_fallback(doc: &Html, source: &str, page_url: &str) -> Option<RawEvent> {
    let root = doc.root_element();
    let title = select_text(root, &PAGE_TITLE_SELECTOR)?;
    let mut raw = RawEvent::new(source).with_title(title).with_link(page_url);
    if let Some(when) = select_text(root, &PAGE_DATE_SELECTOR) {
        raw = raw.with_start_text(when);
    }
    if let Some(body) = select_text(root, &BODY_SELECTOR) {
        raw = raw.with_description(excerpt(&body, 500));
    }
    Some(raw)
}

/// Start and end hints found on an event detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDates {
    /// Structured start value (ISO 8601 or similar).
    pub start: Option<String>,
    pub end: Option<String>,
    /// A visible block of text mentioning the date, when nothing structured exists.
    pub text: Option<String>,
}

impl PageDates {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.text.is_none()
    }

    /// Copies the hints onto a candidate: structured values when present,
    /// else the text block as the start.
    pub fn apply(self, mut raw: RawEvent) -> RawEvent {
        if self.start.is_some() || self.end.is_some() {
            if let Some(start) = self.start {
                raw = raw.with_start_text(start);
            }
            if let Some(end) = self.end {
                raw = raw.with_end_text(end);
            }
        } else if let Some(text) = self.text {
            raw = raw.with_start_text(text);
        }
        raw
    }
}

fn meta_content(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .find_map(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Looks for an event's dates on a detail page.
///
/// Tries, in order: JSON-LD event nodes, `<time datetime>` elements,
/// `meta` start/end properties, and finally the smallest `section`/`div`
/// whose text contains one of `keywords`.
pub fn page_dates(doc: &Html, keywords: &[&str]) -> PageDates {
    let mut dates = PageDates::default();

    'blocks: for block in jsonld_blocks(doc) {
        for node in event_nodes(&block) {
            let start = json_str(node, "startDate").or_else(|| json_str(node, "start_date"));
            let end = json_str(node, "endDate").or_else(|| json_str(node, "end_date"));
            if dates.start.is_none() {
                dates.start = start;
            }
            if dates.end.is_none() {
                dates.end = end;
            }
            if dates.start.is_some() && dates.end.is_some() {
                break 'blocks;
            }
        }
        if dates.start.is_some() || dates.end.is_some() {
            break;
        }
    }
    if !dates.is_empty() {
        return dates;
    }

    let times: Vec<String> = doc
        .select(&DATETIME_SELECTOR)
        .filter_map(|t| t.value().attr("datetime"))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    if let Some(first) = times.first() {
        dates.start = Some(first.clone());
        dates.end = times.get(1).cloned();
        return dates;
    }

    dates.start = meta_content(doc, &META_START_SELECTOR);
    dates.end = meta_content(doc, &META_END_SELECTOR);
    if !dates.is_empty() {
        return dates;
    }

    dates.text = doc
        .select(&BLOCK_SELECTOR)
        .map(element_text)
        .filter(|text| keywords.iter().any(|k| text.contains(k)))
        .min_by_key(String::len);
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_event::RawWhen;

    const LISTING: &str = r#"<html><body>
        <div class="listing">
          <div class="ev">
            <h3 class="t">Trivia Night</h3>
            <span class="d">October 7</span> <span class="tm">7:00 pm</span>
            <span class="loc">Brew Co.</span>
            <a href="/e/trivia">More</a>
          </div>
          <div class="ev">
            <h3 class="t">Sponsored</h3>
            <p>Buy tickets now!</p>
          </div>
          <div class="ev">
            <h3 class="t">Story Time</h3>
            <time datetime="2025-10-08T10:00:00-04:00">Wed</time>
          </div>
        </div>
    </body></html>"#;

    mod hints {
        use super::*;

        fn hints() -> CompiledHints {
            CssHints {
                item: Some("div.ev".into()),
                title: Some(".t".into()),
                date: Some(".d".into()),
                time: Some(".tm".into()),
                location: Some(".loc".into()),
                ..CssHints::default()
            }
            .compile()
            .unwrap()
        }

        #[test]
        fn extracts_items_with_times() {
            let doc = Html::parse_document(LISTING);
            let events = extract_with_hints(&doc, &hints(), "venue", "https://venue.example/calendar");
            assert_eq!(events.len(), 2);

            let trivia = &events[0];
            assert_eq!(trivia.title.as_deref(), Some("Trivia Night"));
            assert_eq!(trivia.start, Some(RawWhen::text("October 7 7:00 pm")));
            assert_eq!(trivia.location.as_deref(), Some("Brew Co."));
            assert_eq!(trivia.link.as_deref(), Some("https://venue.example/e/trivia"));

            let story = &events[1];
            assert_eq!(story.start, Some(RawWhen::text("2025-10-08T10:00:00-04:00")));
        }

        #[test]
        fn invalid_selector_is_config_error() {
            let hints = CssHints {
                item: Some("div[".into()),
                ..CssHints::default()
            };
            assert!(hints.compile().is_err());
        }

        #[test]
        fn time_hints() {
            assert!(looks_like_time("Doors at 7pm"));
            assert!(looks_like_time("10:30 a.m. - noon"));
            assert!(looks_like_time("Starts at 9 p.m."));
            assert!(!looks_like_time("Buy tickets now"));
            assert!(!looks_like_time("Top 10 amazing hikes"));
        }
    }

    mod cards {
        use super::*;

        #[test]
        fn tribe_events_cards() {
            let page = r#"<div class="tribe-events-calendar-list__event">
                <h3><a href="https://news.example/event/oktoberfest/">Oktoberfest</a></h3>
                <time datetime="2025-10-11T12:00:00">Oct 11 @ 12:00 pm</time>
                <time datetime="2025-10-11T18:00:00">6:00 pm</time>
                <span class="tribe-events-calendar-list__event-venue">Market Square</span>
                <div class="tribe-events-calendar-list__event-description"><p>Beer and brats.</p></div>
            </div>
            <article><h2>Weekly roundup</h2><p>No dates here</p></article>"#;
            let doc = Html::parse_document(page);
            let events = event_cards(&doc, "news", "https://news.example/calendar/");
            assert_eq!(events.len(), 1);

            let fest = &events[0];
            assert_eq!(fest.title.as_deref(), Some("Oktoberfest"));
            assert_eq!(fest.start, Some(RawWhen::text("2025-10-11T12:00:00")));
            assert_eq!(fest.end, Some(RawWhen::text("2025-10-11T18:00:00")));
            assert_eq!(fest.location.as_deref(), Some("Market Square"));
            assert_eq!(fest.description.as_deref(), Some("Beer and brats."));
        }

        #[test]
        fn card_date_from_text() {
            let page = r#"<li class="event"><a href="/e/1">Chili Cook-off</a> Sat. Oct 18 11:30 AM | Park</li>"#;
            let doc = Html::parse_document(page);
            let events = event_cards(&doc, "news", "https://news.example/");
            assert_eq!(events.len(), 1);
            let start = match &events[0].start {
                Some(RawWhen::Text(t)) => t.clone(),
                other => panic!("unexpected start {:?}", other),
            };
            assert!(start.contains("Oct 18 11:30 AM"), "{start}");
        }
    }

    mod detail {
        use super::*;

        #[test]
        fn fallback_uses_heading() {
            let doc = Html::parse_document(
                "<html><body><h1>Harvest Dinner</h1><p>Saturday, October 18 at 6pm</p></body></html>",
            );
            let raw = page_fallback(&doc, "farm", "https://farm.example/dinner").unwrap();
            assert_eq!(raw.title.as_deref(), Some("Harvest Dinner"));
            assert_eq!(raw.start, Some(RawWhen::text("Saturday, October 18 at 6pm")));
            assert_eq!(raw.link.as_deref(), Some("https://farm.example/dinner"));
        }

        #[test]
        fn dates_prefer_jsonld() {
            let doc = Html::parse_document(
                r#"<script type="application/ld+json">{"@type":"Event","name":"X","startDate":"2025-10-18T18:00","endDate":"2025-10-18T21:00"}</script>
                <time datetime="2025-01-01">ignored</time>"#,
            );
            let dates = page_dates(&doc, &["When"]);
            assert_eq!(dates.start.as_deref(), Some("2025-10-18T18:00"));
            assert_eq!(dates.end.as_deref(), Some("2025-10-18T21:00"));
        }

        #[test]
        fn dates_from_meta_then_text() {
            let doc = Html::parse_document(
                r#"<meta itemprop="startDate" content="2025-11-01T09:00"><div>Other</div>"#,
            );
            assert_eq!(page_dates(&doc, &["When"]).start.as_deref(), Some("2025-11-01T09:00"));

            let doc = Html::parse_document(
                "<div><section><h4>When</h4> Nov 2, 2pm - 4pm</section><div>Unrelated footer</div></div>",
            );
            let dates = page_dates(&doc, &["When"]);
            assert_eq!(dates.start, None);
            assert_eq!(dates.text.as_deref(), Some("When Nov 2, 2pm - 4pm"));

            let raw = dates.apply(RawEvent::new("src"));
            assert_eq!(raw.start, Some(RawWhen::text("When Nov 2, 2pm - 4pm")));
        }
    }
}
