//! Format extractors: raw bodies in, candidate [`RawEvent`](crate::RawEvent)s out.
//!
//! Every extractor is a plain synchronous function over a borrowed body.
//! Parsed HTML documents are not `Send`, so adapters call these between
//! awaits and keep only the owned results.

pub mod html;
pub mod ics;
pub mod links;
pub mod rss;
pub mod structured;

use eventfeeds_core::text::collapse_whitespace;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::error::{SourceError, SourceResult};

/// Resolves `href` against the page it was found on.
///
/// Returns `None` for empty links, fragments and `javascript:` pseudo-links.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }
    if href.starts_with("data:") {
        return Some(href.to_string());
    }
    match Url::parse(base) {
        Ok(base) => base.join(href).ok().map(String::from),
        Err(_) => Url::parse(href).ok().map(String::from),
    }
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first match of `selector` under `el`, if non-empty.
pub fn select_text(el: ElementRef<'_>, selector: &Selector) -> Option<String> {
    el.select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// Parses a CSS selector from configuration.
pub fn parse_selector(css: &str) -> SourceResult<Selector> {
    Selector::parse(css)
        .map_err(|e| SourceError::configuration(format!("invalid CSS selector {:?}: {}", css, e)))
}
