//! Listing pages scraped with configured CSS selectors.

use scraper::Html;
use tracing::{debug, info};

use crate::error::SourceResult;
use crate::extract::html::{CompiledHints, CssHints, extract_with_hints, page_fallback};
use crate::http::HttpFetcher;
use crate::raw_event::RawEvent;
use crate::source::{BoxFuture, EventSource};

/// A venue or organization page described by [`CssHints`].
#[derive(Debug, Clone)]
pub struct HtmlSource {
    id: String,
    url: String,
    hints: CompiledHints,
}

impl HtmlSource {
    /// Creates the source, compiling the selectors.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid selector.
    pub fn new(id: impl Into<String>, url: impl Into<String>, hints: &CssHints) -> SourceResult<Self> {
        let id = id.into();
        let hints = hints.compile().map_err(|e| e.with_source_id(&id))?;
        Ok(Self {
            id,
            url: url.into(),
            hints,
        })
    }

    /// Extracts candidates from a fetched page.
    ///
    /// Falls back to a single event built from the page heading when the
    /// hints match nothing.
    pub fn extract(&self, body: &str, page_url: &str) -> Vec<RawEvent> {
        let doc = Html::parse_document(body);
        let events = extract_with_hints(&doc, &self.hints, &self.id, page_url);
        if !events.is_empty() {
            return events;
        }
        debug!(source = %self.id, "no hinted items, using page heading");
        page_fallback(&doc, &self.id, page_url).into_iter().collect()
    }
}

impl EventSource for HtmlSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "html"
    }

    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let doc = http.get(&self.id, &self.url).await?;
            let events: Vec<RawEvent> = self
                .extract(&doc.body, &doc.url)
                .into_iter()
                .filter(RawEvent::has_title)
                .collect();
            info!(source = %self.id, count = events.len(), cached = doc.is_cached(), "page scraped");
            Ok(events)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{data_url, fetcher};
    use crate::raw_event::RawWhen;

    fn hints() -> CssHints {
        CssHints {
            item: Some(".event".into()),
            title: Some("h3".into()),
            date: Some(".date".into()),
            time: Some(".time".into()),
            ..CssHints::default()
        }
    }

    #[tokio::test]
    async fn collects_hinted_items() {
        let page = r#"<div class="event"><h3>Open Mic</h3><span class="date">Oct 9</span><span class="time">8pm</span></div>"#;
        let source = HtmlSource::new("pub", data_url("text/html", page), &hints()).unwrap();

        let events = source.collect(&fetcher()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title.as_deref(), Some("Open Mic"));
        assert_eq!(events[0].start, Some(RawWhen::text("Oct 9 8pm")));
    }

    #[test]
    fn falls_back_to_heading() {
        let source = HtmlSource::new("farm", "https://farm.example/", &hints()).unwrap();
        let events = source.extract(
            "<h1>Pumpkin Picking</h1><p>Saturdays in October, 9am to 5pm</p>",
            "https://farm.example/",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title.as_deref(), Some("Pumpkin Picking"));
        assert_eq!(events[0].link.as_deref(), Some("https://farm.example/"));
    }
}
