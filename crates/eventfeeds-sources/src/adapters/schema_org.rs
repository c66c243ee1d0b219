//! Calendar pages that publish schema.org data, with card markup as a fallback.

use scraper::Html;
use tracing::{debug, info};

use crate::error::SourceResult;
use crate::extract::html::event_cards;
use crate::extract::structured::{jsonld_events, microdata_events};
use crate::http::HttpFetcher;
use crate::raw_event::RawEvent;
use crate::source::{BoxFuture, EventSource};

#[derive(Debug, Clone)]
pub struct SchemaOrgSource {
    id: String,
    url: String,
}

impl SchemaOrgSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    /// JSON-LD first, then microdata, then event cards.
    pub fn extract(&self, body: &str, page_url: &str) -> Vec<RawEvent> {
        let doc = Html::parse_document(body);

        let events = jsonld_events(&doc, &self.id, page_url);
        if !events.is_empty() {
            debug!(source = %self.id, count = events.len(), "JSON-LD events");
            return events;
        }

        let events = microdata_events(&doc, &self.id, page_url);
        if !events.is_empty() {
            debug!(source = %self.id, count = events.len(), "microdata events");
            return events;
        }

        let events = event_cards(&doc, &self.id, page_url);
        debug!(source = %self.id, count = events.len(), "event cards");
        events
    }
}

impl EventSource for SchemaOrgSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "schema_org"
    }

    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let doc = http.get(&self.id, &self.url).await?;
            let events = self.extract(&doc.body, &doc.url);
            info!(source = %self.id, count = events.len(), cached = doc.is_cached(), "calendar page parsed");
            Ok(events)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{data_url, fetcher};

    #[test]
    fn jsonld_wins_over_cards() {
        let page = r#"<script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[
              {"@type":"Event","name":"Heritage Festival","startDate":"2025-10-04T10:00:00-04:00"}
            ]}</script>
            <article><h2><a href="/other">Some article</a></h2><time datetime="2025-10-05">Oct 5</time></article>"#;
        let source = SchemaOrgSource::new("paper", "https://paper.example/calendar");
        let events = source.extract(page, "https://paper.example/calendar");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title.as_deref(), Some("Heritage Festival"));
    }

    #[tokio::test]
    async fn falls_back_to_cards() {
        let page = r#"<article class="calendar-item"><h3><a href="/e/1">Book Sale</a></h3>
            <time datetime="2025-10-11T09:00:00">Oct 11</time><span class="location">Main Branch</span></article>"#;
        let source = SchemaOrgSource::new("paper", data_url("text/html", page));

        let events = source.collect(&fetcher()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title.as_deref(), Some("Book Sale"));
        assert_eq!(events[0].location.as_deref(), Some("Main Branch"));
    }
}
