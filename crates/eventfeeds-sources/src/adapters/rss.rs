//! RSS and Atom feeds.

use tracing::info;

use crate::error::SourceResult;
use crate::extract::rss::parse_feed;
use crate::http::{FetchRequest, HttpFetcher};
use crate::raw_event::RawEvent;
use crate::source::{BoxFuture, EventSource};

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.5";

/// An RSS 2.0 or Atom feed whose items are events.
#[derive(Debug, Clone)]
pub struct RssSource {
    id: String,
    url: String,
}

impl RssSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

impl EventSource for RssSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "rss"
    }

    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let doc = http
                .fetch(FetchRequest::new(&self.id, &self.url).with_accept(FEED_ACCEPT))
                .await?;
            let events = parse_feed(&doc.body, &self.id, &doc.url);
            info!(source = %self.id, count = events.len(), cached = doc.is_cached(), "feed parsed");
            Ok(events)
        })
    }
}
