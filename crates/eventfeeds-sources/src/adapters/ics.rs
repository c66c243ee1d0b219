//! Plain iCalendar feeds.

use tracing::info;

use super::ICS_ACCEPT;
use crate::error::SourceResult;
use crate::extract::ics::parse_ics;
use crate::http::{FetchRequest, HttpFetcher};
use crate::raw_event::RawEvent;
use crate::source::{BoxFuture, EventSource};

/// A published `.ics` feed.
#[derive(Debug, Clone)]
pub struct IcsSource {
    id: String,
    url: String,
}

impl IcsSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

impl EventSource for IcsSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "ics"
    }

    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let doc = http
                .fetch(FetchRequest::new(&self.id, &self.url).with_accept(ICS_ACCEPT))
                .await?;
            let events = parse_ics(&doc.body, &self.id, &doc.url);
            info!(source = %self.id, count = events.len(), cached = doc.is_cached(), "ICS feed parsed");
            Ok(events)
        })
    }
}
