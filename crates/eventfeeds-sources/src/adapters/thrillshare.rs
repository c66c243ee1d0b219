//! School district sites on Thrillshare, which expose a calendar download link.

use scraper::Html;
use tracing::{debug, info};

use super::ICS_ACCEPT;
use crate::error::{SourceError, SourceResult};
use crate::extract::ics::parse_ics;
use crate::extract::links::find_thrillshare_ics;
use crate::http::{FetchRequest, HttpFetcher};
use crate::raw_event::RawEvent;
use crate::source::{BoxFuture, EventSource};

#[derive(Debug, Clone)]
pub struct ThrillshareSource {
    id: String,
    url: String,
}

impl ThrillshareSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    fn calendar_link(&self, body: &str, page_url: &str) -> SourceResult<String> {
        let doc = Html::parse_document(body);
        find_thrillshare_ics(&doc, page_url).ok_or_else(|| {
            SourceError::parse(format!("no calendar download link on {}", page_url)).with_source_id(&self.id)
        })
    }
}

impl EventSource for ThrillshareSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "thrillshare"
    }

    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        Box::pin(async move {
            let page = http.get(&self.id, &self.url).await?;
            let link = self.calendar_link(&page.body, &page.url)?;
            debug!(source = %self.id, link = %link, "found calendar download");

            let doc = http
                .fetch(FetchRequest::new(&self.id, &link).with_accept(ICS_ACCEPT))
                .await?;
            let events = parse_ics(&doc.body, &self.id, &page.url);
            info!(source = %self.id, count = events.len(), "school calendar parsed");
            Ok(events)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{data_url, fetcher};
    use crate::error::SourceErrorCode;

    #[tokio::test]
    async fn follows_download_link() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//School//EN\r\n\
BEGIN:VEVENT\r\nUID:conf-1\r\nDTSTAMP:20251001T000000Z\r\nDTSTART;VALUE=DATE:20251013\r\n\
SUMMARY:Parent-Teacher Conferences\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let page = format!(
            r#"<a href="/news">News</a><a href="{}">Download Calendar</a>"#,
            data_url("text/calendar", ics)
        );
        let source = ThrillshareSource::new("schools", data_url("text/html", &page));

        let events = source.collect(&fetcher()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title.as_deref(), Some("Parent-Teacher Conferences"));
    }

    #[tokio::test]
    async fn missing_link_is_a_parse_error() {
        let source = ThrillshareSource::new("schools", data_url("text/html", "<p>Calendar moved</p>"));
        let err = source.collect(&fetcher()).await.unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::ParseError);
        assert_eq!(err.source_id(), Some("schools"));
    }
}
