//! The [`EventSource`] trait implemented by every site adapter.

use std::future::Future;
use std::pin::Pin;

use crate::error::{SourceError, SourceResult};
use crate::http::HttpFetcher;
use crate::raw_event::RawEvent;

/// A boxed future for async trait methods.
///
/// Boxing keeps [`EventSource`] object-safe so the pipeline can hold a
/// `Vec<Box<dyn EventSource>>` built from configuration.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One configured website or API.
///
/// Implementations fetch through the shared [`HttpFetcher`] (which owns the
/// cache, robots guard and retry policy) and return candidate records.
/// A returned error means the whole source failed; the run continues
/// without it.
///
/// ```ignore
/// impl EventSource for IcsSource {
///     fn id(&self) -> &str { &self.id }
///     fn kind(&self) -> &'static str { "ics" }
///
///     fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
///         Box::pin(async move {
///             let doc = http.fetch(FetchRequest::new(&self.id, &self.url)).await?;
///             Ok(parse_ics(&doc.body, &self.id, &doc.url))
///         })
///     }
/// }
/// ```
pub trait EventSource: Send + Sync {
    /// The configured id of this source.
    fn id(&self) -> &str;

    /// The adapter kind, as written in configuration.
    fn kind(&self) -> &'static str;

    /// Fetches and extracts candidate records.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the source as a whole cannot be read.
    /// Individual unparseable items are skipped, not reported.
    fn collect<'a>(&'a self, http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>>;
}

/// A source that always fails.
///
/// Stands in for a configured source whose settings could not be turned
/// into an adapter, so the failure shows up in the run summary.
#[derive(Debug)]
pub struct ErrorSource {
    id: String,
    error: SourceError,
}

impl ErrorSource {
    pub fn new(id: impl Into<String>, error: SourceError) -> Self {
        Self {
            id: id.into(),
            error,
        }
    }
}

impl EventSource for ErrorSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "error"
    }

    fn collect<'a>(&'a self, _http: &'a HttpFetcher) -> BoxFuture<'a, SourceResult<Vec<RawEvent>>> {
        let error = SourceError::new(self.error.code(), self.error.message()).with_source_id(&self.id);
        Box::pin(async move { Err(error) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::error::SourceErrorCode;
    use crate::http::HttpConfig;

    #[tokio::test]
    async fn error_source_reports_its_error() {
        let http = HttpFetcher::new(HttpConfig::default(), CacheStore::in_memory()).unwrap();
        let source = ErrorSource::new("broken", SourceError::configuration("missing url"));

        assert_eq!(source.id(), "broken");
        assert_eq!(source.kind(), "error");

        let err = source.collect(&http).await.unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::ConfigurationError);
        assert_eq!(err.source_id(), Some("broken"));
    }
}
