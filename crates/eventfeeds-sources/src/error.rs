//! Error types for fetching and parsing event sources.

use std::fmt;
use thiserror::Error;

/// The category of a source error.
///
/// Used for retry decisions in the HTTP layer and for the per-source
/// summary logged at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorCode {
    /// Connection failed, timed out or the body could not be read.
    NetworkError,
    /// The server answered 429.
    RateLimited,
    /// The server answered with a 5xx status.
    ServerError,
    /// The server refused access (401/403).
    AccessDenied,
    /// The page or feed does not exist (404/410).
    NotFound,
    /// Any other unexpected status.
    InvalidResponse,
    /// The body could not be parsed as the expected format.
    ParseError,
    /// robots.txt disallows the URL for our user agent.
    RobotsDisallowed,
    /// The source entry is missing something it needs (app id, URL, selector).
    ConfigurationError,
    /// The cache file could not be read or written.
    CacheError,
    /// Unexpected internal state.
    InternalError,
}

impl SourceErrorCode {
    /// Returns true if this error is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns the snake_case name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::AccessDenied => "access_denied",
            Self::NotFound => "not_found",
            Self::InvalidResponse => "invalid_response",
            Self::ParseError => "parse_error",
            Self::RobotsDisallowed => "robots_disallowed",
            Self::ConfigurationError => "configuration_error",
            Self::CacheError => "cache_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for SourceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while fetching or extracting one source.
#[derive(Debug, Error)]
pub struct SourceError {
    code: SourceErrorCode,
    message: String,
    /// Id of the configured source, when known.
    source_id: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SourceError {
    /// Creates a new error with the given code and message.
    pub fn new(code: SourceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source_id: None,
            source: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::ServerError, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::AccessDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::NotFound, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::InvalidResponse, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::ParseError, message)
    }

    pub fn robots_disallowed(url: &str) -> Self {
        Self::new(
            SourceErrorCode::RobotsDisallowed,
            format!("robots.txt disallows {url}"),
        )
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::ConfigurationError, message)
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::CacheError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::InternalError, message)
    }

    /// Tags the error with the configured source it came from.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> SourceErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref id) = self.source_id {
            write!(f, "[{}] ", id)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
