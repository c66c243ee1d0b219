//! Cached, polite HTTP fetching shared by every source adapter.
//!
//! - `data:` URLs are decoded locally
//! - robots.txt is honoured, except for allowlisted feed endpoints
//! - conditional GET (`If-None-Match` / `If-Modified-Since`) against the
//!   [`CacheStore`]; a 304 serves the cached body
//! - 429, 5xx and network failures are retried with exponential backoff
//! - a jittered delay follows every network fetch

pub mod data_url;
pub mod robots;

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::header::{
    ACCEPT_LANGUAGE, AUTHORIZATION, ETAG, HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, LAST_MODIFIED, REFERER,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::cache::{CacheConfig, CacheStore, cache_key};
use crate::error::{SourceError, SourceErrorCode, SourceResult};
use crate::raw_event::RawDocument;

use self::data_url::{decode_data_url, is_data_url};
use self::robots::{DEFAULT_ALLOWLIST, RobotsGuard};

/// HTTP settings, the `[http]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Lower bound of the pause after each network fetch.
    pub throttle_min_ms: u64,
    /// Upper bound of the pause after each network fetch.
    pub throttle_max_ms: u64,
    pub respect_robots: bool,
    /// URL substrings that skip the robots check.
    pub robots_allowlist: Vec<String>,
}

impl HttpConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
    pub const DEFAULT_THROTTLE_MIN_MS: u64 = 2_000;
    pub const DEFAULT_THROTTLE_MAX_MS: u64 = 5_000;

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the pause range after each network fetch.
    pub fn with_throttle_ms(mut self, min: u64, max: u64) -> Self {
        self.throttle_min_ms = min;
        self.throttle_max_ms = max;
        self
    }

    /// Sets the retry policy.
    pub fn with_retries(mut self, max_attempts: u32, initial_backoff_ms: u64) -> Self {
        self.max_attempts = max_attempts;
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Turns the robots.txt check on or off.
    pub fn with_robots(mut self, respect: bool) -> Self {
        self.respect_robots = respect;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff before retry number `retry` (0-based): doubles from the
    /// initial delay up to the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("eventfeeds/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: Self::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: Self::DEFAULT_MAX_BACKOFF_MS,
            throttle_min_ms: Self::DEFAULT_THROTTLE_MIN_MS,
            throttle_max_ms: Self::DEFAULT_THROTTLE_MAX_MS,
            respect_robots: true,
            robots_allowlist: DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A single GET request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub source_id: String,
    pub url: String,
    /// Bearer token sent as `Authorization`.
    pub bearer: Option<String>,
    /// Overrides the configured user agent.
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub accept: Option<&'static str>,
}

impl FetchRequest {
    pub fn new(source_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            bearer: None,
            user_agent: None,
            referer: None,
            accept: None,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = Some(accept);
        self
    }

    fn authorization(&self) -> Option<String> {
        self.bearer.as_ref().map(|t| format!("Bearer {}", t))
    }
}

/// The shared fetcher: one reqwest client, the cache and the robots guard.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
    cache: Mutex<CacheStore>,
    robots: RobotsGuard,
    fresh_for: Option<chrono::Duration>,
}

impl HttpFetcher {
    /// Creates a fetcher around an opened cache.
    pub fn new(config: HttpConfig, cache: CacheStore) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| SourceError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            robots: RobotsGuard::new(config.robots_allowlist.clone()),
            client,
            config,
            cache: Mutex::new(cache),
            fresh_for: None,
        })
    }

    /// Serves cached bodies without a request while they are younger than
    /// the configured window.
    pub fn with_cache_config(mut self, cache: &CacheConfig) -> Self {
        self.fresh_for = cache.fresh_for();
        self
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Fetches `url` for `source_id` with default headers.
    pub async fn get(&self, source_id: &str, url: &str) -> SourceResult<RawDocument> {
        self.fetch(FetchRequest::new(source_id, url)).await
    }

    /// Fetches a document, going through the cache and robots guard.
    pub async fn fetch(&self, request: FetchRequest) -> SourceResult<RawDocument> {
        let url = request.url.as_str();

        if is_data_url(url) {
            let body = decode_data_url(url).map_err(|e| e.with_source_id(&request.source_id))?;
            debug!(source = %request.source_id, len = body.len(), "decoded data: URL");
            return Ok(RawDocument::new(&request.source_id, url, body));
        }

        let user_agent = request
            .user_agent
            .clone()
            .unwrap_or_else(|| self.config.user_agent.clone());

        if self.config.respect_robots && !self.robots.allowed(&self.client, url, &user_agent).await {
            return Err(SourceError::robots_disallowed(url).with_source_id(&request.source_id));
        }

        let authorization = request.authorization();
        let key = cache_key(url, authorization.as_deref(), &user_agent);
        let cached = self.cache.lock().await.get(&key).cloned();

        if let (Some(entry), Some(max_age)) = (&cached, self.fresh_for)
            && entry.is_fresh(max_age, Utc::now())
        {
            debug!(url = %url, "serving fresh cache entry");
            let mut doc = RawDocument::new(&request.source_id, url, entry.body.clone());
            doc.fetched_at = entry.fetched_at;
            doc.from_cache = true;
            return Ok(doc);
        }

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, reqwest::header::USER_AGENT, &user_agent);
        insert_header(&mut headers, ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        if let Some(ref auth) = authorization {
            insert_header(&mut headers, AUTHORIZATION, auth);
        }
        if let Some(ref referer) = request.referer {
            insert_header(&mut headers, REFERER, referer);
        }
        if let Some(accept) = request.accept {
            insert_header(&mut headers, reqwest::header::ACCEPT, accept);
        }
        if let Some(ref entry) = cached {
            if let Some(ref etag) = entry.etag {
                insert_header(&mut headers, IF_NONE_MATCH, etag);
            }
            if let Some(ref modified) = entry.last_modified {
                insert_header(&mut headers, IF_MODIFIED_SINCE, modified);
            }
        }

        let response = self.send_with_retries(url, headers).await;
        self.throttle().await;
        let response = response.map_err(|e| e.with_source_id(&request.source_id))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            let Some(entry) = cached else {
                return Err(SourceError::invalid_response(format!(
                    "{} answered 304 without a cached copy",
                    url
                ))
                .with_source_id(&request.source_id));
            };
            debug!(url = %url, "HTTP 304, serving cached body");
            self.cache.lock().await.touch(&key);
            let mut doc = RawDocument::new(&request.source_id, url, entry.body);
            doc.not_modified = true;
            return Ok(doc);
        }

        let etag = header_string(&response, ETAG);
        let last_modified = header_string(&response, LAST_MODIFIED);
        let body = self
            .handle_response(response)
            .await
            .map_err(|e| e.with_source_id(&request.source_id))?;

        debug!(url = %url, len = body.len(), etag = ?etag, "HTTP 200");
        self.cache.lock().await.store(key, etag, last_modified, &body);
        Ok(RawDocument::new(&request.source_id, url, body))
    }

    /// Sends the request, retrying transient failures.
    ///
    /// Returns the last response for non-retryable statuses so the caller
    /// can map it; retryable failures that exhaust the attempts become errors.
    async fn send_with_retries(&self, url: &str, headers: HeaderMap) -> SourceResult<Response> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            trace!(url = %url, attempt, "sending request");
            let result = self
                .client
                .get(url)
                .headers(headers.clone())
                .send()
                .await
                .map_err(|e| SourceError::network(format!("Request failed: {}", e)).with_source(e))
                .and_then(|response| match retryable_status(response.status()) {
                    Some(code) => Err(SourceError::new(
                        code,
                        format!("{} answered {}", url, response.status()),
                    )),
                    None => Ok(response),
                });

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(url = %url, error = %e, retry_in_ms = delay.as_millis() as u64, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Maps the final status to a body or a typed error.
    async fn handle_response(&self, response: Response) -> SourceResult<String> {
        let status = response.status();
        trace!(status = %status, "Received response");

        match status {
            s if s.is_success() => response
                .text()
                .await
                .map_err(|e| SourceError::network(format!("Failed to read response: {}", e))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(SourceError::access_denied(format!("{} answered {}", response.url(), status)))
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(SourceError::not_found(format!("{} answered {}", response.url(), status)))
            }
            s => {
                let url = response.url().to_string();
                let body = response.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                warn!(status = %s, url = %url, body = %snippet, "Unexpected response status");
                Err(SourceError::invalid_response(format!("Unexpected status {} from {}", s, url)))
            }
        }
    }

    async fn throttle(&self) {
        let min = self.config.throttle_min_ms;
        let max = self.config.throttle_max_ms.max(min);
        if max == 0 {
            return;
        }
        let ms = rand::rng().random_range(min..=max);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Writes the cache back to disk.
    pub async fn save_cache(&self) -> SourceResult<()> {
        self.cache.lock().await.save()
    }
}

fn retryable_status(status: StatusCode) -> Option<SourceErrorCode> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Some(SourceErrorCode::RateLimited)
    } else if status.is_server_error() {
        Some(SourceErrorCode::ServerError)
    } else {
        None
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => warn!(header = %name, "dropping header with invalid characters"),
    }
}

fn header_string(response: &Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
