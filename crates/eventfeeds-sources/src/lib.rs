//! Event sources: fetching, extraction and normalization.
//!
//! - [`EventSource`] - The trait every site adapter implements
//! - [`HttpFetcher`] - Shared HTTP client with cache, robots guard and retries
//! - [`extract`] - Format extractors (ICS, RSS/Atom, JSON-LD, microdata, HTML)
//! - [`adapters`] - Per-site adapters selected by configuration
//! - [`Normalizer`] - Candidate records to [`EventRecord`](eventfeeds_core::EventRecord)s
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  ICS / RSS   │   │  HTML pages  │   │  JSON APIs   │
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │   HttpFetcher (cache, robots, retry) │
//!        └──────────────────┼──────────────────┘
//!                           ▼
//!                   ┌──────────────┐
//!                   │ RawDocument  │
//!                   └──────┬───────┘
//!                          ▼ extract
//!                   ┌──────────────┐
//!                   │   RawEvent   │
//!                   └──────┬───────┘
//!                          ▼ Normalizer
//!                   ┌──────────────┐
//!                   │ EventRecord  │
//!                   └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use eventfeeds_sources::{CacheStore, HttpConfig, HttpFetcher, Normalizer, build_source};
//!
//! async fn collect(spec: &SourceSpec) -> SourceResult<Vec<EventRecord>> {
//!     let http = HttpFetcher::new(HttpConfig::default(), CacheStore::in_memory())?;
//!     let raw = build_source(spec).collect(&http).await?;
//!     Ok(Normalizer::new(DEFAULT_TIMEZONE).normalize_all(&raw, spec.priority))
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod error;
pub mod extract;
pub mod http;
pub mod normalize;
pub mod raw_event;
pub mod source;

pub use adapters::{SourceKind, SourceSpec, build_source};
pub use cache::{CacheConfig, CacheEntry, CacheStore};
pub use error::{SourceError, SourceErrorCode, SourceResult};
pub use http::{FetchRequest, HttpConfig, HttpFetcher};
pub use normalize::{Normalizer, stable_id};
pub use raw_event::{RawDocument, RawEvent, RawWhen};
pub use source::{BoxFuture, ErrorSource, EventSource};
