//! One feed-building run: fetch, normalize, classify, deduplicate, write.

use std::fmt;

use chrono::{DateTime, Utc};
use eventfeeds_core::{Classifier, Deduplicator, EventRecord};
use eventfeeds_sources::{CacheStore, HttpFetcher, Normalizer, SourceErrorCode, build_source};
use tracing::{info, warn};

use crate::config::FeedsConfig;
use crate::error::{FeedError, FeedResult};
use crate::feed::{FeedWriter, WrittenFeed};

/// Per-invocation switches that do not belong in the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Ignore the cache file and start empty.
    pub clear_cache: bool,
    /// Reference time for relative dates, the horizon and DTSTAMP.
    pub now: DateTime<Utc>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            clear_cache: false,
            now: Utc::now(),
        }
    }
}

/// How one source fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// Candidates collected and records kept after normalization.
    Ok { candidates: usize, events: usize },
    Failed { code: SourceErrorCode, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub id: String,
    pub kind: &'static str,
    pub status: SourceStatus,
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, SourceStatus::Ok { .. })
    }
}

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceOutcome>,
    /// Records after deduplication.
    pub events: usize,
    pub feeds: Vec<WrittenFeed>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.sources.iter().filter(|s| !s.is_ok()).count()
    }

    fn log(&self) {
        for outcome in &self.sources {
            match &outcome.status {
                SourceStatus::Ok { candidates, events } => {
                    info!(source = %outcome.id, kind = outcome.kind, candidates, events, "source ok")
                }
                SourceStatus::Failed { code, message } => {
                    warn!(source = %outcome.id, kind = outcome.kind, code = %code, error = %message, "source failed")
                }
            }
        }
        info!(
            sources = self.sources.len(),
            failed = self.failed(),
            events = self.events,
            feeds = self.feeds.len(),
            "run complete"
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.sources {
            match &outcome.status {
                SourceStatus::Ok { candidates, events } => writeln!(
                    f,
                    "ok    {} ({}): {} events from {} candidates",
                    outcome.id, outcome.kind, events, candidates
                )?,
                SourceStatus::Failed { code, message } => {
                    writeln!(f, "FAIL  {} ({}): {}: {}", outcome.id, outcome.kind, code, message)?
                }
            }
        }
        write!(
            f,
            "{} events, {} of {} sources failed",
            self.events,
            self.failed(),
            self.sources.len()
        )
    }
}

/// Runs every enabled source and writes the feeds.
///
/// A failing source is logged and skipped. The run fails when the
/// configuration is unusable, when every enabled source failed (existing
/// feeds are then left untouched) or when a feed cannot be written.
pub async fn run(config: &FeedsConfig, options: &RunOptions) -> FeedResult<RunSummary> {
    let tz = config.time.tz()?;
    let classifier = Classifier::new(&config.classify)?;
    let deduplicator = Deduplicator::new(config.dedupe.clone(), tz);

    let mut normalizer = Normalizer::new(tz)
        .with_now(options.now)
        .with_default_duration(config.time.default_duration());
    if let Some(window) = config.time.window(options.now) {
        normalizer = normalizer.with_window(window);
    }

    let cache = CacheStore::open(&config.cache, options.clear_cache);
    let http = HttpFetcher::new(config.http.clone(), cache)?.with_cache_config(&config.cache);

    let mut summary = RunSummary::default();
    let mut records: Vec<EventRecord> = Vec::new();

    for spec in config.enabled_sources() {
        let source = build_source(spec);
        info!(source = %spec.id, kind = source.kind(), "collecting");
        let status = match source.collect(&http).await {
            Ok(raws) => {
                let normalized = normalizer.normalize_all(&raws, spec.priority);
                let status = SourceStatus::Ok {
                    candidates: raws.len(),
                    events: normalized.len(),
                };
                records.extend(normalized);
                status
            }
            Err(e) => {
                warn!(source = %spec.id, code = %e.code(), error = %e, "source failed, skipping");
                SourceStatus::Failed {
                    code: e.code(),
                    message: e.message().to_string(),
                }
            }
        };
        summary.sources.push(SourceOutcome {
            id: spec.id.clone(),
            kind: spec.kind.name(),
            status,
        });
    }

    if let Err(e) = http.save_cache().await {
        warn!(error = %e, "failed to save cache");
    }

    if summary.sources.is_empty() {
        warn!("no enabled sources configured");
    } else if summary.failed() == summary.sources.len() {
        summary.log();
        return Err(FeedError::AllSourcesFailed(summary.sources.len()));
    }

    classifier.tag_all(&mut records);
    let records = deduplicator.dedupe(records);
    summary.events = records.len();

    let writer = FeedWriter::new(&config.output, config.time.default_duration()).with_dtstamp(options.now);
    summary.feeds = writer.write_all(&records)?;

    summary.log();
    Ok(summary)
}
