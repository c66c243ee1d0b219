//! Core types: event records, time parsing, text cleanup, classification,
//! deduplication

pub mod classify;
pub mod dedupe;
pub mod event;
pub mod text;
pub mod time;
pub mod tracing;
pub mod when;

pub use classify::{Classifier, ClassifierConfig, ClassifierRule, ClassifyError, builtin_rules};
pub use dedupe::{DedupeConfig, Deduplicator, title_similarity};
pub use event::{CategoryTag, EventRecord, UNTITLED, UnknownCategory};
pub use time::{DEFAULT_TIMEZONE, EventTime, TimeWindow, parse_datetime, resolve_timezone};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use when::{When, parse_when};
