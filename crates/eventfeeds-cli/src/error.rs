//! CLI error types.

use std::path::PathBuf;

use eventfeeds_core::ClassifyError;
use eventfeeds_sources::SourceError;
use thiserror::Error;

/// Result type for CLI operations.
pub type FeedResult<T> = Result<T, FeedError>;

/// Errors that end a run with a nonzero exit status.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The configuration file could not be read or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configuration file could not be parsed.
    #[error("failed to parse {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A classifier rule failed to compile.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Shared HTTP setup failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Every enabled source failed.
    #[error("all {0} enabled sources failed")]
    AllSourcesFailed(usize),

    /// A feed file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
