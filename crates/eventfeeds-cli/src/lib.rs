//! CLI, configuration, run pipeline and feed writer
//!
//! This crate provides the `eventfeeds` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod pipeline;

pub use cli::Cli;
pub use config::FeedsConfig;
pub use error::{FeedError, FeedResult};
pub use feed::FeedWriter;
pub use pipeline::{RunOptions, RunSummary};
