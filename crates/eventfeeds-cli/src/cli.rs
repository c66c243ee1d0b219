//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CONFIG_ENV;

/// eventfeeds - regional event listings as calendar subscriptions
#[derive(Debug, Parser)]
#[command(name = "eventfeeds")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', env = "FEEDS_DEBUG", value_parser = clap::builder::FalseyValueParser::new())]
    pub debug: bool,

    /// Log one JSON object per line
    #[arg(long)]
    pub json_logs: bool,

    /// Ignore the cache file and fetch everything again
    #[arg(long, env = "FEEDS_CLEAR_CACHE", value_parser = clap::builder::FalseyValueParser::new())]
    pub clear_cache: bool,

    /// Write feeds here instead of the configured directory
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every source and write the feeds (the default)
    Run,

    /// List configured sources
    Sources,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
