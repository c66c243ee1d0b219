//! `eventfeeds run`: build and write the feeds.

use std::path::PathBuf;

use crate::config::FeedsConfig;
use crate::error::FeedResult;
use crate::pipeline::{self, RunOptions};

/// Runs the pipeline and prints the per-source summary.
pub async fn run(mut config: FeedsConfig, output_dir: Option<PathBuf>, clear_cache: bool) -> FeedResult<()> {
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }
    config.validate()?;

    let options = RunOptions {
        clear_cache,
        ..Default::default()
    };
    let summary = pipeline::run(&config, &options).await?;
    println!("{}", summary);
    for feed in &summary.feeds {
        println!("wrote {} ({} events)", feed.path.display(), feed.events);
    }
    Ok(())
}
