//! `eventfeeds sources`: list configured sources.

use crate::config::FeedsConfig;
use crate::error::FeedResult;

/// One line per source: id, kind, priority and whether it runs.
pub fn render(config: &FeedsConfig) -> String {
    config
        .sources
        .iter()
        .map(|s| {
            format!(
                "{:<20} {:<12} priority {:>3}{}",
                s.id,
                s.kind.name(),
                s.priority,
                if s.enabled { "" } else { "  (disabled)" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn list(config: &FeedsConfig) -> FeedResult<()> {
    if config.sources.is_empty() {
        println!("No sources configured.");
    } else {
        println!("{}", render(config));
    }
    Ok(())
}
