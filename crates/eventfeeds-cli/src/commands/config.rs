//! Configuration commands.

use std::path::Path;

use crate::config::FeedsConfig;
use crate::error::{FeedError, FeedResult};

/// Dump the effective configuration to stdout.
pub fn dump(config: &FeedsConfig, path: &Path) -> FeedResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| FeedError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# {}", path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &FeedsConfig) -> FeedResult<()> {
    config.validate()?;
    let enabled = config.enabled_sources().count();
    println!(
        "Configuration is valid: {} sources ({} enabled).",
        config.sources.len(),
        enabled
    );
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: &Path) -> FeedResult<()> {
    let state = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("config: {}{}", path.display(), state);
    Ok(())
}
