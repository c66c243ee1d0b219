//! Subcommand implementations.

pub mod config;
pub mod run;
pub mod sources;

use crate::cli::{Cli, Command, ConfigAction};
use crate::config::FeedsConfig;
use crate::error::FeedResult;

/// Runs the command selected on the command line.
///
/// `config path` is answered before the file is read, so it still works
/// when the file does not parse.
pub async fn dispatch(cli: Cli) -> FeedResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(FeedsConfig::default_path);
    if let Some(Command::Config {
        action: ConfigAction::Path,
    }) = cli.command
    {
        return config::path(&config_path);
    }

    let config = match cli.config {
        Some(ref path) => FeedsConfig::load_from(path)?,
        None => FeedsConfig::load()?,
    };

    match cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => config::dump(&config, &config_path),
            ConfigAction::Validate => config::validate(&config),
            ConfigAction::Path => config::path(&config_path),
        },
        Some(Command::Sources) => sources::list(&config),
        Some(Command::Run) | None => run::run(config, cli.output_dir, cli.clear_cache).await,
    }
}
