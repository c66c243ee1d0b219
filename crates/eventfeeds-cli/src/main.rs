//! eventfeeds CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use eventfeeds_core::{TracingConfig, init_tracing};

use eventfeeds_cli::cli::Cli;
use eventfeeds_cli::commands;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::for_cli(cli.debug, cli.json_logs)) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match commands::dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
