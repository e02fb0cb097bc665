use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use trends_tracker::cli::{Cli, CliHandler};
use trends_tracker::logging::initialize_logging;
use trends_tracker::TrackerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config =
        TrackerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    initialize_logging(&config.logging)?;
    info!("Starting NFL fantasy trends tracker");

    let handler = CliHandler::new(config);
    if let Err(e) = handler.handle_command(cli.command).await {
        error!("Command failed: {:#}", e);
        return Err(e);
    }

    Ok(())
}
