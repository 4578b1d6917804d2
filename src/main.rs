//! Tripwright CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use tripwright::cli::{commands, handle_error, Cli, Commands};
use tripwright::infrastructure::logging::{LogConfig, LoggerImpl};
use tripwright::ConfigLoader;

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")?;

    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))
        .context("Failed to initialize logging")?;

    match cli.command {
        Commands::Check(args) => commands::check::execute(args, cli.json).await,
        Commands::Plan(args) => commands::plan::execute(args, &config, cli.json).await,
        Commands::Config(args) => commands::config::execute(&args, &config, cli.json),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(&err, json_mode);
    }
}
