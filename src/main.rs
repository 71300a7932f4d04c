//! Main entry point for the application.
//!
//! Parses CLI arguments, initializes logging, loads environment variables
//! and dispatches the requested command against the prompt manager.

use clap::Parser;
use tracing::warn;

use promptdeck::cli::Cli;
use promptdeck::commands;
use promptdeck::utils;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    utils::init_logging(&cli.logging_level, cli.log_to_file);

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Failed to load .env file: {}", e);
        }
    }

    if let Err(e) = commands::dispatch(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
