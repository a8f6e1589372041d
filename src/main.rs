//! Main entry point for the Creole Translator CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use creole_translator::cli::commands::{self, Commands};
use creole_translator::ServiceConfig;

/// Creole Translator - Haitian Creole to English translation service
#[derive(Parser, Debug)]
#[command(name = "creole-translator", version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("creole_translator={log_level},tower_http={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::load(args.config.as_deref())?;

    // Execute command
    match args.command.unwrap_or_default() {
        Commands::Serve { host, port, legacy } => {
            commands::handle_serve(config, host, port, legacy).await?;
        }
        Commands::Translate { text, max_length } => {
            commands::handle_translate(config, text, max_length).await?;
        }
        Commands::Download => {
            commands::handle_download(config).await?;
        }
    }

    Ok(())
}
