//! CLI command definitions and handlers

use std::sync::Arc;

use clap::Subcommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::core::config::ServiceConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::hub::resolve_artifacts;
use crate::core::translator::Translator;

/// Longest sentence accepted on standard input
pub const MAX_CONSOLE_INPUT_CHARS: usize = 150;

/// Commands for the Creole translator
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP translation service (default)
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Answer every request with HTTP 200 like older clients expect
        #[arg(long)]
        legacy: bool,
    },

    /// Translate a sentence, or each line of standard input
    Translate {
        /// Creole sentence; read from stdin when omitted
        text: Option<String>,

        /// Token budget for this run
        #[arg(long)]
        max_length: Option<usize>,
    },

    /// Download model artifacts into the local cache
    Download,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve {
            host: None,
            port: None,
            legacy: false,
        }
    }
}

/// Handle serve command
pub async fn handle_serve(
    mut config: ServiceConfig,
    host: Option<String>,
    port: Option<u16>,
    legacy: bool,
) -> anyhow::Result<()> {
    use crate::server::api::run_server;

    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if legacy {
        config.legacy_responses = true;
    }
    config.validate()?;

    println!("🚀 Server starting on http://{}", config.bind_address());

    run_server(config).await
}

/// Handle translate command
pub async fn handle_translate(
    config: ServiceConfig,
    text: Option<String>,
    max_length: Option<usize>,
) -> anyhow::Result<()> {
    let max_length = max_length.unwrap_or(config.generation.max_length);
    if max_length == 0 {
        anyhow::bail!("--max-length must be greater than 0");
    }

    let translator = Arc::new(load_translator(&config).await?);

    if let Some(text) = text {
        let translated = translate_blocking(&translator, text, max_length).await?;
        println!("{}", translated);
        return Ok(());
    }

    info!("Reading sentences from standard input");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut failed = 0usize;

    while let Some(line) = lines.next_line().await? {
        let sentence = match validate_console_input(&line) {
            Ok(sentence) => sentence.to_string(),
            Err(e) => {
                eprintln!("{}", e);
                failed += 1;
                continue;
            }
        };

        match translate_blocking(&translator, sentence, max_length).await {
            Ok(translated) => println!("{}", translated),
            Err(e) => {
                eprintln!("{}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        info!("{} line(s) could not be translated", failed);
    }

    Ok(())
}

/// Handle download command
pub async fn handle_download(config: ServiceConfig) -> anyhow::Result<()> {
    let artifacts = resolve_artifacts(&config.model, true).await?;

    println!("✅ Model artifacts ready:");
    for path in artifacts.paths() {
        println!("   {}", path.display());
    }

    Ok(())
}

/// Check one raw line of console input, without its line terminator.
///
/// Only the length is checked here; blank lines are left to the translator.
pub fn validate_console_input(line: &str) -> Result<&str> {
    if line.is_empty() {
        return Err(TranslationError::ConsoleInput("Input is empty.".to_string()));
    }
    if line.chars().count() > MAX_CONSOLE_INPUT_CHARS {
        return Err(TranslationError::ConsoleInput("Input is too long.".to_string()));
    }
    Ok(line)
}

async fn load_translator(config: &ServiceConfig) -> anyhow::Result<Translator> {
    let artifacts = resolve_artifacts(&config.model, true).await?;
    let config = config.clone();
    let translator =
        tokio::task::spawn_blocking(move || Translator::load(&config, &artifacts)).await??;
    Ok(translator)
}

async fn translate_blocking(
    translator: &Arc<Translator>,
    text: String,
    max_length: usize,
) -> anyhow::Result<String> {
    let translator = Arc::clone(translator);
    let translated =
        tokio::task::spawn_blocking(move || translator.translate_with_max_length(&text, max_length))
            .await??;
    Ok(translated)
}
