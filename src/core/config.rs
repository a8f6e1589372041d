//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::GenerationConfig;

/// Hub repository holding the Creole→English BART export
pub const DEFAULT_REPO_ID: &str = "imchris/BART-creole-to-english";

/// Public Hugging Face endpoint
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Prefix for environment overrides, e.g. `CREOLE_PORT` or `CREOLE_MODEL__REVISION`
pub const ENV_PREFIX: &str = "CREOLE";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port to listen on
    pub port: u16,
    /// Answer every request with HTTP 200 and the legacy response shapes
    pub legacy_responses: bool,
    /// Where the model comes from
    pub model: ModelSource,
    /// Beam-search settings
    pub generation: GenerationConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            legacy_responses: false,
            model: ModelSource::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Where the model artifacts come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSource {
    /// Hub repository, `owner/name`
    pub repo_id: String,
    /// Branch, tag or commit to download
    pub revision: String,
    /// Use an already-exported model directory instead of the hub
    pub local_dir: Option<PathBuf>,
    /// Root of the download cache
    pub cache_dir: PathBuf,
    /// Base URL of the model hub
    pub hub_endpoint: String,
    /// Falls back to `HF_TOKEN`
    pub hub_token: Option<String>,
    /// Encoder graph, relative to the repository root
    pub encoder_file: String,
    /// Decoder graph, relative to the repository root
    pub decoder_file: String,
    /// ONNX Runtime threads per session
    pub intra_threads: usize,
}

impl Default for ModelSource {
    fn default() -> Self {
        let cache_dir = std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".cache").join("creole-translator"))
            .unwrap_or_else(|_| PathBuf::from("models"));

        Self {
            repo_id: DEFAULT_REPO_ID.to_string(),
            revision: "main".to_string(),
            local_dir: None,
            cache_dir,
            hub_endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            hub_token: None,
            encoder_file: "encoder_model.onnx".to_string(),
            decoder_file: "decoder_model.onnx".to_string(),
            intra_threads: 4,
        }
    }
}

impl ServiceConfig {
    /// Load configuration: defaults, then the optional file, then `CREOLE_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if config.model.hub_token.is_none() {
            config.model.hub_token = std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(config_error("host is required"));
        }

        let generation = &self.generation;
        if generation.max_length == 0 {
            return Err(config_error("generation.max_length must be greater than 0"));
        }

        if generation.num_beams == 0 {
            return Err(config_error("generation.num_beams must be greater than 0"));
        }

        if !generation.length_penalty.is_finite() {
            return Err(config_error("generation.length_penalty must be a finite number"));
        }

        if generation.min_length > generation.max_length {
            return Err(config_error("generation.min_length cannot exceed generation.max_length"));
        }

        let model = &self.model;
        if model.local_dir.is_none() {
            if model.repo_id.is_empty() {
                return Err(config_error("model.repo_id is required when model.local_dir is unset"));
            }

            if !model.hub_endpoint.starts_with("http://") && !model.hub_endpoint.starts_with("https://") {
                return Err(config_error("model.hub_endpoint must be an http(s) URL"));
            }
        }

        if model.encoder_file.is_empty() || model.decoder_file.is_empty() {
            return Err(config_error("model.encoder_file and model.decoder_file are required"));
        }

        if model.intra_threads == 0 {
            return Err(config_error("model.intra_threads must be greater than 0"));
        }

        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn config_error(message: &str) -> TranslationError {
    TranslationError::ConfigError {
        message: message.to_string(),
    }
}
