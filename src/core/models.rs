//! Core data models for translation

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::errors::{Result, TranslationError};

/// Translation request as received from a client.
///
/// `text` stays optional so a missing key reaches validation instead of
/// failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Creole sentence to translate
    pub text: Option<String>,
}

impl TranslationRequest {
    /// Request carrying `text`
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    /// Borrow the text, rejecting requests that did not carry one
    pub fn require_text(&self) -> Result<&str> {
        self.text
            .as_deref()
            .ok_or_else(|| TranslationError::MalformedRequest("Missing required field: text".to_string()))
    }
}

/// Decoding parameters for beam-search generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Token budget for both the truncated source and the generated output
    pub max_length: usize,
    /// Beam width
    pub num_beams: usize,
    /// Exponent applied to hypothesis length when ranking finished beams
    pub length_penalty: f32,
    /// 0 disables n-gram suppression
    pub no_repeat_ngram_size: usize,
    /// EOS is banned until the output reaches this many tokens
    pub min_length: usize,
    /// Falls back to the model's config.json when unset
    pub early_stopping: Option<bool>,
    /// Characters tolerated beyond `max_length` before input is rejected
    pub length_slack: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 128,
            num_beams: 5,
            length_penalty: 0.6,
            no_repeat_ngram_size: 2,
            min_length: 0,
            early_stopping: None,
            length_slack: 20,
        }
    }
}

impl GenerationConfig {
    /// Longest input, in characters, accepted for a given token budget
    pub fn max_input_chars(&self, max_length: usize) -> usize {
        max_length + self.length_slack
    }
}

/// Subset of a Hugging Face `config.json` needed for decoding
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Id of `<s>`
    #[serde(default = "default_bos")]
    pub bos_token_id: u32,
    /// Id of `</s>`
    #[serde(default = "default_eos")]
    pub eos_token_id: u32,
    /// First token fed to the decoder
    #[serde(default = "default_eos")]
    pub decoder_start_token_id: u32,
    /// Token forced as the first generated token
    #[serde(default)]
    pub forced_bos_token_id: Option<u32>,
    /// Token forced when the length budget is reached
    #[serde(default)]
    pub forced_eos_token_id: Option<u32>,
    /// Stop as soon as enough hypotheses finish
    #[serde(default)]
    pub early_stopping: Option<bool>,
    /// Shortest output before EOS is allowed
    #[serde(default)]
    pub min_length: Option<usize>,
}

fn default_bos() -> u32 {
    0
}

fn default_eos() -> u32 {
    2
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            bos_token_id: default_bos(),
            eos_token_id: default_eos(),
            decoder_start_token_id: default_eos(),
            forced_bos_token_id: None,
            forced_eos_token_id: None,
            early_stopping: None,
            min_length: None,
        }
    }
}

impl ModelConfig {
    /// Parse a `config.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TranslationError::ModelLoad {
            message: format!("{}: {}", path.display(), e),
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Special token ids used by the tokenizer and decoder
    pub fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens {
            bos: self.bos_token_id,
            eos: self.eos_token_id,
            decoder_start: self.decoder_start_token_id,
            forced_bos: self.forced_bos_token_id,
            forced_eos: self.forced_eos_token_id,
        }
    }

    /// Fill generation settings the service config left open
    pub fn apply_defaults(&self, generation: &mut GenerationConfig) {
        if generation.early_stopping.is_none() {
            generation.early_stopping = self.early_stopping;
        }
        if generation.min_length == 0 {
            if let Some(min_length) = self.min_length {
                generation.min_length = min_length;
            }
        }
    }
}

/// Resolved special token ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    /// Sentence start, prepended to encoder input
    pub bos: u32,
    /// Sentence end
    pub eos: u32,
    /// Seeds every decoder sequence
    pub decoder_start: u32,
    /// Forced at the first generation step
    pub forced_bos: Option<u32>,
    /// Forced at the last generation step
    pub forced_eos: Option<u32>,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        ModelConfig::default().special_tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_length, 128);
        assert_eq!(config.num_beams, 5);
        assert_eq!(config.no_repeat_ngram_size, 2);
        assert!((config.length_penalty - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.max_input_chars(128), 148);
    }

    #[test]
    fn test_model_config_parses_bart_json() {
        let json = r#"{
            "model_type": "bart",
            "vocab_size": 50265,
            "bos_token_id": 0,
            "pad_token_id": 1,
            "eos_token_id": 2,
            "decoder_start_token_id": 2,
            "forced_bos_token_id": 0,
            "forced_eos_token_id": 2,
            "early_stopping": true,
            "num_beams": 4
        }"#;
        let config: ModelConfig = serde_json::from_str(json).unwrap();
        let tokens = config.special_tokens();
        assert_eq!(tokens.decoder_start, 2);
        assert_eq!(tokens.forced_bos, Some(0));
        assert_eq!(tokens.forced_eos, Some(2));

        let mut generation = GenerationConfig::default();
        config.apply_defaults(&mut generation);
        assert_eq!(generation.early_stopping, Some(true));
        assert_eq!(generation.num_beams, 5);
    }

    #[test]
    fn test_model_config_defaults_when_fields_missing() {
        let config: ModelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.special_tokens(), SpecialTokens::default());
        assert_eq!(config.forced_bos_token_id, None);
    }

    #[test]
    fn test_request_requires_text() {
        let request: TranslationRequest = serde_json::from_str(r#"{"other": 1}"#).unwrap();
        let err = request.require_text().unwrap_err();
        assert!(matches!(err, TranslationError::MalformedRequest(_)));

        let request = TranslationRequest::new("Bonjou");
        assert_eq!(request.require_text().unwrap(), "Bonjou");
    }
}
