//! Custom error types for translation operations

use thiserror::Error;

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Input text is empty or only whitespace
    #[error("Input sentence is empty.")]
    EmptyInput,

    /// Tokenizer produced no tokens for the input
    #[error("Input sentence is empty or too long.")]
    NoTokens,

    /// Input is longer than the model accepts; reported through the
    /// translation catch-all, hence the prefix
    #[error("Error during translation: Input sentence length ({length}) exceeds the maximum allowed length.")]
    TooLong {
        /// Characters in the input
        length: usize,
        /// Largest accepted character count
        limit: usize,
    },

    /// Tokenization failed
    #[error("Error during translation: {0}")]
    Encoding(String),

    /// Model inference or beam search failed
    #[error("Error during translation: {0}")]
    Generation(String),

    /// Detokenization failed
    #[error("Error during translation: {0}")]
    Decoding(String),

    /// Request body could not be understood
    #[error("{0}")]
    MalformedRequest(String),

    /// Line read from the console failed validation
    #[error("Error 001: {0}, Check input sentence.")]
    ConsoleInput(String),

    /// Model artifacts could not be loaded
    #[error("Model load error: {message}")]
    ModelLoad {
        /// What failed to load and why
        message: String,
    },

    /// Model artifact download failed
    #[error("Download error: {url} - {message}")]
    Download {
        /// Requested file URL
        url: String,
        /// Transport or HTTP status failure
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Offending key or parse failure
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TranslationError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TranslationError::EmptyInput => "empty_input",
            TranslationError::NoTokens => "no_tokens",
            TranslationError::TooLong { .. } => "input_too_long",
            TranslationError::MalformedRequest(_) => "malformed_request",
            TranslationError::Encoding(_)
            | TranslationError::Generation(_)
            | TranslationError::Decoding(_) => "translation_failed",
            _ => "internal_error",
        }
    }

    /// Whether the error was caused by the caller's input rather than the service
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TranslationError::EmptyInput
                | TranslationError::NoTokens
                | TranslationError::TooLong { .. }
                | TranslationError::MalformedRequest(_)
                | TranslationError::ConsoleInput(_)
        )
    }

    /// Whether the error happened inside tokenization, generation or decoding
    pub fn is_inference_error(&self) -> bool {
        matches!(
            self,
            TranslationError::Encoding(_)
                | TranslationError::Generation(_)
                | TranslationError::Decoding(_)
        )
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(err: config::ConfigError) -> Self {
        TranslationError::ConfigError {
            message: err.to_string(),
        }
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_wire_text() {
        assert_eq!(TranslationError::EmptyInput.to_string(), "Input sentence is empty.");
        assert_eq!(
            TranslationError::NoTokens.to_string(),
            "Input sentence is empty or too long."
        );
        assert_eq!(
            TranslationError::TooLong { length: 200, limit: 148 }.to_string(),
            "Error during translation: Input sentence length (200) exceeds the maximum allowed length."
        );
        assert_eq!(
            TranslationError::Generation("boom".to_string()).to_string(),
            "Error during translation: boom"
        );
        assert_eq!(
            TranslationError::ConsoleInput("Input is too long.".to_string()).to_string(),
            "Error 001: Input is too long., Check input sentence."
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(TranslationError::EmptyInput.is_input_error());
        assert!(TranslationError::TooLong { length: 1, limit: 0 }.is_input_error());
        assert!(!TranslationError::Decoding("x".to_string()).is_input_error());
        assert!(TranslationError::Encoding("x".to_string()).is_inference_error());
        assert_eq!(TranslationError::NoTokens.code(), "no_tokens");
        assert_eq!(
            TranslationError::ModelLoad { message: "x".to_string() }.code(),
            "internal_error"
        );
    }
}
