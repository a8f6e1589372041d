//! Creole Translator - Haitian Creole to English translation service
//!
//! This library loads a BART sequence-to-sequence model exported to ONNX,
//! translates sentences with beam search, and serves them over HTTP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod core;
pub mod server;

// Re-export key types for convenience
pub use crate::core::{
    config::{ModelSource, ServiceConfig},
    errors::TranslationError,
    hub::{ModelArtifacts, ModelHub},
    models::{GenerationConfig, TranslationRequest},
    tokenizer::BartTokenizer,
    translator::Translator,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
