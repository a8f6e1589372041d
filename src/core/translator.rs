//! Creole→English translator wrapping a tokenizer and an encoder-decoder model

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::core::beam_search::beam_search;
use crate::core::config::ServiceConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::hub::ModelArtifacts;
use crate::core::models::{GenerationConfig, ModelConfig, SpecialTokens};
use crate::core::onnx::OnnxBart;
use crate::core::tokenizer::BartTokenizer;

/// Text ⇄ token id conversion
pub trait TextCodec: Send + Sync {
    /// Encode `text`, truncated to at most `max_length` ids including special tokens
    fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>>;

    /// Decode ids, dropping special tokens
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// Encoder hidden states for one source sentence
#[derive(Debug, Clone, Default)]
pub struct EncoderOutput {
    /// Row-major `[seq_len, hidden_size]`
    pub hidden_states: Vec<f32>,
    /// Source tokens, including BOS and EOS
    pub seq_len: usize,
    /// Model width
    pub hidden_size: usize,
}

/// A sequence-to-sequence model exposed step by step
pub trait Seq2SeqModel: Send {
    /// Run the encoder over one source sequence
    fn encode(&mut self, input_ids: &[u32]) -> Result<EncoderOutput>;

    /// Next-token logits for each decoder sequence; all sequences share a length
    fn next_token_logits(
        &mut self,
        encoder: &EncoderOutput,
        decoder_inputs: &[Vec<u32>],
    ) -> Result<Vec<Vec<f32>>>;
}

/// Process-wide translator: the model is loaded once and shared read-only
pub struct Translator {
    codec: Arc<dyn TextCodec>,
    model: Mutex<Box<dyn Seq2SeqModel>>,
    generation: GenerationConfig,
    tokens: SpecialTokens,
    model_name: String,
}

impl Translator {
    /// Assemble a translator from its parts
    pub fn new(
        codec: Arc<dyn TextCodec>,
        model: Box<dyn Seq2SeqModel>,
        generation: GenerationConfig,
        tokens: SpecialTokens,
    ) -> Self {
        Self {
            codec,
            model: Mutex::new(model),
            generation,
            tokens,
            model_name: "custom".to_string(),
        }
    }

    /// Replace the reported model name
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Build the ONNX-backed translator from resolved artifacts
    pub fn load(config: &ServiceConfig, artifacts: &ModelArtifacts) -> Result<Self> {
        let model_config = ModelConfig::from_file(&artifacts.config)?;
        let tokens = model_config.special_tokens();

        let mut generation = config.generation.clone();
        model_config.apply_defaults(&mut generation);

        let codec = BartTokenizer::from_file(&artifacts.tokenizer, &tokens)?;
        let model = OnnxBart::from_files(
            &artifacts.encoder,
            &artifacts.decoder,
            config.model.intra_threads,
        )?;

        let name = match &config.model.local_dir {
            Some(dir) => dir.display().to_string(),
            None => format!("{}@{}", config.model.repo_id, config.model.revision),
        };
        info!("Translator ready ({}, {} beams)", name, generation.num_beams);

        Ok(Self::new(Arc::new(codec), Box::new(model), generation, tokens).with_model_name(name))
    }

    /// Name reported by the health endpoint
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Translate with the configured token budget
    pub fn translate(&self, text: &str) -> Result<String> {
        self.translate_with_max_length(text, self.generation.max_length)
    }

    /// Validate, encode, generate and decode one sentence.
    ///
    /// The character-length guard runs after encoding, so a long input is
    /// truncated by the tokenizer and still rejected.
    pub fn translate_with_max_length(&self, text: &str, max_length: usize) -> Result<String> {
        if is_blank(text) {
            return Err(TranslationError::EmptyInput);
        }

        let input_ids = self.codec.encode(text, max_length)?;
        if input_ids.is_empty() {
            return Err(TranslationError::NoTokens);
        }

        let length = text.chars().count();
        let limit = self.generation.max_input_chars(max_length);
        if length > limit {
            return Err(TranslationError::TooLong { length, limit });
        }

        debug!("Translating {} source tokens", input_ids.len());
        let output_ids = self.generate(&input_ids, max_length)?;
        self.codec.decode(&output_ids)
    }

    fn generate(&self, input_ids: &[u32], max_length: usize) -> Result<Vec<u32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| TranslationError::Generation("model lock poisoned".to_string()))?;

        let encoder = model.encode(input_ids)?;
        beam_search(&self.generation, max_length, &self.tokens, |beams| {
            model.next_token_logits(&encoder, beams)
        })
    }
}

/// Blank by Python's rules: Unicode whitespace plus the U+001C..=U+001F separators
fn is_blank(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c))
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("model_name", &self.model_name)
            .field("generation", &self.generation)
            .finish()
    }
}

/// In-memory stand-ins for the tokenizer and model
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    const VOCAB: &[&str] = &["<s>", "<pad>", "</s>", "<unk>"];

    /// Whitespace tokenizer that grows its vocabulary as it sees words
    #[derive(Default)]
    pub struct WordCodec {
        words: Mutex<Vec<String>>,
    }

    impl WordCodec {
        fn id_of(&self, word: &str) -> u32 {
            let mut words = self.words.lock().unwrap();
            if let Some(pos) = words.iter().position(|w| w == word) {
                return (pos + VOCAB.len()) as u32;
            }
            words.push(word.to_string());
            (words.len() - 1 + VOCAB.len()) as u32
        }
    }

    impl TextCodec for WordCodec {
        fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>> {
            let content: Vec<u32> = text
                .split(|c: char| c.is_whitespace() || c == ',' || c == '?')
                .filter(|w| !w.is_empty())
                .map(|w| self.id_of(&w.to_lowercase()))
                .collect();
            if content.is_empty() {
                return Ok(Vec::new());
            }
            let budget = max_length.saturating_sub(2).min(content.len());
            let mut ids = vec![0];
            ids.extend_from_slice(&content[..budget]);
            ids.push(2);
            Ok(ids)
        }

        fn decode(&self, ids: &[u32]) -> Result<String> {
            let words = self.words.lock().unwrap();
            Ok(ids
                .iter()
                .filter(|&&id| id as usize >= VOCAB.len())
                .filter_map(|&id| words.get(id as usize - VOCAB.len()).cloned())
                .collect::<Vec<_>>()
                .join(" "))
        }
    }

    /// Model that copies the source sentence token by token
    pub struct EchoModel {
        pub vocab_size: usize,
        source: Vec<u32>,
    }

    impl EchoModel {
        pub fn new(vocab_size: usize) -> Self {
            Self {
                vocab_size,
                source: Vec::new(),
            }
        }
    }

    impl Seq2SeqModel for EchoModel {
        fn encode(&mut self, input_ids: &[u32]) -> Result<EncoderOutput> {
            self.source = input_ids[1..input_ids.len() - 1].to_vec();
            Ok(EncoderOutput {
                hidden_states: vec![0.0; input_ids.len()],
                seq_len: input_ids.len(),
                hidden_size: 1,
            })
        }

        fn next_token_logits(
            &mut self,
            _encoder: &EncoderOutput,
            decoder_inputs: &[Vec<u32>],
        ) -> Result<Vec<Vec<f32>>> {
            Ok(decoder_inputs
                .iter()
                .map(|sequence| {
                    let wanted = self.source.get(sequence.len() - 1).copied().unwrap_or(2);
                    let mut row = vec![0.0; self.vocab_size];
                    row[wanted as usize] = 20.0;
                    row
                })
                .collect())
        }
    }

    /// Model whose decoder always fails
    pub struct BrokenModel;

    impl Seq2SeqModel for BrokenModel {
        fn encode(&mut self, input_ids: &[u32]) -> Result<EncoderOutput> {
            Ok(EncoderOutput {
                hidden_states: Vec::new(),
                seq_len: input_ids.len(),
                hidden_size: 0,
            })
        }

        fn next_token_logits(&mut self, _: &EncoderOutput, _: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
            Err(TranslationError::Generation("decoder session failed".to_string()))
        }
    }

    pub fn echo_translator() -> Translator {
        Translator::new(
            Arc::new(WordCodec::default()),
            Box::new(EchoModel::new(256)),
            GenerationConfig::default(),
            SpecialTokens::default(),
        )
        .with_model_name("echo")
    }

    pub fn broken_translator() -> Translator {
        Translator::new(
            Arc::new(WordCodec::default()),
            Box::new(BrokenModel),
            GenerationConfig::default(),
            SpecialTokens::default(),
        )
    }
}
