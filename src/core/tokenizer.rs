//! BART tokenizer backed by a Hugging Face `tokenizer.json`

use std::path::Path;

use tokenizers::Tokenizer;
use tracing::debug;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::SpecialTokens;
use crate::core::translator::TextCodec;

/// Wraps a `tokenizers::Tokenizer` with BART's `<s> … </s>` framing
pub struct BartTokenizer {
    inner: Tokenizer,
    bos: u32,
    eos: u32,
}

impl BartTokenizer {
    /// Wrap a loaded tokenizer
    pub fn new(inner: Tokenizer, tokens: &SpecialTokens) -> Self {
        Self {
            inner,
            bos: tokens.bos,
            eos: tokens.eos,
        }
    }

    /// Load a `tokenizer.json` file
    pub fn from_file<P: AsRef<Path>>(path: P, tokens: &SpecialTokens) -> Result<Self> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path).map_err(|e| TranslationError::ModelLoad {
            message: format!("failed to load tokenizer {}: {}", path.display(), e),
        })?;
        debug!(
            "Loaded tokenizer with {} entries from {}",
            inner.get_vocab_size(true),
            path.display()
        );
        Ok(Self::new(inner, tokens))
    }
}

impl TextCodec for BartTokenizer {
    /// Truncation keeps BOS and EOS inside the `max_length` budget; a text
    /// with no content tokens encodes to nothing.
    fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TranslationError::Encoding(e.to_string()))?;

        let content = encoding.get_ids();
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let budget = max_length.saturating_sub(2).min(content.len());
        let mut ids = Vec::with_capacity(budget + 2);
        ids.push(self.bos);
        ids.extend_from_slice(&content[..budget]);
        ids.push(self.eos);
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let text = self
            .inner
            .decode(ids, true)
            .map_err(|e| TranslationError::Decoding(e.to_string()))?;
        Ok(clean_up_tokenization(&text).trim().to_string())
    }
}

/// Undo the spaces byte-level decoding leaves before punctuation and
/// English contractions.
pub fn clean_up_tokenization(text: &str) -> String {
    const REPLACEMENTS: &[(&str, &str)] = &[
        (" .", "."),
        (" ?", "?"),
        (" !", "!"),
        (" ,", ","),
        (" ' ", "'"),
        (" n't", "n't"),
        (" 'm", "'m"),
        (" 's", "'s"),
        (" 've", "'ve"),
        (" 're", "'re"),
    ];

    REPLACEMENTS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}
