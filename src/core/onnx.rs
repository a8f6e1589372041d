//! BART encoder/decoder graphs run through ONNX Runtime.
//!
//! Expects the layout produced by the Optimum exporter:
//! - `encoder_model.onnx`: `input_ids`, `attention_mask` → `last_hidden_state`
//! - `decoder_model.onnx`: `input_ids`, `encoder_hidden_states`,
//!   `encoder_attention_mask` → `logits`
//!
//! The decoder graph without past key/values is used, so every step
//! re-reads the full decoder prefix.

use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use crate::core::errors::{Result, TranslationError};
use crate::core::translator::{EncoderOutput, Seq2SeqModel};

/// ONNX Runtime sessions for one exported BART model
pub struct OnnxBart {
    encoder: Session,
    decoder: Session,
}

impl OnnxBart {
    /// Open both graphs with `intra_threads` compute threads each
    pub fn from_files(encoder: &Path, decoder: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading encoder graph: {}", encoder.display());
        let encoder = load_session(encoder, intra_threads)?;
        info!("Loading decoder graph: {}", decoder.display());
        let decoder = load_session(decoder, intra_threads)?;
        Ok(Self { encoder, decoder })
    }
}

fn load_session(path: &Path, intra_threads: usize) -> Result<Session> {
    let load_error = |e: ort::Error| TranslationError::ModelLoad {
        message: format!("{}: {}", path.display(), e),
    };

    Session::builder()
        .map_err(load_error)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(load_error)?
        .with_intra_threads(intra_threads)
        .map_err(load_error)?
        .commit_from_file(path)
        .map_err(load_error)
}

fn inference_error(e: ort::Error) -> TranslationError {
    TranslationError::Generation(e.to_string())
}

fn missing_output(graph: &str, name: &str) -> TranslationError {
    TranslationError::Generation(format!("{} graph has no `{}` output", graph, name))
}

fn to_i64(ids: &[u32]) -> Vec<i64> {
    ids.iter().map(|&id| i64::from(id)).collect()
}

impl Seq2SeqModel for OnnxBart {
    fn encode(&mut self, input_ids: &[u32]) -> Result<EncoderOutput> {
        let seq_len = input_ids.len();
        let ids = Tensor::from_array(([1usize, seq_len], to_i64(input_ids))).map_err(inference_error)?;
        let mask = Tensor::from_array(([1usize, seq_len], vec![1i64; seq_len])).map_err(inference_error)?;

        let outputs = self
            .encoder
            .run(ort::inputs!["input_ids" => ids, "attention_mask" => mask])
            .map_err(inference_error)?;

        let (shape, data) = outputs
            .get("last_hidden_state")
            .ok_or_else(|| missing_output("encoder", "last_hidden_state"))?
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        if shape.len() != 3 || shape[1] as usize != seq_len {
            return Err(TranslationError::Generation(format!(
                "unexpected encoder output shape {:?}",
                &shape[..]
            )));
        }

        Ok(EncoderOutput {
            hidden_states: data.to_vec(),
            seq_len,
            hidden_size: shape[2] as usize,
        })
    }

    fn next_token_logits(
        &mut self,
        encoder: &EncoderOutput,
        decoder_inputs: &[Vec<u32>],
    ) -> Result<Vec<Vec<f32>>> {
        let batch = decoder_inputs.len();
        let cur_len = decoder_inputs.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || cur_len == 0 || decoder_inputs.iter().any(|seq| seq.len() != cur_len) {
            return Err(TranslationError::Generation(
                "decoder inputs must be non-empty and of equal length".to_string(),
            ));
        }

        let ids: Vec<i64> = decoder_inputs.iter().flat_map(|seq| to_i64(seq)).collect();
        let hidden: Vec<f32> = encoder.hidden_states.repeat(batch);
        let mask = vec![1i64; batch * encoder.seq_len];

        let ids = Tensor::from_array(([batch, cur_len], ids)).map_err(inference_error)?;
        let hidden = Tensor::from_array(([batch, encoder.seq_len, encoder.hidden_size], hidden))
            .map_err(inference_error)?;
        let mask = Tensor::from_array(([batch, encoder.seq_len], mask)).map_err(inference_error)?;

        let outputs = self
            .decoder
            .run(ort::inputs![
                "input_ids" => ids,
                "encoder_hidden_states" => hidden,
                "encoder_attention_mask" => mask
            ])
            .map_err(inference_error)?;

        let (shape, data) = outputs
            .get("logits")
            .ok_or_else(|| missing_output("decoder", "logits"))?
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        if shape.len() != 3 || shape[0] as usize != batch || shape[1] as usize != cur_len {
            return Err(TranslationError::Generation(format!(
                "unexpected decoder output shape {:?}",
                &shape[..]
            )));
        }

        Ok(last_position_rows(data, batch, cur_len, shape[2] as usize))
    }
}

/// Slice the final-position logits out of a `[batch, cur_len, vocab]` buffer
fn last_position_rows(data: &[f32], batch: usize, cur_len: usize, vocab: usize) -> Vec<Vec<f32>> {
    (0..batch)
        .map(|b| {
            let start = (b * cur_len + cur_len - 1) * vocab;
            data[start..start + vocab].to_vec()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_i64() {
        assert_eq!(to_i64(&[0, 2, 50264]), vec![0i64, 2, 50264]);
    }

    #[test]
    fn test_missing_output_is_a_translation_error() {
        let err = missing_output("decoder", "logits");
        assert!(err.is_inference_error());
        assert_eq!(
            err.to_string(),
            "Error during translation: decoder graph has no `logits` output"
        );
    }

    #[test]
    fn test_last_position_rows() {
        // batch 2, length 2, vocab 3
        let data = [
            0.0, 0.1, 0.2, 1.0, 1.1, 1.2, //
            2.0, 2.1, 2.2, 3.0, 3.1, 3.2,
        ];
        let rows = last_position_rows(&data, 2, 2, 3);
        assert_eq!(rows, vec![vec![1.0, 1.1, 1.2], vec![3.0, 3.1, 3.2]]);
    }
}
