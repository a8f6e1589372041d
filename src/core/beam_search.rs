//! Beam-search decoding over next-token logits.
//!
//! The search drives any model through a step callback: given the running
//! decoder sequences it returns one row of logits per sequence. Scoring
//! follows the usual Hugging Face rules so an exported model decodes the
//! same way it did in `generate()`:
//!
//! - scores are accumulated log-probabilities;
//! - finished hypotheses are ranked by `sum_logprobs / len^length_penalty`;
//! - the min-length, no-repeat-n-gram, forced-BOS and forced-EOS
//!   constraints are applied to the log-probabilities before ranking.

use std::cmp::Ordering;

use tracing::debug;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::{GenerationConfig, SpecialTokens};

/// Score given to beams that must not be extended at the first step
const INACTIVE_BEAM_SCORE: f32 = -1e9;

/// Run beam search and return the best token sequence.
///
/// The returned sequence starts with the decoder start token and ends with
/// EOS when the hypothesis finished on its own. `step` receives all running
/// sequences (equal lengths) and must return one logits row per sequence.
pub fn beam_search<F>(
    config: &GenerationConfig,
    max_length: usize,
    tokens: &SpecialTokens,
    mut step: F,
) -> Result<Vec<u32>>
where
    F: FnMut(&[Vec<u32>]) -> Result<Vec<Vec<f32>>>,
{
    let num_beams = config.num_beams.max(1);
    let early_stopping = config.early_stopping.unwrap_or(false);
    let mut hypotheses = Hypotheses::new(num_beams, config.length_penalty, early_stopping);

    let mut beams: Vec<Vec<u32>> = vec![vec![tokens.decoder_start]; num_beams];
    let mut scores: Vec<f32> = (0..num_beams)
        .map(|i| if i == 0 { 0.0 } else { INACTIVE_BEAM_SCORE })
        .collect();

    let mut cur_len = 1;
    let mut done = false;

    while cur_len < max_length {
        let logits = step(&beams)?;
        if logits.len() != beams.len() {
            return Err(TranslationError::Generation(format!(
                "model returned {} logit rows for {} beams",
                logits.len(),
                beams.len()
            )));
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        for (beam_idx, row) in logits.iter().enumerate() {
            let mut log_probs = log_softmax(row)?;
            apply_constraints(&mut log_probs, &beams[beam_idx], cur_len, max_length, config, tokens);

            candidates.extend(
                log_probs
                    .iter()
                    .enumerate()
                    .filter(|(_, lp)| lp.is_finite())
                    .map(|(token, lp)| Candidate {
                        score: scores[beam_idx] + lp,
                        beam: beam_idx,
                        token: token as u32,
                    }),
            );
        }

        let candidates = top_candidates(candidates, 2 * num_beams);
        if candidates.is_empty() {
            debug!("Beam search ran out of candidates at length {}", cur_len);
            break;
        }

        let mut next_beams = Vec::with_capacity(num_beams);
        let mut next_scores = Vec::with_capacity(num_beams);
        for (rank, candidate) in candidates.iter().enumerate() {
            if candidate.token == tokens.eos {
                if rank >= num_beams {
                    continue;
                }
                let mut finished = beams[candidate.beam].clone();
                let len = finished.len();
                finished.push(tokens.eos);
                hypotheses.add(finished, len, candidate.score);
            } else {
                let mut extended = beams[candidate.beam].clone();
                extended.push(candidate.token);
                next_beams.push(extended);
                next_scores.push(candidate.score);
            }

            if next_beams.len() == num_beams {
                break;
            }
        }

        let best_score = candidates[0].score;
        if hypotheses.is_done(best_score, cur_len) || next_beams.is_empty() {
            done = true;
            break;
        }

        beams = next_beams;
        scores = next_scores;
        cur_len += 1;
    }

    if !done {
        for (beam, score) in beams.into_iter().zip(scores) {
            if score <= INACTIVE_BEAM_SCORE / 2.0 {
                continue;
            }
            let len = beam.len();
            hypotheses.add(beam, len, score);
        }
    }

    hypotheses
        .best()
        .ok_or_else(|| TranslationError::Generation("beam search produced no hypothesis".to_string()))
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    beam: usize,
    token: u32,
}

/// Highest score first, ties broken by beam then token for reproducible output
fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.beam.cmp(&b.beam))
        .then(a.token.cmp(&b.token))
}

fn top_candidates(mut candidates: Vec<Candidate>, k: usize) -> Vec<Candidate> {
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, compare_candidates);
        candidates.truncate(k);
    }
    candidates.sort_by(compare_candidates);
    candidates
}

fn log_softmax(logits: &[f32]) -> Result<Vec<f32>> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Err(TranslationError::Generation(
            "model returned an empty or non-finite logits row".to_string(),
        ));
    }

    let sum: f32 = logits.iter().map(|v| (v - max).exp()).sum();
    let log_sum = sum.ln();
    Ok(logits.iter().map(|v| v - max - log_sum).collect())
}

fn apply_constraints(
    log_probs: &mut [f32],
    sequence: &[u32],
    cur_len: usize,
    max_length: usize,
    config: &GenerationConfig,
    tokens: &SpecialTokens,
) {
    if cur_len < config.min_length {
        ban(log_probs, tokens.eos);
    }

    for token in banned_ngram_tokens(sequence, config.no_repeat_ngram_size) {
        ban(log_probs, token);
    }

    if cur_len == 1 {
        if let Some(bos) = tokens.forced_bos {
            force(log_probs, bos);
        }
    }

    if cur_len + 1 == max_length {
        if let Some(eos) = tokens.forced_eos {
            force(log_probs, eos);
        }
    }
}

fn ban(log_probs: &mut [f32], token: u32) {
    if let Some(lp) = log_probs.get_mut(token as usize) {
        *lp = f32::NEG_INFINITY;
    }
}

fn force(log_probs: &mut [f32], token: u32) {
    if (token as usize) >= log_probs.len() {
        return;
    }
    for (id, lp) in log_probs.iter_mut().enumerate() {
        *lp = if id == token as usize { 0.0 } else { f32::NEG_INFINITY };
    }
}

/// Tokens that would complete an n-gram already present in `sequence`
pub fn banned_ngram_tokens(sequence: &[u32], ngram_size: usize) -> Vec<u32> {
    if ngram_size == 0 || sequence.len() + 1 < ngram_size {
        return Vec::new();
    }

    let prefix = &sequence[sequence.len() + 1 - ngram_size..];
    sequence
        .windows(ngram_size)
        .filter(|window| &window[..ngram_size - 1] == prefix)
        .map(|window| window[ngram_size - 1])
        .collect()
}

/// Finished hypotheses, keeping the best `num_beams`
#[derive(Debug)]
struct Hypotheses {
    num_beams: usize,
    length_penalty: f32,
    early_stopping: bool,
    items: Vec<(f32, Vec<u32>)>,
    worst_score: f32,
}

impl Hypotheses {
    fn new(num_beams: usize, length_penalty: f32, early_stopping: bool) -> Self {
        Self {
            num_beams,
            length_penalty,
            early_stopping,
            items: Vec::new(),
            worst_score: f32::INFINITY,
        }
    }

    fn normalize(&self, sum_logprobs: f32, len: usize) -> f32 {
        sum_logprobs / (len.max(1) as f32).powf(self.length_penalty)
    }

    fn add(&mut self, tokens: Vec<u32>, len: usize, sum_logprobs: f32) {
        let score = self.normalize(sum_logprobs, len);
        if self.items.len() < self.num_beams || score > self.worst_score {
            self.items.push((score, tokens));
            if self.items.len() > self.num_beams {
                if let Some(worst) = self
                    .items
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                    .map(|(idx, _)| idx)
                {
                    self.items.remove(worst);
                }
            }
            self.worst_score = self
                .items
                .iter()
                .map(|(s, _)| *s)
                .fold(f32::INFINITY, f32::min);
        }
    }

    fn is_done(&self, best_sum_logprobs: f32, cur_len: usize) -> bool {
        if self.items.len() < self.num_beams {
            return false;
        }
        if self.early_stopping {
            return true;
        }
        self.worst_score >= self.normalize(best_sum_logprobs, cur_len)
    }

    /// Highest score wins; the earliest hypothesis wins a tie
    fn best(self) -> Option<Vec<u32>> {
        self.items
            .into_iter()
            .fold(None, |best: Option<(f32, Vec<u32>)>, item| match best {
                Some(current) if current.0 >= item.0 => Some(current),
                _ => Some(item),
            })
            .map(|(_, tokens)| tokens)
    }
}
