//! Local surrogate explanations for single text predictions.
//!
//! # Algorithm
//! 1. The input is cut to its first `max_words` words. The `max_vocabulary` most frequent
//!    distinct words (ties go to the earlier word) form the interpretable feature space;
//!    any other word stays in every perturbation.
//! 2. `num_samples` perturbations are drawn from a seeded RNG: sample 0 is the input
//!    itself, every other sample removes `k ∈ [1, d)` feature words (all occurrences).
//! 3. Every perturbation is rendered and re-scored through the vectorizer + classifier.
//! 4. Samples are weighted by an exponential kernel over cosine distance to the input.
//! 5. Feature selection: forward selection by weighted R² when `num_features` is at most
//!    six, otherwise the `num_features` largest absolute weights of a ridge (alpha 0.01)
//!    over all words. A second ridge (alpha 1.0) on the chosen words yields the reported
//!    contributions.
//!
//! # Threading
//! Scoring is the expensive step (one classifier call per sample) and fans out over
//! scoped worker threads. Each worker renders and scores its own slice of the masks
//! into an index-ordered buffer, so the result never depends on completion order.
//!
//! The deadline covers every stage. Workers check it per sample and the ridge solver per
//! row and per pivot; whichever notices first ends the call with `Timeout`.

use std::collections::HashMap;
use std::fmt::Display;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use crate::explain::ridge::{fit_weighted, DesignMatrix, RidgeError};
use crate::explain::TokenContribution;
use crate::scoring::normalize::NormalizedText;

const SELECTION_ALPHA: f64 = 0.01;
const SURROGATE_ALPHA: f64 = 1.0;
const FORWARD_SELECTION_MAX: usize = 6;

#[derive(Debug, Error)]
pub enum ExplanationError {
    #[error("need at least two distinct words to perturb, found {distinct}")]
    InsufficientTokens { distinct: usize },

    #[error("scorer failed on sample {sample}: {message}")]
    Scorer { sample: usize, message: String },

    #[error("explanation exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("surrogate fit failed: {0}")]
    Surrogate(#[source] RidgeError),

    #[error("invalid explainer configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
pub struct ExplainerConfig {
    pub num_features: usize,
    pub num_samples: usize,
    pub kernel_width: f64,
    pub seed: u64,
    pub timeout: Duration,
    pub workers: usize,
    /// Words past this position are left out of the explanation.
    pub max_words: usize,
    /// Upper bound on distinct words used as features.
    pub max_vocabulary: usize,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            num_features: 5,
            num_samples: 1000,
            kernel_width: 25.0,
            seed: 42,
            timeout: Duration::from_secs(20),
            workers: 4,
            max_words: 5000,
            max_vocabulary: 300,
        }
    }
}

/// Explains one prediction at a time. Holds configuration only; safe to share.
#[derive(Debug, Clone)]
pub struct LimeTextExplainer {
    config: ExplainerConfig,
}

impl LimeTextExplainer {
    pub fn new(config: ExplainerConfig) -> Self {
        Self { config }
    }

    /// Returns up to `num_features` signed word contributions toward `target_class`
    /// (an index into the scorer's `[Reject, Hire]` output), sorted by descending
    /// absolute weight.
    pub fn explain<F, E>(
        &self,
        text: &NormalizedText,
        target_class: usize,
        num_features: usize,
        scorer: F,
    ) -> Result<Vec<TokenContribution>, ExplanationError>
    where
        F: Fn(&str) -> Result<[f64; 2], E> + Sync,
        E: Display,
    {
        let config = &self.config;
        if target_class > 1 {
            return Err(ExplanationError::InvalidConfig(format!(
                "target class {target_class} out of range"
            )));
        }
        if config.num_samples < 2 || num_features == 0 || config.max_vocabulary < 2 {
            return Err(ExplanationError::InvalidConfig(format!(
                "num_samples={} num_features={num_features} max_vocabulary={}",
                config.num_samples, config.max_vocabulary
            )));
        }
        let started = Instant::now();
        let deadline = started + config.timeout;
        let fit_error = |err: RidgeError| match err {
            RidgeError::DeadlineExceeded => ExplanationError::Timeout(config.timeout),
            other => ExplanationError::Surrogate(other),
        };

        let indexed = IndexedText::new(text, config.max_words, config.max_vocabulary);
        let d = indexed.features.len();
        if d < 2 {
            return Err(ExplanationError::InsufficientTokens { distinct: d });
        }

        let masks = sample_masks(d, config.num_samples, config.seed);
        let probabilities = score_all(&indexed, &masks, &scorer, deadline, config)?;

        let mut x = DesignMatrix::zeros(masks.len(), d);
        let mut weights = Vec::with_capacity(masks.len());
        for (row, mask) in masks.iter().enumerate() {
            let kept = mask.iter().filter(|&&active| active).count();
            for (col, &active) in mask.iter().enumerate() {
                if active {
                    x.set(row, col, 1.0);
                }
            }
            weights.push(kernel(cosine_distance(kept, d), config.kernel_width));
        }
        drop(masks);
        let y: Vec<f64> = probabilities.iter().map(|p| p[target_class]).collect();

        let selected = if num_features >= d {
            (0..d).collect()
        } else if num_features <= FORWARD_SELECTION_MAX {
            forward_selection(&x, &y, &weights, num_features, deadline).map_err(fit_error)?
        } else {
            highest_weights(&x, &y, &weights, num_features, deadline).map_err(fit_error)?
        };

        let fit = fit_weighted(&x, &selected, &y, &weights, SURROGATE_ALPHA, Some(deadline))
            .map_err(fit_error)?;
        let mut contributions: Vec<TokenContribution> = selected
            .iter()
            .zip(&fit.coef)
            .map(|(&col, &weight)| TokenContribution {
                token: indexed.feature_token(col).to_string(),
                weight,
            })
            .collect();
        contributions.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));

        debug!(
            "Explained {} samples over {} words in {}ms",
            y.len(),
            d,
            started.elapsed().as_millis()
        );
        Ok(contributions)
    }
}

/// Greedily adds the word whose inclusion gives the best weighted R².
fn forward_selection(
    x: &DesignMatrix,
    y: &[f64],
    weights: &[f64],
    num_features: usize,
    deadline: Instant,
) -> Result<Vec<usize>, RidgeError> {
    let mut selected: Vec<usize> = Vec::with_capacity(num_features);
    let mut columns: Vec<usize> = Vec::with_capacity(num_features);
    while selected.len() < num_features {
        let mut best: Option<(usize, f64)> = None;
        for candidate in 0..x.cols() {
            if selected.contains(&candidate) {
                continue;
            }
            columns.clear();
            columns.extend_from_slice(&selected);
            columns.push(candidate);
            let fit = fit_weighted(x, &columns, y, weights, SELECTION_ALPHA, Some(deadline))?;
            let score = fit.r_squared(x, &columns, y, weights);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((candidate, score));
            }
        }
        match best {
            Some((candidate, _)) => selected.push(candidate),
            None => break,
        }
    }
    Ok(selected)
}

/// Top `num_features` columns by absolute coefficient of one ridge over all words.
fn highest_weights(
    x: &DesignMatrix,
    y: &[f64],
    weights: &[f64],
    num_features: usize,
    deadline: Instant,
) -> Result<Vec<usize>, RidgeError> {
    let mut ranked: Vec<usize> = (0..x.cols()).collect();
    let fit = fit_weighted(x, &ranked, y, weights, SELECTION_ALPHA, Some(deadline))?;
    ranked.sort_by(|&a, &b| fit.coef[b].abs().total_cmp(&fit.coef[a].abs()));
    ranked.truncate(num_features);
    Ok(ranked)
}

/// Input words with the subset that can be switched off.
struct IndexedText<'a> {
    vocabulary: Vec<&'a str>,
    positions: Vec<usize>,
    /// Vocabulary index of each feature, in first-occurrence order.
    features: Vec<usize>,
    /// Feature index of each vocabulary word, if it is one.
    feature_of: Vec<Option<usize>>,
}

impl<'a> IndexedText<'a> {
    fn new(text: &'a NormalizedText, max_words: usize, max_vocabulary: usize) -> Self {
        let mut lookup: HashMap<&str, usize> = HashMap::new();
        let mut vocabulary = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut positions = Vec::new();
        for token in text.tokens().take(max_words) {
            let next = vocabulary.len();
            let idx = *lookup.entry(token).or_insert_with(|| {
                vocabulary.push(token);
                counts.push(0);
                next
            });
            counts[idx] += 1;
            positions.push(idx);
        }

        let mut features: Vec<usize> = (0..vocabulary.len()).collect();
        if features.len() > max_vocabulary {
            // Stable sort keeps first occurrence as the tie-break.
            features.sort_by(|&a, &b| counts[b].cmp(&counts[a]));
            features.truncate(max_vocabulary);
            features.sort_unstable();
        }
        let mut feature_of = vec![None; vocabulary.len()];
        for (feature, &idx) in features.iter().enumerate() {
            feature_of[idx] = Some(feature);
        }

        Self {
            vocabulary,
            positions,
            features,
            feature_of,
        }
    }

    fn feature_token(&self, feature: usize) -> &'a str {
        self.vocabulary[self.features[feature]]
    }

    /// Rebuilds the text dropping the features switched off in `mask`.
    fn render(&self, mask: &[bool]) -> String {
        let kept: Vec<&str> = self
            .positions
            .iter()
            .filter(|&&idx| self.feature_of[idx].map_or(true, |feature| mask[feature]))
            .map(|&idx| self.vocabulary[idx])
            .collect();
        kept.join(" ")
    }
}

/// Presence masks over `d` words; mask 0 keeps everything.
fn sample_masks(d: usize, num_samples: usize, seed: u64) -> Vec<Vec<bool>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut masks = Vec::with_capacity(num_samples);
    masks.push(vec![true; d]);
    for _ in 1..num_samples {
        let remove = rng.gen_range(1..d);
        let mut mask = vec![true; d];
        for idx in index::sample(&mut rng, d, remove) {
            mask[idx] = false;
        }
        masks.push(mask);
    }
    masks
}

/// Cosine distance (× 100) between a mask keeping `kept` of `d` words and the all-ones
/// original.
fn cosine_distance(kept: usize, d: usize) -> f64 {
    let similarity = (kept as f64 / d as f64).sqrt();
    (1.0 - similarity) * 100.0
}

fn kernel(distance: f64, width: f64) -> f64 {
    (-(distance * distance) / (width * width)).exp().sqrt()
}

fn score_all<F, E>(
    indexed: &IndexedText<'_>,
    masks: &[Vec<bool>],
    scorer: &F,
    deadline: Instant,
    config: &ExplainerConfig,
) -> Result<Vec<[f64; 2]>, ExplanationError>
where
    F: Fn(&str) -> Result<[f64; 2], E> + Sync,
    E: Display,
{
    let n = masks.len();
    let workers = config.workers.clamp(1, n);
    let chunk = n.div_ceil(workers);
    let timeout = config.timeout;

    let mut slots: Vec<Option<Result<[f64; 2], ExplanationError>>> =
        (0..n).map(|_| None).collect();

    thread::scope(|scope| {
        for (chunk_index, (slot_chunk, mask_chunk)) in
            slots.chunks_mut(chunk).zip(masks.chunks(chunk)).enumerate()
        {
            scope.spawn(move || {
                let offset = chunk_index * chunk;
                for (i, (slot, mask)) in slot_chunk.iter_mut().zip(mask_chunk).enumerate() {
                    if Instant::now() >= deadline {
                        *slot = Some(Err(ExplanationError::Timeout(timeout)));
                        return;
                    }
                    let text = indexed.render(mask);
                    let result = scorer(&text).map_err(|e| ExplanationError::Scorer {
                        sample: offset + i,
                        message: e.to_string(),
                    });
                    let failed = result.is_err();
                    *slot = Some(result);
                    if failed {
                        return;
                    }
                }
            });
        }
    });

    // Walk in sample order so the reported error is the lowest failing index.
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Err(ExplanationError::Timeout(timeout))))
        .collect()
}
