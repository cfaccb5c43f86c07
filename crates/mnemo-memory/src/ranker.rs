//! Retrieval Ranker.
//!
//! Blends relevance and recency into one score, evaluated over the candidate
//! set of a single query. Nothing here is stored, so the weights can change
//! between queries for free.
//!
//! ## Model
//!
//! For every candidate `i` with raw cosine similarity `s_i` and age
//! `Δt_i = now − created_at_i`:
//!
//! ```text
//! sim_i     = minmax(s_i)        over the candidate set
//! recency_i = minmax(−Δt_i)      (newest = 1, oldest = 0)
//! score_i   = α·sim_i + (1 − α)·recency_i + salience_weight·[valence_i ≠ neutral]
//! ```
//!
//! `minmax` maps a degenerate set (all values equal) to `0.5` everywhere.
//! Ties on `score` go to the more recent entry.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use mnemo_types::MemoryEntry;
use tracing::warn;

/// Default relevance weight; favours similarity over recency.
pub const DEFAULT_ALPHA: f32 = 0.6;

/// Tunable weights for [`RetrievalRanker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankerConfig {
    /// Weight of normalised similarity, in `[0, 1]`. Recency gets `1 − alpha`.
    pub alpha: f32,
    /// Bonus added to entries with a positive or negative valence.
    pub salience_weight: f32,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            salience_weight: 0.0,
        }
    }
}

/// A candidate after ranking.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub entry: &'a MemoryEntry,
    /// Raw cosine similarity to the query.
    pub similarity: f32,
    /// Final blended score.
    pub score: f32,
}

/// Turns raw similarity scores into a relevance/recency ranking.
#[derive(Debug, Clone, Default)]
pub struct RetrievalRanker {
    config: RankerConfig,
}

impl RetrievalRanker {
    /// Create a ranker. An `alpha` outside `[0, 1]` is clamped.
    pub fn new(mut config: RankerConfig) -> Self {
        if !(0.0..=1.0).contains(&config.alpha) || config.alpha.is_nan() {
            warn!(alpha = config.alpha, "ranker alpha outside [0, 1]; clamping");
            config.alpha = if config.alpha.is_nan() {
                DEFAULT_ALPHA
            } else {
                config.alpha.clamp(0.0, 1.0)
            };
        }
        Self { config }
    }

    pub fn config(&self) -> RankerConfig {
        self.config
    }

    /// Rank `candidates` (entry, raw similarity) as of `now`, best first.
    pub fn rank<'a>(
        &self,
        candidates: &[(&'a MemoryEntry, f32)],
        now: DateTime<Utc>,
    ) -> Vec<Ranked<'a>> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let sims: Vec<f64> = candidates.iter().map(|(_, s)| f64::from(*s)).collect();
        let recency: Vec<f64> = candidates
            .iter()
            .map(|(e, _)| -elapsed_micros(e.created_at, now))
            .collect();
        let sims = min_max(&sims);
        let recency = min_max(&recency);

        let alpha = f64::from(self.config.alpha);
        let mut ranked: Vec<Ranked<'a>> = candidates
            .iter()
            .zip(sims.iter().zip(&recency))
            .map(|(&(entry, similarity), (ns, nr))| {
                let mut score = alpha * ns + (1.0 - alpha) * nr;
                if entry.valence.is_some_and(|v| v.is_salient()) {
                    score += f64::from(self.config.salience_weight);
                }
                Ranked {
                    entry,
                    similarity,
                    score: score as f32,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.entry.created_at.cmp(&a.entry.created_at))
        });
        ranked
    }
}

fn elapsed_micros(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_microseconds().unwrap_or(i64::MAX) as f64
}

/// Min-max scale `values` into `[0, 1]`; a degenerate set maps to `0.5`.
fn min_max(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if range.partial_cmp(&f64::EPSILON) != Some(Ordering::Greater) {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
