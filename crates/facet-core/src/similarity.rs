//! Composite face similarity.
//!
//! Blends cosine similarity with inverted Euclidean and inverted Manhattan
//! distances. The weights are heuristic but load-bearing: changing them
//! changes clustering output.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};

// --- Metric weights ---
pub const COSINE_WEIGHT: f32 = 0.6;
pub const EUCLIDEAN_WEIGHT: f32 = 0.3;
pub const MANHATTAN_WEIGHT: f32 = 0.1;

/// Weights of the three metrics in the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub cosine: f32,
    pub euclidean: f32,
    pub manhattan: f32,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            cosine: COSINE_WEIGHT,
            euclidean: EUCLIDEAN_WEIGHT,
            manhattan: MANHATTAN_WEIGHT,
        }
    }
}

/// Composite similarity in [0, 1] with the default weights.
pub fn similarity(a: &Embedding, b: &Embedding) -> f32 {
    weighted_similarity(a, b, &SimilarityWeights::default())
}

/// Composite similarity in [0, 1].
///
/// Embeddings of different dimension are unrelated: the result is exactly 0.
pub fn weighted_similarity(a: &Embedding, b: &Embedding, weights: &SimilarityWeights) -> f32 {
    if a.dim() != b.dim() {
        return 0.0;
    }

    let cosine = a.cosine(b);
    let euclidean = 1.0 / (1.0 + a.euclidean_distance(b));
    let manhattan = 1.0 / (1.0 + a.mean_absolute_difference(b));

    let composite =
        weights.cosine * cosine + weights.euclidean * euclidean + weights.manhattan * manhattan;

    if composite.is_nan() {
        0.0
    } else {
        composite.clamp(0.0, 1.0)
    }
}

/// All pairwise similarities among `embeddings` (i < j).
pub fn pairwise(embeddings: &[&Embedding], weights: &SimilarityWeights) -> Vec<f32> {
    let mut sims = Vec::with_capacity(embeddings.len() * embeddings.len().saturating_sub(1) / 2);
    for (i, a) in embeddings.iter().enumerate() {
        for b in &embeddings[i + 1..] {
            sims.push(weighted_similarity(a, b, weights));
        }
    }
    sims
}
