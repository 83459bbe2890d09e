//! Tunable clustering parameters.
//!
//! Every heuristic constant used by the engine and the estimators is a named
//! constant here and a field of [`ClusteringConfig`], which deserializes from
//! a `[clustering]` TOML table with these constants as defaults.

use crate::similarity::SimilarityWeights;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Assignment thresholds ---
pub const BASE_THRESHOLD: f32 = 0.3;
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Representative faces sampled per candidate cluster (K).
pub const SAMPLE_SIZE: usize = 10;
/// Sampled members required before an average-only match is trusted.
pub const MIN_SAMPLES_FOR_AVERAGE: usize = 2;

// --- Candidate scoring weights ---
pub const AVERAGE_WEIGHT: f32 = 0.6;
pub const MAXIMUM_WEIGHT: f32 = 0.3;
pub const COVERAGE_WEIGHT: f32 = 0.1;

// --- Threshold estimation ---
pub const INTER_SAMPLE_SIZE: usize = 5;
pub const MIN_ESTIMATED_THRESHOLD: f32 = 0.4;
pub const MAX_ESTIMATED_THRESHOLD: f32 = 0.9;

#[derive(Error, Debug, PartialEq)]
pub enum InvalidConfig {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f32 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("estimation bounds are inverted: min {min} > max {max}")]
    InvertedBounds { min: f32, max: f32 },
}

/// Weights of the candidate ranking score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub average: f32,
    pub maximum: f32,
    pub coverage: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            average: AVERAGE_WEIGHT,
            maximum: MAXIMUM_WEIGHT,
            coverage: COVERAGE_WEIGHT,
        }
    }
}

/// Parameters of the adaptive threshold estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Faces sampled per cluster when measuring inter-cluster similarity.
    pub inter_sample_size: usize,
    pub min_threshold: f32,
    pub max_threshold: f32,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            inter_sample_size: INTER_SAMPLE_SIZE,
            min_threshold: MIN_ESTIMATED_THRESHOLD,
            max_threshold: MAX_ESTIMATED_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Minimum average similarity for a candidate cluster.
    pub base_threshold: f32,
    /// A single member this similar is enough to join a cluster.
    pub high_confidence_threshold: f32,
    pub sample_size: usize,
    pub min_samples_for_average: usize,
    pub similarity: SimilarityWeights,
    pub scoring: ScoreWeights,
    pub estimation: EstimationConfig,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            base_threshold: BASE_THRESHOLD,
            high_confidence_threshold: HIGH_CONFIDENCE_THRESHOLD,
            sample_size: SAMPLE_SIZE,
            min_samples_for_average: MIN_SAMPLES_FOR_AVERAGE,
            similarity: SimilarityWeights::default(),
            scoring: ScoreWeights::default(),
            estimation: EstimationConfig::default(),
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        unit_range("base_threshold", self.base_threshold)?;
        unit_range("high_confidence_threshold", self.high_confidence_threshold)?;
        unit_range("estimation.min_threshold", self.estimation.min_threshold)?;
        unit_range("estimation.max_threshold", self.estimation.max_threshold)?;

        if self.sample_size == 0 {
            return Err(InvalidConfig::Zero("sample_size"));
        }
        if self.estimation.inter_sample_size == 0 {
            return Err(InvalidConfig::Zero("estimation.inter_sample_size"));
        }
        if self.estimation.min_threshold > self.estimation.max_threshold {
            return Err(InvalidConfig::InvertedBounds {
                min: self.estimation.min_threshold,
                max: self.estimation.max_threshold,
            });
        }

        for (field, value) in [
            ("similarity.cosine", self.similarity.cosine),
            ("similarity.euclidean", self.similarity.euclidean),
            ("similarity.manhattan", self.similarity.manhattan),
            ("scoring.average", self.scoring.average),
            ("scoring.maximum", self.scoring.maximum),
            ("scoring.coverage", self.scoring.coverage),
        ] {
            if value < 0.0 || value.is_nan() {
                return Err(InvalidConfig::Negative { field, value });
            }
        }
        Ok(())
    }
}

fn unit_range(field: &'static str, value: f32) -> Result<(), InvalidConfig> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InvalidConfig::OutOfRange { field, value })
    }
}
