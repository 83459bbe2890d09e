//! facet-core — Unsupervised face clustering engine.
//!
//! Groups face embeddings into identity clusters with an online greedy
//! assignment, evaluates cluster cohesion, suggests decision thresholds from
//! existing clusters, and provides merge/detach/delete maintenance. Storage is
//! reached only through the [`ClusterStore`] capability.

pub mod config;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod quality;
pub mod similarity;
pub mod store;
pub mod threshold;
pub mod types;

pub use config::ClusteringConfig;
pub use engine::{Assignment, ClusterEngine, ClusteringReport, Interruption, RunControl};
pub use error::ClusterError;
pub use maintenance::{DetachOutcome, MergeOutcome};
pub use quality::QualityMetrics;
pub use similarity::{similarity, SimilarityWeights};
pub use store::{ClusterStore, MemoryStore, StoreError};
pub use types::{
    BoundingBox, Cluster, ClusterId, ClusterMetadata, ClusterSample, ClusterSummary, Embedding,
    Face, FaceId, PictureId, Scope, UserId,
};
