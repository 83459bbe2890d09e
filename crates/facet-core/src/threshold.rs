//! Data-driven threshold suggestion.
//!
//! The estimate sits halfway between the least similar pair inside any
//! cluster and the most similar pair across clusters. It is advisory: nothing
//! here feeds it back into [`ClusteringConfig`].

use crate::config::ClusteringConfig;
use crate::error::ClusterError;
use crate::similarity::{pairwise, weighted_similarity};
use crate::store::ClusterStore;
use crate::types::{ClusterSample, Embedding, Scope};
use serde::Serialize;

/// Similarity samples gathered from the clusters of a scope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimilaritySamples {
    pub intra: Vec<f32>,
    pub inter: Vec<f32>,
}

impl SimilaritySamples {
    /// Collect intra-cluster pairs over full memberships and inter-cluster
    /// pairs over the first `inter_sample_size` members of each cluster.
    pub fn collect(clusters: &[ClusterSample], config: &ClusteringConfig) -> Self {
        let mut samples = Self::default();

        for cluster in clusters.iter().filter(|c| c.embeddings.len() > 1) {
            let refs: Vec<&Embedding> = cluster.embeddings.iter().collect();
            samples.intra.extend(pairwise(&refs, &config.similarity));
        }

        let cap = config.estimation.inter_sample_size;
        for (i, a) in clusters.iter().enumerate() {
            for b in &clusters[i + 1..] {
                for ea in a.embeddings.iter().take(cap) {
                    for eb in b.embeddings.iter().take(cap) {
                        samples
                            .inter
                            .push(weighted_similarity(ea, eb, &config.similarity));
                    }
                }
            }
        }

        samples
    }

    /// Midpoint of `min(intra)` and `max(inter)`, clamped to the configured
    /// bounds; the base threshold when either side is empty.
    pub fn suggest(&self, config: &ClusteringConfig) -> f32 {
        if self.intra.is_empty() || self.inter.is_empty() {
            return config.base_threshold;
        }
        let min_intra = self.intra.iter().copied().fold(f32::INFINITY, f32::min);
        let max_inter = self.inter.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let candidate = (min_intra + max_inter) / 2.0;
        candidate.clamp(config.estimation.min_threshold, config.estimation.max_threshold)
    }
}

/// Suggest a decision threshold from the existing clusters of `scope`.
pub fn estimate_optimal_threshold(
    store: &dyn ClusterStore,
    scope: &Scope,
    config: &ClusteringConfig,
) -> Result<f32, ClusterError> {
    let clusters = store.cluster_samples(scope, None)?;
    let samples = SimilaritySamples::collect(&clusters, config);
    let threshold = samples.suggest(config);

    tracing::info!(
        %scope,
        clusters = clusters.len(),
        intra_pairs = samples.intra.len(),
        inter_pairs = samples.inter.len(),
        threshold,
        "estimated clustering threshold"
    );

    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::face;
    use crate::store::MemoryStore;
    use crate::types::{Cluster, ClusterId};
    use chrono::Utc;

    fn sample(values: &[&[f32]]) -> ClusterSample {
        ClusterSample {
            cluster_id: ClusterId::new(),
            embeddings: values.iter().map(|v| Embedding::new(v.to_vec())).collect(),
        }
    }

    #[test]
    fn test_no_clusters_returns_base() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let t = estimate_optimal_threshold(&store, &Scope::Global, &cfg).unwrap();
        assert_eq!(t, 0.3);
    }

    #[test]
    fn test_singleton_clusters_return_base() {
        // Inter pairs exist but no cluster has two members.
        let cfg = ClusteringConfig::default();
        let clusters = [sample(&[&[1.0, 0.0]]), sample(&[&[0.0, 1.0]])];
        let samples = SimilaritySamples::collect(&clusters, &cfg);
        assert!(samples.intra.is_empty());
        assert_eq!(samples.inter.len(), 1);
        assert_eq!(samples.suggest(&cfg), 0.3);
    }

    #[test]
    fn test_single_cluster_returns_base() {
        let cfg = ClusteringConfig::default();
        let samples = SimilaritySamples::collect(&[sample(&[&[1.0, 0.0], &[0.9, 0.1]])], &cfg);
        assert!(samples.inter.is_empty());
        assert_eq!(samples.suggest(&cfg), 0.3);
    }

    #[test]
    fn test_separated_clusters_midpoint() {
        let cfg = ClusteringConfig::default();
        let a = sample(&[&[1.0, 0.0, 0.0], &[0.92, 0.391_918, 0.0]]);
        let b = sample(&[&[0.0, 0.0, 1.0], &[0.0, 0.391_918, 0.92]]);
        let samples = SimilaritySamples::collect(&[a, b], &cfg);
        assert_eq!(samples.intra.len(), 2);
        assert_eq!(samples.inter.len(), 4);

        let t = samples.suggest(&cfg);
        assert!((0.4..=0.9).contains(&t));
        let min_intra = samples.intra.iter().copied().fold(f32::INFINITY, f32::min);
        let max_inter = samples.inter.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!((t - ((min_intra + max_inter) / 2.0).clamp(0.4, 0.9)).abs() < 1e-6);
    }

    #[test]
    fn test_clamped_to_upper_bound() {
        let cfg = ClusteringConfig::default();
        let same = [1.0f32, 0.0];
        let clusters = [sample(&[&same, &same]), sample(&[&same])];
        let samples = SimilaritySamples::collect(&clusters, &cfg);
        assert!((samples.suggest(&cfg) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_clamped_to_lower_bound() {
        let cfg = ClusteringConfig::default();
        let samples = SimilaritySamples {
            intra: vec![0.2, 0.5],
            inter: vec![0.1],
        };
        assert_eq!(samples.suggest(&cfg), 0.4);
    }

    #[test]
    fn test_inter_sample_cap() {
        let cfg = ClusteringConfig::default();
        let many: Vec<[f32; 2]> = (0..8).map(|i| [1.0, i as f32 * 0.01]).collect();
        let refs: Vec<&[f32]> = many.iter().map(|v| v.as_slice()).collect();
        let samples = SimilaritySamples::collect(&[sample(&refs), sample(&refs)], &cfg);
        assert_eq!(samples.inter.len(), 25);
        assert_eq!(samples.intra.len(), 2 * 28);
    }

    #[test]
    fn test_user_scope_sees_only_own_faces() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let cluster = Cluster::new("shared", Utc::now());
        let alice = face(Some("alice"), &[1.0, 0.0]);
        let bob = face(Some("bob"), &[0.9, 0.1]);
        store.add_face(alice.clone()).unwrap();
        store.add_face(bob.clone()).unwrap();
        store.create_cluster_with_face(&cluster, alice.id).unwrap();
        store.assign_face(bob.id, cluster.id, Utc::now()).unwrap();

        let other = Cluster::new("other", Utc::now());
        let carol = face(Some("alice"), &[0.0, 1.0]);
        store.add_face(carol.clone()).unwrap();
        store.create_cluster_with_face(&other, carol.id).unwrap();

        // Alice alone has no intra pair in any cluster.
        let t = estimate_optimal_threshold(&store, &Scope::user("alice"), &cfg).unwrap();
        assert_eq!(t, 0.3);

        let t = estimate_optimal_threshold(&store, &Scope::Global, &cfg).unwrap();
        assert!((0.4..=0.9).contains(&t));
    }
}
