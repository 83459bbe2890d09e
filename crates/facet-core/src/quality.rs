//! Cluster cohesion diagnostics over all member pairs.

use crate::config::ClusteringConfig;
use crate::error::ClusterError;
use crate::similarity::pairwise;
use crate::store::ClusterStore;
use crate::types::{ClusterId, Embedding, Scope};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub cluster_id: ClusterId,
    pub is_valid: bool,
    pub face_count: usize,
    /// Members with a usable embedding.
    pub embedding_count: usize,
    /// Mean pairwise similarity.
    pub internal_similarity: f32,
    pub min_similarity: f32,
    pub max_similarity: f32,
    /// Population standard deviation of pairwise similarities.
    pub std_deviation: f32,
}

/// Evaluate the cohesion of a cluster's full membership.
///
/// Fewer than two embeddings is trivially cohesive; a cluster whose members
/// carry no embeddings at all is reported invalid.
pub fn evaluate(
    store: &dyn ClusterStore,
    cluster_id: ClusterId,
    config: &ClusteringConfig,
) -> Result<QualityMetrics, ClusterError> {
    let members = store.cluster_members(cluster_id, &Scope::Global)?;
    if members.is_empty() {
        return Err(ClusterError::ClusterNotFound(cluster_id));
    }

    let embeddings: Vec<&Embedding> = members.iter().filter_map(|f| f.usable_embedding()).collect();
    let metrics = metrics_for(cluster_id, members.len(), &embeddings, config);

    tracing::debug!(
        cluster = %cluster_id,
        faces = metrics.face_count,
        internal = metrics.internal_similarity,
        valid = metrics.is_valid,
        "evaluated cluster quality"
    );

    Ok(metrics)
}

fn metrics_for(
    cluster_id: ClusterId,
    face_count: usize,
    embeddings: &[&Embedding],
    config: &ClusteringConfig,
) -> QualityMetrics {
    let trivial = |is_valid: bool, internal: f32| QualityMetrics {
        cluster_id,
        is_valid,
        face_count,
        embedding_count: embeddings.len(),
        internal_similarity: internal,
        min_similarity: internal,
        max_similarity: internal,
        std_deviation: 0.0,
    };

    match embeddings.len() {
        0 => return trivial(false, 0.0),
        1 => return trivial(true, 1.0),
        _ => {}
    }

    let sims = pairwise(embeddings, &config.similarity);
    let n = sims.len() as f32;
    let mean = sims.iter().sum::<f32>() / n;
    let variance = sims.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;

    QualityMetrics {
        cluster_id,
        is_valid: mean >= config.base_threshold,
        face_count,
        embedding_count: embeddings.len(),
        internal_similarity: mean,
        min_similarity: sims.iter().copied().fold(f32::INFINITY, f32::min),
        max_similarity: sims.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        std_deviation: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::face;
    use crate::store::MemoryStore;
    use crate::types::Cluster;
    use chrono::Utc;

    fn cluster_with(store: &MemoryStore, embeddings: &[&[f32]]) -> ClusterId {
        let cluster = Cluster::new("test", Utc::now());
        for (i, values) in embeddings.iter().enumerate() {
            let f = face(None, values);
            store.add_face(f.clone()).unwrap();
            if i == 0 {
                store.create_cluster_with_face(&cluster, f.id).unwrap();
            } else {
                store.assign_face(f.id, cluster.id, Utc::now()).unwrap();
            }
        }
        cluster.id
    }

    #[test]
    fn test_single_member_is_trivially_valid() {
        let store = MemoryStore::new();
        let id = cluster_with(&store, &[&[1.0, 0.0]]);
        let m = evaluate(&store, id, &ClusteringConfig::default()).unwrap();
        assert!(m.is_valid);
        assert_eq!(m.face_count, 1);
        assert_eq!(m.internal_similarity, 1.0);
        assert_eq!(m.std_deviation, 0.0);
    }

    #[test]
    fn test_no_embeddings_is_invalid() {
        let store = MemoryStore::new();
        let id = cluster_with(&store, &[&[], &[]]);
        let m = evaluate(&store, id, &ClusteringConfig::default()).unwrap();
        assert!(!m.is_valid);
        assert_eq!(m.face_count, 2);
        assert_eq!(m.embedding_count, 0);
    }

    #[test]
    fn test_identical_members() {
        let store = MemoryStore::new();
        let id = cluster_with(&store, &[&[0.6, 0.8], &[0.6, 0.8], &[0.6, 0.8]]);
        let m = evaluate(&store, id, &ClusteringConfig::default()).unwrap();
        assert!(m.is_valid);
        assert_eq!(m.face_count, 3);
        assert!((m.internal_similarity - 1.0).abs() < 1e-6);
        assert!(m.std_deviation < 1e-6);
    }

    #[test]
    fn test_mixed_members_statistics() {
        let store = MemoryStore::new();
        let id = cluster_with(&store, &[&[1.0, 0.0], &[1.0, 0.0], &[0.0, 1.0]]);
        let m = evaluate(&store, id, &ClusteringConfig::default()).unwrap();

        // One identical pair (1.0), two orthogonal pairs.
        let orthogonal = 0.3 / (1.0 + 2f32.sqrt()) + 0.05;
        assert!((m.max_similarity - 1.0).abs() < 1e-6);
        assert!((m.min_similarity - orthogonal).abs() < 1e-6);
        let mean = (1.0 + 2.0 * orthogonal) / 3.0;
        assert!((m.internal_similarity - mean).abs() < 1e-6);
        assert!(m.std_deviation > 0.0);
        assert!(m.is_valid);
    }

    #[test]
    fn test_incoherent_cluster_is_invalid() {
        let store = MemoryStore::new();
        let id = cluster_with(&store, &[&[1.0, 0.0], &[0.0, 1.0]]);
        let m = evaluate(&store, id, &ClusteringConfig::default()).unwrap();
        assert!(!m.is_valid);
    }

    #[test]
    fn test_unknown_cluster_not_found() {
        let store = MemoryStore::new();
        let err = evaluate(&store, ClusterId::new(), &ClusteringConfig::default()).unwrap_err();
        assert!(matches!(err, ClusterError::ClusterNotFound(_)));
    }
}
