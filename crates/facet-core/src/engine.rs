//! Online greedy cluster assignment.
//!
//! Each face is compared against a capped sample of every candidate cluster's
//! members. The best-scoring eligible cluster wins if it clears the acceptance
//! rule; otherwise the face founds a new cluster. Batch runs commit one face
//! at a time, and clusters created earlier in a run are candidates for later
//! faces, so results depend on processing order (oldest detection first).

use crate::config::ClusteringConfig;
use crate::error::ClusterError;
use crate::similarity::weighted_similarity;
use crate::store::ClusterStore;
use crate::types::{Cluster, ClusterId, ClusterSample, Embedding, Face, FaceId, Scope};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Prefix of auto-generated cluster names.
pub const NEW_CLUSTER_NAME_PREFIX: &str = "Unknown Person";

/// Similarity statistics of one face against one candidate cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateScore {
    pub cluster_id: ClusterId,
    pub avg_similarity: f32,
    pub max_similarity: f32,
    pub sample_count: usize,
    pub score: f32,
}

/// Outcome of evaluating a face against the candidate set.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Existing(CandidateScore),
    New,
}

/// Committed result for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "cluster_id", rename_all = "snake_case")]
pub enum Assignment {
    AssignedExisting(ClusterId),
    AssignedNew(ClusterId),
}

impl Assignment {
    pub fn cluster_id(&self) -> ClusterId {
        match self {
            Assignment::AssignedExisting(id) | Assignment::AssignedNew(id) => *id,
        }
    }
}

/// Score `embedding` against one cluster sample.
///
/// Returns `None` when the sample holds no embeddings.
pub fn score_candidate(
    embedding: &Embedding,
    sample: &ClusterSample,
    config: &ClusteringConfig,
) -> Option<CandidateScore> {
    let sims: Vec<f32> = sample
        .embeddings
        .iter()
        .take(config.sample_size)
        .map(|member| weighted_similarity(embedding, member, &config.similarity))
        .collect();

    if sims.is_empty() {
        return None;
    }

    let sample_count = sims.len();
    let avg_similarity = sims.iter().sum::<f32>() / sample_count as f32;
    let max_similarity = sims.iter().copied().fold(f32::MIN, f32::max);
    let coverage = (sample_count as f32 / config.sample_size as f32).min(1.0);

    let weights = &config.scoring;
    let score = weights.average * avg_similarity
        + weights.maximum * max_similarity
        + weights.coverage * coverage;

    Some(CandidateScore {
        cluster_id: sample.cluster_id,
        avg_similarity,
        max_similarity,
        sample_count,
        score,
    })
}

/// Decide where a face with `embedding` belongs.
///
/// Eligible candidates have an average similarity of at least the base
/// threshold or a single member at the high-confidence threshold. Only the
/// top-ranked eligible candidate is considered for acceptance; ties keep the
/// older cluster.
pub fn decide(
    embedding: &Embedding,
    candidates: &[ClusterSample],
    config: &ClusteringConfig,
) -> Decision {
    let mut best: Option<CandidateScore> = None;

    for candidate in candidates
        .iter()
        .filter_map(|sample| score_candidate(embedding, sample, config))
        .filter(|c| {
            c.avg_similarity >= config.base_threshold
                || c.max_similarity >= config.high_confidence_threshold
        })
    {
        if best.map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }

    match best {
        Some(top)
            if top.max_similarity >= config.high_confidence_threshold
                || (top.avg_similarity >= config.base_threshold
                    && top.sample_count >= config.min_samples_for_average) =>
        {
            Decision::Existing(top)
        }
        _ => Decision::New,
    }
}

/// Why a batch run stopped before the backlog was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded,
}

/// External stop conditions for a batch run, checked between faces.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stop issuing further face evaluations. Already committed faces stay.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn interruption(&self) -> Option<Interruption> {
        if self.is_cancelled() {
            Some(Interruption::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Interruption::DeadlineExceeded)
        } else {
            None
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringReport {
    pub scope: Scope,
    /// Unclustered faces in scope when the run started.
    pub faces_total: usize,
    /// Faces that received a cluster.
    pub processed: usize,
    pub assigned_existing: usize,
    pub clusters_created: usize,
    /// Faces without a usable embedding.
    pub skipped: usize,
    pub failed: usize,
    pub interrupted: Option<Interruption>,
    /// False when the run was interrupted or any face failed.
    pub completed: bool,
    pub elapsed_ms: u64,
}

impl ClusteringReport {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            faces_total: 0,
            processed: 0,
            assigned_existing: 0,
            clusters_created: 0,
            skipped: 0,
            failed: 0,
            interrupted: None,
            completed: false,
            elapsed_ms: 0,
        }
    }
}

/// Assigns unclustered faces to clusters through a [`ClusterStore`].
pub struct ClusterEngine<'a> {
    store: &'a dyn ClusterStore,
    config: &'a ClusteringConfig,
}

impl<'a> ClusterEngine<'a> {
    pub fn new(store: &'a dyn ClusterStore, config: &'a ClusteringConfig) -> Self {
        Self { store, config }
    }

    /// Cluster a single unclustered face against the clusters of `scope`.
    ///
    /// A face owned outside `scope` is reported as not found.
    pub fn cluster_face(&self, face_id: FaceId, scope: &Scope) -> Result<Assignment, ClusterError> {
        let face = self
            .store
            .face(face_id)?
            .filter(|face| scope.contains(face.owner_user_id.as_deref()))
            .ok_or(ClusterError::FaceNotFound(face_id))?;
        if let Some(cluster) = face.cluster_id {
            return Err(ClusterError::AlreadyClustered {
                face: face_id,
                cluster,
            });
        }
        self.assign(&face, scope)
    }

    /// Evaluate and commit one face. The candidate view is re-read for every
    /// face, so clusters created by earlier faces are visible.
    pub fn assign(&self, face: &Face, scope: &Scope) -> Result<Assignment, ClusterError> {
        let embedding = face
            .usable_embedding()
            .ok_or(ClusterError::MissingEmbedding(face.id))?;

        let candidates = self
            .store
            .cluster_samples(scope, Some(self.config.sample_size))?;
        let now = Utc::now();

        match decide(embedding, &candidates, self.config) {
            Decision::Existing(top) => {
                self.store.assign_face(face.id, top.cluster_id, now)?;
                tracing::debug!(
                    face = %face.id,
                    cluster = %top.cluster_id,
                    score = top.score,
                    avg = top.avg_similarity,
                    max = top.max_similarity,
                    samples = top.sample_count,
                    "face joined existing cluster"
                );
                Ok(Assignment::AssignedExisting(top.cluster_id))
            }
            Decision::New => {
                // Derived from the scope's current cluster count rather than a
                // shared counter; names are labels, not keys.
                let ordinal = self.store.cluster_count(scope)? + 1;
                let cluster = Cluster::new(format!("{NEW_CLUSTER_NAME_PREFIX} {ordinal}"), now);
                self.store.create_cluster_with_face(&cluster, face.id)?;
                tracing::debug!(
                    face = %face.id,
                    cluster = %cluster.id,
                    name = %cluster.name,
                    candidates = candidates.len(),
                    "face founded new cluster"
                );
                Ok(Assignment::AssignedNew(cluster.id))
            }
        }
    }

    /// Cluster the unclustered backlog of `scope`, one committed face at a time.
    ///
    /// Per-face failures are logged and counted; only failing to read the
    /// backlog aborts the run.
    pub fn run(
        &self,
        scope: &Scope,
        control: &RunControl,
    ) -> Result<ClusteringReport, ClusterError> {
        let started = Instant::now();
        let mut report = ClusteringReport::new(scope.clone());

        let faces = self.store.unclustered_faces(scope)?;
        report.faces_total = faces.len();
        tracing::info!(%scope, faces = faces.len(), "clustering run started");

        for face in &faces {
            if let Some(reason) = control.interruption() {
                tracing::warn!(
                    %scope,
                    ?reason,
                    processed = report.processed,
                    "clustering run interrupted"
                );
                report.interrupted = Some(reason);
                break;
            }

            match self.assign(face, scope) {
                Ok(Assignment::AssignedExisting(_)) => {
                    report.processed += 1;
                    report.assigned_existing += 1;
                }
                Ok(Assignment::AssignedNew(_)) => {
                    report.processed += 1;
                    report.clusters_created += 1;
                }
                Err(ClusterError::MissingEmbedding(id)) => {
                    report.skipped += 1;
                    tracing::warn!(face = %id, "skipping face without embedding");
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(face = %face.id, error = %err, "failed to cluster face");
                }
            }
        }

        report.completed = report.interrupted.is_none() && report.failed == 0;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            %scope,
            processed = report.processed,
            assigned_existing = report.assigned_existing,
            clusters_created = report.clusters_created,
            skipped = report.skipped,
            failed = report.failed,
            completed = report.completed,
            elapsed_ms = report.elapsed_ms,
            "clustering run finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::face;
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample(values: &[&[f32]]) -> ClusterSample {
        ClusterSample {
            cluster_id: ClusterId::new(),
            embeddings: values.iter().map(|v| Embedding::new(v.to_vec())).collect(),
        }
    }

    /// Adds faces with strictly increasing detection times.
    fn add_faces(store: &MemoryStore, faces: &mut [Face]) {
        let base = Utc::now();
        for (i, f) in faces.iter_mut().enumerate() {
            f.detected_at = base + ChronoDuration::seconds(i as i64);
            store.add_face(f.clone()).unwrap();
        }
    }

    // Unit vectors in 3-D: cos(A, A2) = 0.92, cos(A, B) = 0.1
    const A: [f32; 3] = [1.0, 0.0, 0.0];
    const A2: [f32; 3] = [0.92, 0.391_918, 0.0];
    const B: [f32; 3] = [0.1, -0.994_987, 0.0];
    // Composite similarity to A is ~0.38: eligible on average, never high-confidence.
    const WEAK: [f32; 3] = [0.3, 0.953_939, 0.0];

    #[test]
    fn test_decide_empty_candidates() {
        let cfg = ClusteringConfig::default();
        assert_eq!(decide(&Embedding::new(A.to_vec()), &[], &cfg), Decision::New);
    }

    #[test]
    fn test_decide_high_confidence_single_member() {
        let cfg = ClusteringConfig::default();
        let candidate = sample(&[&A]);
        match decide(&Embedding::new(A2.to_vec()), &[candidate.clone()], &cfg) {
            Decision::Existing(top) => {
                assert_eq!(top.cluster_id, candidate.cluster_id);
                assert_eq!(top.sample_count, 1);
                assert!(top.max_similarity >= 0.5);
            }
            Decision::New => panic!("expected high-confidence match"),
        }
    }

    #[test]
    fn test_decide_average_needs_two_samples() {
        let cfg = ClusteringConfig::default();
        let probe = Embedding::new(A.to_vec());

        let single = sample(&[&WEAK]);
        let score = score_candidate(&probe, &single, &cfg).unwrap();
        assert!(score.avg_similarity >= 0.3 && score.max_similarity < 0.5);
        assert_eq!(decide(&probe, &[single], &cfg), Decision::New);

        let pair = sample(&[&WEAK, &WEAK]);
        assert!(matches!(decide(&probe, &[pair], &cfg), Decision::Existing(_)));
    }

    #[test]
    fn test_decide_picks_highest_score() {
        let cfg = ClusteringConfig::default();
        let weak = sample(&[&WEAK, &WEAK]);
        let strong = sample(&[&A2, &A]);
        match decide(&Embedding::new(A.to_vec()), &[weak, strong.clone()], &cfg) {
            Decision::Existing(top) => assert_eq!(top.cluster_id, strong.cluster_id),
            Decision::New => panic!("expected a match"),
        }
    }

    #[test]
    fn test_decide_only_top_candidate_is_considered() {
        let cfg = ClusteringConfig::default();
        let probe = Embedding::new(A.to_vec());
        // Similarity to A is ~0.48: eligible on average, just short of high confidence.
        let near: [f32; 3] = [0.45, 0.893_029, 0.0];
        let opposite: [f32; 3] = [-1.0, 0.0, 0.0];

        let single = sample(&[&near]);
        let mut members: Vec<&[f32]> = vec![&A2];
        members.extend(std::iter::repeat(&opposite[..]).take(9));
        let spread = sample(&members);

        let top = score_candidate(&probe, &single, &cfg).unwrap();
        let runner_up = score_candidate(&probe, &spread, &cfg).unwrap();
        assert!(top.score > runner_up.score);
        assert!(runner_up.max_similarity >= cfg.high_confidence_threshold);

        // The runner-up alone would be accepted.
        assert!(matches!(
            decide(&probe, &[spread.clone()], &cfg),
            Decision::Existing(_)
        ));
        // The top candidate fails acceptance and the runner-up is not retried.
        assert_eq!(decide(&probe, &[spread, single], &cfg), Decision::New);
    }

    #[test]
    fn test_decide_ignores_mismatched_dimensions() {
        let cfg = ClusteringConfig::default();
        let stale = sample(&[&[1.0, 0.0], &[1.0, 0.0]]);
        assert_eq!(decide(&Embedding::new(A.to_vec()), &[stale], &cfg), Decision::New);
    }

    #[test]
    fn test_score_candidate_coverage_and_cap() {
        let cfg = ClusteringConfig {
            sample_size: 2,
            ..ClusteringConfig::default()
        };
        let probe = Embedding::new(A.to_vec());
        let score = score_candidate(&probe, &sample(&[&A, &A, &B]), &cfg).unwrap();
        assert_eq!(score.sample_count, 2);
        assert!((score.avg_similarity - 1.0).abs() < 1e-6);
        assert!((score.score - 1.0).abs() < 1e-5);

        assert!(score_candidate(&probe, &sample(&[]), &cfg).is_none());
    }

    #[test]
    fn test_single_face_founds_cluster() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let f = face(None, &A);
        store.add_face(f.clone()).unwrap();

        let engine = ClusterEngine::new(&store, &cfg);
        let assignment = engine.cluster_face(f.id, &Scope::Global).unwrap();
        let Assignment::AssignedNew(cluster_id) = assignment else {
            panic!("expected a new cluster");
        };

        let clusters = store.list_clusters(&Scope::Global).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].face_count, 1);
        assert_eq!(clusters[0].cluster.name, "Unknown Person 1");
        assert_eq!(store.face(f.id).unwrap().unwrap().cluster_id, Some(cluster_id));
    }

    #[test]
    fn test_similar_face_joins_existing_cluster() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let engine = ClusterEngine::new(&store, &cfg);

        let f1 = face(None, &A);
        store.add_face(f1.clone()).unwrap();
        let first = engine.cluster_face(f1.id, &Scope::Global).unwrap();

        let f2 = face(None, &A2);
        store.add_face(f2.clone()).unwrap();
        let second = engine.cluster_face(f2.id, &Scope::Global).unwrap();

        assert_eq!(second, Assignment::AssignedExisting(first.cluster_id()));
        assert_eq!(store.cluster_count(&Scope::Global).unwrap(), 1);
    }

    #[test]
    fn test_cluster_face_stays_within_scope() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let engine = ClusterEngine::new(&store, &cfg);
        let mut faces = [face(Some("alice"), &A), face(Some("bob"), &A2), face(None, &A2)];
        add_faces(&store, &mut faces);
        let alice = Scope::user("alice");

        engine.cluster_face(faces[0].id, &alice).unwrap();
        for other in &faces[1..] {
            assert!(matches!(
                engine.cluster_face(other.id, &alice),
                Err(ClusterError::FaceNotFound(id)) if id == other.id
            ));
        }
        assert_eq!(store.cluster_count(&Scope::user("bob")).unwrap(), 0);
        assert_eq!(store.unclustered_faces(&Scope::Global).unwrap().len(), 2);

        // The global scope covers every owner.
        assert!(matches!(
            engine.cluster_face(faces[1].id, &Scope::Global).unwrap(),
            Assignment::AssignedExisting(_)
        ));
    }

    #[test]
    fn test_cluster_face_rejects_clustered_face() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let engine = ClusterEngine::new(&store, &cfg);
        let f = face(None, &A);
        store.add_face(f.clone()).unwrap();
        engine.cluster_face(f.id, &Scope::Global).unwrap();

        assert!(matches!(
            engine.cluster_face(f.id, &Scope::Global),
            Err(ClusterError::AlreadyClustered { .. })
        ));
        assert!(matches!(
            engine.cluster_face(FaceId::new(), &Scope::Global),
            Err(ClusterError::FaceNotFound(_))
        ));
    }

    #[test]
    fn test_orthogonal_faces_form_two_clusters() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let mut faces = [face(None, &[1.0, 0.0]), face(None, &[0.0, 1.0])];
        add_faces(&store, &mut faces);

        let report = ClusterEngine::new(&store, &cfg)
            .run(&Scope::Global, &RunControl::new())
            .unwrap();
        assert_eq!(report.clusters_created, 2);
        assert_eq!(report.assigned_existing, 0);
        assert!(report.completed);
    }

    #[test]
    fn test_end_to_end_three_faces() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let mut faces = [face(None, &A), face(None, &A2), face(None, &B)];
        add_faces(&store, &mut faces);

        let report = ClusterEngine::new(&store, &cfg)
            .run(&Scope::Global, &RunControl::new())
            .unwrap();
        assert_eq!(report.faces_total, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.clusters_created, 2);
        assert_eq!(report.assigned_existing, 1);

        let cluster_of = |id| store.face(id).unwrap().unwrap().cluster_id.unwrap();
        let [f1, f2, f3] = &faces;
        assert_eq!(cluster_of(f1.id), cluster_of(f2.id));
        assert_ne!(cluster_of(f1.id), cluster_of(f3.id));
        assert_eq!(store.member_count(cluster_of(f3.id), &Scope::Global).unwrap(), 1);
    }

    #[test]
    fn test_missing_embedding_is_skipped() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let mut blank = face(None, &[]);
        blank.embedding = None;
        let mut faces = [face(None, &A), blank, face(None, &[]), face(None, &A2)];
        add_faces(&store, &mut faces);

        let report = ClusterEngine::new(&store, &cfg)
            .run(&Scope::Global, &RunControl::new())
            .unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.clusters_created, 1);
        assert!(report.completed);
        assert_eq!(store.unclustered_faces(&Scope::Global).unwrap().len(), 2);
    }

    #[test]
    fn test_cancelled_run_is_resumable() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let mut faces = [face(None, &A), face(None, &B)];
        add_faces(&store, &mut faces);
        let engine = ClusterEngine::new(&store, &cfg);

        let control = RunControl::new();
        control.cancel();
        let report = engine.run(&Scope::Global, &control).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.interrupted, Some(Interruption::Cancelled));
        assert!(!report.completed);

        let report = engine.run(&Scope::Global, &RunControl::new()).unwrap();
        assert_eq!(report.processed, 2);
        assert!(report.completed);
    }

    #[test]
    fn test_expired_deadline_stops_run() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        store.add_face(face(None, &A)).unwrap();

        let control = RunControl::new().with_deadline(Instant::now());
        let report = ClusterEngine::new(&store, &cfg)
            .run(&Scope::Global, &control)
            .unwrap();
        assert_eq!(report.interrupted, Some(Interruption::DeadlineExceeded));
        assert_eq!(report.processed, 0);
    }

    #[test]
    fn test_user_scope_only_touches_own_faces() {
        let store = MemoryStore::new();
        let cfg = ClusteringConfig::default();
        let mut faces = [face(Some("alice"), &A), face(Some("bob"), &A2)];
        add_faces(&store, &mut faces);

        let report = ClusterEngine::new(&store, &cfg)
            .run(&Scope::user("alice"), &RunControl::new())
            .unwrap();
        assert_eq!(report.faces_total, 1);
        assert_eq!(report.clusters_created, 1);
        assert_eq!(store.unclustered_faces(&Scope::Global).unwrap().len(), 1);

        // Bob's run cannot see Alice's cluster and names its own from his count.
        let report = ClusterEngine::new(&store, &cfg)
            .run(&Scope::user("bob"), &RunControl::new())
            .unwrap();
        assert_eq!(report.clusters_created, 1);
        let bob = store.list_clusters(&Scope::user("bob")).unwrap();
        assert_eq!(bob[0].cluster.name, "Unknown Person 1");
        assert_eq!(store.cluster_count(&Scope::Global).unwrap(), 2);
    }

    #[test]
    fn test_noisy_identities_recovered() {
        const DIM: usize = 64;
        const IDENTITIES: usize = 4;
        const PER_IDENTITY: usize = 6;

        // Disjoint-support centroids of norm 10: exactly orthogonal.
        let centroid = |k: usize| -> Vec<f32> {
            let block = DIM / IDENTITIES;
            (0..DIM)
                .map(|d| if d / block == k { 10.0 / (block as f32).sqrt() } else { 0.0 })
                .collect()
        };

        let mut rng = StdRng::seed_from_u64(7);
        let mut faces = Vec::new();
        for i in 0..PER_IDENTITY {
            for k in 0..IDENTITIES {
                let values: Vec<f32> = centroid(k)
                    .into_iter()
                    .map(|v| v + rng.gen_range(-0.05..0.05))
                    .collect();
                let owner = format!("user{}", i % 2);
                let mut f = face(Some(owner.as_str()), &values);
                f.detection_confidence = rng.gen_range(0.5..1.0);
                faces.push((k, f));
            }
        }

        let store = MemoryStore::new();
        let base = Utc::now();
        for (i, (_, f)) in faces.iter_mut().enumerate() {
            f.detected_at = base + ChronoDuration::seconds(i as i64);
            store.add_face(f.clone()).unwrap();
        }

        let cfg = ClusteringConfig::default();
        let report = ClusterEngine::new(&store, &cfg)
            .run(&Scope::Global, &RunControl::new())
            .unwrap();
        assert_eq!(report.clusters_created, IDENTITIES);
        assert_eq!(report.processed, IDENTITIES * PER_IDENTITY);

        for k in 0..IDENTITIES {
            let mut ids = faces
                .iter()
                .filter(|(ident, _)| *ident == k)
                .map(|(_, f)| store.face(f.id).unwrap().unwrap().cluster_id);
            let first = ids.next().unwrap();
            assert!(ids.all(|id| id == first));
        }
    }
}
