use crate::types::{
    Cluster, ClusterId, ClusterMetadata, ClusterSample, ClusterSummary, Face, FaceId, Scope,
};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("face not found: {0}")]
    FaceNotFound(FaceId),
    #[error("cluster not found: {0}")]
    ClusterNotFound(ClusterId),
    #[error("face already exists: {0}")]
    DuplicateFace(FaceId),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Persistence capability for faces, clusters and face-to-cluster edges.
///
/// Every mutating method is a single atomic step: clustering commits one face
/// per call, so an interrupted run never leaves a half-written decision behind.
/// Implementations must be safe for concurrent use; callers invoke them from
/// blocking worker threads.
pub trait ClusterStore: Send + Sync {
    /// Ingest a face from the upstream detector.
    fn add_face(&self, face: Face) -> Result<(), StoreError>;

    fn face(&self, id: FaceId) -> Result<Option<Face>, StoreError>;

    fn cluster(&self, id: ClusterId) -> Result<Option<Cluster>, StoreError>;

    /// Faces in `scope` without a cluster, oldest detection first.
    fn unclustered_faces(&self, scope: &Scope) -> Result<Vec<Face>, StoreError>;

    /// Clusters with at least one member in `scope`, oldest first, each with
    /// up to `limit` member embeddings from `scope` (most confident detections
    /// first). `None` returns every member embedding.
    fn cluster_samples(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<ClusterSample>, StoreError>;

    /// Member faces of `cluster` within `scope`.
    fn cluster_members(&self, cluster: ClusterId, scope: &Scope) -> Result<Vec<Face>, StoreError>;

    fn member_count(&self, cluster: ClusterId, scope: &Scope) -> Result<usize, StoreError>;

    /// Number of clusters with at least one member in `scope`.
    fn cluster_count(&self, scope: &Scope) -> Result<usize, StoreError>;

    fn list_clusters(&self, scope: &Scope) -> Result<Vec<ClusterSummary>, StoreError>;

    /// Insert `cluster` and make `face` its founding member.
    fn create_cluster_with_face(&self, cluster: &Cluster, face: FaceId) -> Result<(), StoreError>;

    /// Point `face` at `cluster` and bump the cluster's `last_updated_at`.
    fn assign_face(
        &self,
        face: FaceId,
        cluster: ClusterId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Clear the face's cluster reference, returning the previous one.
    fn detach_face(&self, face: FaceId) -> Result<Option<ClusterId>, StoreError>;

    /// Move every member of `source` within `scope` to `target`.
    fn reassign_faces(
        &self,
        source: ClusterId,
        target: ClusterId,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Delete `cluster` if no face references it. Returns whether it was deleted.
    fn delete_cluster_if_empty(&self, cluster: ClusterId) -> Result<bool, StoreError>;

    /// Detach every member and delete the cluster. Returns the detached count.
    fn delete_cluster(&self, cluster: ClusterId) -> Result<usize, StoreError>;

    fn update_cluster_metadata(
        &self,
        cluster: ClusterId,
        patch: &ClusterMetadata,
        now: DateTime<Utc>,
    ) -> Result<Cluster, StoreError>;
}

/// In-memory [`ClusterStore`] implementation.
/// Data is lost on restart. Suitable for testing or ephemeral use.
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Insertion order doubles as the tie-break order.
    faces: Vec<Face>,
    clusters: Vec<Cluster>,
}

impl MemoryStoreInner {
    fn face_mut(&mut self, id: FaceId) -> Result<&mut Face, StoreError> {
        self.faces
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::FaceNotFound(id))
    }

    fn cluster_mut(&mut self, id: ClusterId) -> Result<&mut Cluster, StoreError> {
        self.clusters
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::ClusterNotFound(id))
    }

    fn members<'a>(
        &'a self,
        cluster: ClusterId,
        scope: &'a Scope,
    ) -> impl Iterator<Item = &'a Face> + 'a {
        self.faces.iter().filter(move |f| {
            f.cluster_id == Some(cluster) && scope.contains(f.owner_user_id.as_deref())
        })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryStoreInner::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStore for MemoryStore {
    fn add_face(&self, face: Face) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.faces.iter().any(|f| f.id == face.id) {
            return Err(StoreError::DuplicateFace(face.id));
        }
        if let Some(cluster) = face.cluster_id {
            inner.cluster_mut(cluster)?;
        }
        inner.faces.push(face);
        Ok(())
    }

    fn face(&self, id: FaceId) -> Result<Option<Face>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.faces.iter().find(|f| f.id == id).cloned())
    }

    fn cluster(&self, id: ClusterId) -> Result<Option<Cluster>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.clusters.iter().find(|c| c.id == id).cloned())
    }

    fn unclustered_faces(&self, scope: &Scope) -> Result<Vec<Face>, StoreError> {
        let inner = self.lock()?;
        let mut faces: Vec<Face> = inner
            .faces
            .iter()
            .filter(|f| f.cluster_id.is_none() && scope.contains(f.owner_user_id.as_deref()))
            .cloned()
            .collect();
        faces.sort_by_key(|f| f.detected_at);
        Ok(faces)
    }

    fn cluster_samples(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<ClusterSample>, StoreError> {
        let inner = self.lock()?;
        let mut samples = Vec::new();
        for cluster in &inner.clusters {
            let mut members: Vec<&Face> = inner.members(cluster.id, scope).collect();
            if members.is_empty() {
                continue;
            }
            members.sort_by(|a, b| b.detection_confidence.total_cmp(&a.detection_confidence));
            let embeddings = members
                .into_iter()
                .filter_map(|f| f.usable_embedding().cloned())
                .take(limit.unwrap_or(usize::MAX))
                .collect();
            samples.push(ClusterSample {
                cluster_id: cluster.id,
                embeddings,
            });
        }
        Ok(samples)
    }

    fn cluster_members(&self, cluster: ClusterId, scope: &Scope) -> Result<Vec<Face>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.members(cluster, scope).cloned().collect())
    }

    fn member_count(&self, cluster: ClusterId, scope: &Scope) -> Result<usize, StoreError> {
        let inner = self.lock()?;
        Ok(inner.members(cluster, scope).count())
    }

    fn cluster_count(&self, scope: &Scope) -> Result<usize, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .clusters
            .iter()
            .filter(|c| inner.members(c.id, scope).next().is_some())
            .count())
    }

    fn list_clusters(&self, scope: &Scope) -> Result<Vec<ClusterSummary>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .clusters
            .iter()
            .filter_map(|c| {
                let face_count = inner.members(c.id, scope).count();
                (face_count > 0).then(|| ClusterSummary {
                    cluster: c.clone(),
                    face_count,
                })
            })
            .collect())
    }

    fn create_cluster_with_face(&self, cluster: &Cluster, face: FaceId) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.face_mut(face)?.cluster_id = Some(cluster.id);
        inner.clusters.push(cluster.clone());
        Ok(())
    }

    fn assign_face(
        &self,
        face: FaceId,
        cluster: ClusterId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.cluster_mut(cluster)?.last_updated_at = now;
        inner.face_mut(face)?.cluster_id = Some(cluster);
        Ok(())
    }

    fn detach_face(&self, face: FaceId) -> Result<Option<ClusterId>, StoreError> {
        let mut inner = self.lock()?;
        Ok(inner.face_mut(face)?.cluster_id.take())
    }

    fn reassign_faces(
        &self,
        source: ClusterId,
        target: ClusterId,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        inner.cluster_mut(source)?;
        inner.cluster_mut(target)?.last_updated_at = now;

        let mut moved = 0;
        for face in inner.faces.iter_mut() {
            if face.cluster_id == Some(source) && scope.contains(face.owner_user_id.as_deref()) {
                face.cluster_id = Some(target);
                moved += 1;
            }
        }
        Ok(moved)
    }

    fn delete_cluster_if_empty(&self, cluster: ClusterId) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner.faces.iter().any(|f| f.cluster_id == Some(cluster)) {
            return Ok(false);
        }
        let before = inner.clusters.len();
        inner.clusters.retain(|c| c.id != cluster);
        Ok(inner.clusters.len() != before)
    }

    fn delete_cluster(&self, cluster: ClusterId) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        inner.cluster_mut(cluster)?;

        let mut detached = 0;
        for face in inner.faces.iter_mut() {
            if face.cluster_id == Some(cluster) {
                face.cluster_id = None;
                detached += 1;
            }
        }
        inner.clusters.retain(|c| c.id != cluster);
        Ok(detached)
    }

    fn update_cluster_metadata(
        &self,
        cluster: ClusterId,
        patch: &ClusterMetadata,
        now: DateTime<Utc>,
    ) -> Result<Cluster, StoreError> {
        let mut inner = self.lock()?;
        let cluster = inner.cluster_mut(cluster)?;
        patch.apply(cluster);
        cluster.last_updated_at = now;
        Ok(cluster.clone())
    }
}
