//! Operator-driven cluster maintenance: merge, detach, delete and metadata.
//!
//! Clusters live in one identity space shared by all users. A user-scoped
//! merge moves only that user's faces, so the source survives while other
//! users' faces still reference it. No operation ever leaves a cluster empty.

use crate::error::ClusterError;
use crate::store::ClusterStore;
use crate::types::{Cluster, ClusterId, ClusterMetadata, FaceId, Scope};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub moved_faces: usize,
    pub source_deleted: bool,
}

/// Outcome of detaching a face. Detaching an unclustered face succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachOutcome {
    Detached {
        cluster_id: ClusterId,
        cluster_deleted: bool,
    },
    AlreadyDetached,
}

/// Move every member of `source` within `scope` into `target`.
///
/// Both clusters must have members in `scope`. The source is deleted once no
/// face in any scope references it.
pub fn merge(
    store: &dyn ClusterStore,
    source: ClusterId,
    target: ClusterId,
    scope: &Scope,
) -> Result<MergeOutcome, ClusterError> {
    if source == target {
        return Err(ClusterError::SelfMerge(source));
    }
    for id in [source, target] {
        if store.member_count(id, scope)? == 0 {
            return Err(ClusterError::ClusterNotFound(id));
        }
    }

    let moved_faces = store.reassign_faces(source, target, scope, Utc::now())?;
    let source_deleted = store.delete_cluster_if_empty(source)?;

    tracing::info!(
        %source,
        %target,
        %scope,
        moved_faces,
        source_deleted,
        "merged clusters"
    );

    Ok(MergeOutcome {
        moved_faces,
        source_deleted,
    })
}

/// Return a face to the unclustered pool, deleting its cluster if it was the
/// last member.
pub fn detach_face(store: &dyn ClusterStore, face: FaceId) -> Result<DetachOutcome, ClusterError> {
    let Some(cluster_id) = store.detach_face(face)? else {
        tracing::debug!(%face, "face already detached");
        return Ok(DetachOutcome::AlreadyDetached);
    };

    let cluster_deleted = store.delete_cluster_if_empty(cluster_id)?;
    tracing::info!(%face, cluster = %cluster_id, cluster_deleted, "detached face");

    Ok(DetachOutcome::Detached {
        cluster_id,
        cluster_deleted,
    })
}

/// Detach every member and delete the cluster. Returns the detached count.
pub fn delete_cluster(store: &dyn ClusterStore, cluster: ClusterId) -> Result<usize, ClusterError> {
    let detached = store.delete_cluster(cluster)?;
    tracing::info!(%cluster, detached, "deleted cluster");
    Ok(detached)
}

/// Apply a metadata patch. Last write wins.
pub fn update_metadata(
    store: &dyn ClusterStore,
    cluster: ClusterId,
    patch: &ClusterMetadata,
) -> Result<Cluster, ClusterError> {
    let updated = store.update_cluster_metadata(cluster, patch, Utc::now())?;
    tracing::info!(%cluster, name = %updated.name, "updated cluster metadata");
    Ok(updated)
}

pub fn rename(
    store: &dyn ClusterStore,
    cluster: ClusterId,
    name: impl Into<String>,
) -> Result<Cluster, ClusterError> {
    update_metadata(store, cluster, &ClusterMetadata::rename(name))
}

pub fn set_person_name(
    store: &dyn ClusterStore,
    cluster: ClusterId,
    person_name: Option<String>,
) -> Result<Cluster, ClusterError> {
    update_metadata(store, cluster, &ClusterMetadata::person_name(person_name))
}

pub fn set_description(
    store: &dyn ClusterStore,
    cluster: ClusterId,
    description: Option<String>,
) -> Result<Cluster, ClusterError> {
    update_metadata(store, cluster, &ClusterMetadata::description(description))
}
