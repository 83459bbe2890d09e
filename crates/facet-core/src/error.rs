use crate::store::StoreError;
use crate::types::{ClusterId, FaceId};
use thiserror::Error;

/// Errors surfaced by clustering, diagnostics and maintenance operations.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("cluster not found: {0}")]
    ClusterNotFound(ClusterId),
    #[error("face not found: {0}")]
    FaceNotFound(FaceId),
    #[error("face {face} already belongs to cluster {cluster}")]
    AlreadyClustered { face: FaceId, cluster: ClusterId },
    #[error("cannot merge cluster {0} into itself")]
    SelfMerge(ClusterId),
    #[error("face {0} has no embedding")]
    MissingEmbedding(FaceId),
    #[error("store: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ClusterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::FaceNotFound(id) => ClusterError::FaceNotFound(id),
            StoreError::ClusterNotFound(id) => ClusterError::ClusterNotFound(id),
            other => ClusterError::Store(other),
        }
    }
}

impl ClusterError {
    /// Whether this error names a missing face or cluster.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClusterError::ClusterNotFound(_) | ClusterError::FaceNotFound(_)
        )
    }
}
