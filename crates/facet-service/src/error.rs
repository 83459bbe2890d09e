use crate::config::ConfigError;
use facet_core::ClusterError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("clustering job {0} ended without reporting")]
    JobLost(Uuid),
    #[error("clustering job {id} failed: {error}")]
    JobFailed { id: Uuid, error: String },
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Cluster(e) if e.is_not_found())
    }
}
