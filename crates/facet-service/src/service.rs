use crate::config::{Config, ConfigError};
use crate::error::ServiceError;
use crate::jobs::{JobHandle, JobStatus, ScopeLocks};
use facet_core::{
    maintenance, quality, threshold, Cluster, ClusterEngine, ClusterError, ClusterId, ClusterStore,
    ClusterSummary, ClusteringConfig, DetachOutcome, FaceId, MergeOutcome, QualityMetrics,
    RunControl, Scope, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Async facade over the clustering core.
///
/// Store access is blocking, so every call is moved onto tokio's blocking
/// pool. Clustering runs are spawned as jobs; at most one job runs per
/// overlapping scope, later ones queue.
#[derive(Clone)]
pub struct ClusterService {
    store: Arc<dyn ClusterStore>,
    config: Arc<ClusteringConfig>,
    locks: Arc<ScopeLocks>,
    run_timeout: Option<Duration>,
}

impl ClusterService {
    /// Fails if `config` does not pass [`ClusteringConfig::validate`].
    pub fn new(
        store: Arc<dyn ClusterStore>,
        config: ClusteringConfig,
    ) -> Result<Self, ServiceError> {
        config.validate().map_err(ConfigError::from)?;
        Ok(Self {
            store,
            config: Arc::new(config),
            locks: ScopeLocks::new(),
            run_timeout: None,
        })
    }

    pub fn from_config(
        store: Arc<dyn ClusterStore>,
        config: &Config,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            run_timeout: config.run_timeout,
            ..Self::new(store, config.clustering.clone())?
        })
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Start clustering the unclustered faces of `scope` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger_clustering(&self, scope: Scope) -> JobHandle {
        let id = Uuid::new_v4();
        let control = RunControl::new();
        let (tx, rx) = watch::channel(JobStatus::Queued);
        let handle = JobHandle::new(id, scope.clone(), control.clone(), rx);

        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let locks = Arc::clone(&self.locks);
        let run_timeout = self.run_timeout;

        tracing::info!(job = %id, %scope, "clustering job queued");

        tokio::spawn(async move {
            let _guard = locks.acquire(&scope).await;
            tx.send_replace(JobStatus::Running);
            tracing::info!(job = %id, %scope, "clustering job started");

            // The deadline counts from the start of the run, not the queueing.
            let control = match run_timeout {
                Some(timeout) => control.with_timeout(timeout),
                None => control,
            };
            let result = tokio::task::spawn_blocking(move || {
                ClusterEngine::new(store.as_ref(), &config).run(&scope, &control)
            })
            .await;

            let status = match result {
                Ok(Ok(report)) => JobStatus::Completed { report },
                Ok(Err(err)) => {
                    tracing::error!(job = %id, error = %err, "clustering job failed");
                    JobStatus::Failed {
                        error: err.to_string(),
                    }
                }
                Err(err) => {
                    tracing::error!(job = %id, error = %err, "clustering job panicked");
                    JobStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            tx.send_replace(status);
        });

        handle
    }

    pub async fn cluster_quality(
        &self,
        cluster: ClusterId,
    ) -> Result<QualityMetrics, ServiceError> {
        self.blocking(move |store, config| quality::evaluate(store, cluster, config))
            .await
    }

    /// Suggest a threshold from one user's clusters, or from all clusters.
    pub async fn estimate_optimal_threshold(
        &self,
        user: Option<UserId>,
    ) -> Result<f32, ServiceError> {
        let scope = Scope::from(user);
        self.blocking(move |store, config| {
            threshold::estimate_optimal_threshold(store, &scope, config)
        })
        .await
    }

    pub async fn merge_clusters(
        &self,
        source: ClusterId,
        target: ClusterId,
        scope: Scope,
    ) -> Result<MergeOutcome, ServiceError> {
        self.blocking(move |store, _| maintenance::merge(store, source, target, &scope))
            .await
    }

    pub async fn detach_face(&self, face: FaceId) -> Result<DetachOutcome, ServiceError> {
        self.blocking(move |store, _| maintenance::detach_face(store, face))
            .await
    }

    pub async fn delete_cluster(&self, cluster: ClusterId) -> Result<usize, ServiceError> {
        self.blocking(move |store, _| maintenance::delete_cluster(store, cluster))
            .await
    }

    pub async fn rename_cluster(
        &self,
        cluster: ClusterId,
        name: String,
    ) -> Result<Cluster, ServiceError> {
        self.blocking(move |store, _| maintenance::rename(store, cluster, name))
            .await
    }

    pub async fn set_person_name(
        &self,
        cluster: ClusterId,
        person_name: Option<String>,
    ) -> Result<Cluster, ServiceError> {
        self.blocking(move |store, _| maintenance::set_person_name(store, cluster, person_name))
            .await
    }

    pub async fn set_description(
        &self,
        cluster: ClusterId,
        description: Option<String>,
    ) -> Result<Cluster, ServiceError> {
        self.blocking(move |store, _| maintenance::set_description(store, cluster, description))
            .await
    }

    pub async fn list_clusters(&self, scope: Scope) -> Result<Vec<ClusterSummary>, ServiceError> {
        self.blocking(move |store, _| Ok(store.list_clusters(&scope)?))
            .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&dyn ClusterStore, &ClusteringConfig) -> Result<T, ClusterError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let result = tokio::task::spawn_blocking(move || f(store.as_ref(), &config)).await?;
        Ok(result?)
    }
}
