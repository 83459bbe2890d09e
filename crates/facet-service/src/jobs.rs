//! Clustering jobs and per-scope run exclusion.

use crate::error::ServiceError;
use facet_core::{ClusteringReport, RunControl, Scope};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Notify};
use uuid::Uuid;

/// Lifecycle of a clustering job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for an overlapping run to finish.
    Queued,
    Running,
    Completed { report: ClusteringReport },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

/// Clone-safe handle to a spawned clustering job.
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    scope: Scope,
    control: RunControl,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub(crate) fn new(
        id: Uuid,
        scope: Scope,
        control: RunControl,
        status: watch::Receiver<JobStatus>,
    ) -> Self {
        Self {
            id,
            scope,
            control,
            status,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Stop the job after the face currently being evaluated.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Wait for the job to finish and return its report.
    pub async fn wait(&self) -> Result<ClusteringReport, ServiceError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(JobStatus::is_finished)
            .await
            .map_err(|_| ServiceError::JobLost(self.id))?;

        match &*status {
            JobStatus::Completed { report } => Ok(report.clone()),
            JobStatus::Failed { error } => Err(ServiceError::JobFailed {
                id: self.id,
                error: error.clone(),
            }),
            JobStatus::Queued | JobStatus::Running => Err(ServiceError::JobLost(self.id)),
        }
    }
}

/// Registry of scopes with a running job.
///
/// A global run overlaps every user run; user runs overlap only runs for the
/// same user. Waiters are woken whenever a guard is released.
#[derive(Default)]
pub struct ScopeLocks {
    active: Mutex<Vec<Scope>>,
    released: Notify,
}

/// Releases its scope on drop.
pub struct ScopeGuard {
    locks: Arc<ScopeLocks>,
    scope: Scope,
}

impl ScopeLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn active(&self) -> MutexGuard<'_, Vec<Scope>> {
        // The list stays consistent even if a holder panicked.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `scope` if nothing overlapping is running.
    pub fn try_acquire(self: &Arc<Self>, scope: &Scope) -> Option<ScopeGuard> {
        let mut active = self.active();
        if active.iter().any(|s| s.overlaps(scope)) {
            return None;
        }
        active.push(scope.clone());
        Some(ScopeGuard {
            locks: Arc::clone(self),
            scope: scope.clone(),
        })
    }

    /// Wait until `scope` can be claimed.
    pub async fn acquire(self: &Arc<Self>, scope: &Scope) -> ScopeGuard {
        loop {
            // Register before checking so a release in between is not missed.
            let released = self.released.notified();
            if let Some(guard) = self.try_acquire(scope) {
                return guard;
            }
            released.await;
        }
    }

    pub fn is_busy(&self, scope: &Scope) -> bool {
        self.active().iter().any(|s| s.overlaps(scope))
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        {
            let mut active = self.locks.active();
            if let Some(pos) = active.iter().position(|s| *s == self.scope) {
                active.swap_remove(pos);
            }
        }
        self.locks.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn try_acquire_respects_overlap() {
        let locks = ScopeLocks::new();
        let alice = Scope::user("alice");
        let bob = Scope::user("bob");

        let guard = locks.try_acquire(&alice).unwrap();
        assert!(locks.try_acquire(&alice).is_none());
        assert!(locks.try_acquire(&Scope::Global).is_none());
        let bob_guard = locks.try_acquire(&bob).unwrap();

        drop(guard);
        assert!(locks.try_acquire(&Scope::Global).is_none());
        drop(bob_guard);
        assert!(!locks.is_busy(&Scope::Global));
        assert!(locks.try_acquire(&Scope::Global).is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let locks = ScopeLocks::new();
        let guard = locks.acquire(&Scope::user("alice")).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(&Scope::Global).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
        assert!(!locks.is_busy(&Scope::Global));
    }

    #[test]
    fn job_status_finished() {
        assert!(!JobStatus::Queued.is_finished());
        assert!(!JobStatus::Running.is_finished());
        assert!(JobStatus::Failed { error: "x".into() }.is_finished());
    }
}
