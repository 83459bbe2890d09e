//! Async service layer over `facet-core`.
//!
//! Clustering runs are spawned as background jobs with at most one run per
//! overlapping scope; maintenance and diagnostics are offloaded to the
//! blocking pool.

pub mod config;
pub mod error;
pub mod jobs;
pub mod service;

pub use config::{Config, ConfigError};
pub use error::ServiceError;
pub use jobs::{JobHandle, JobStatus, ScopeGuard, ScopeLocks};
pub use service::ClusterService;
