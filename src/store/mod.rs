//! Job status repository.
//!
//! Records live in an in-process cache. A [`Persistence`] strategy chosen at
//! construction decides whether they are also written through to a durable
//! TTL cache: [`Volatile`] keeps nothing outside the process, while
//! [`RedisPersistence`] survives restarts and is shared between instances.
//! Durable failures never fail the caller; the store degrades to the cache.

mod redis_backend;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::jobs::{normalize_id, Job, JobStatus};

pub use redis_backend::RedisPersistence;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable backend error: {0}")]
    Backend(String),
    #[error("job record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Where serialized job records go besides the local cache.
#[async_trait]
pub trait Persistence: Send + Sync {
    fn name(&self) -> &'static str;

    async fn put(&self, id: &str, record: &str, ttl: Duration) -> Result<(), StoreError>;

    /// `Ok(None)` when the record is absent or expired.
    async fn fetch(&self, id: &str) -> Result<Option<String>, StoreError>;
}

/// Keeps records in process memory only.
pub struct Volatile;

#[async_trait]
impl Persistence for Volatile {
    fn name(&self) -> &'static str {
        "volatile"
    }

    async fn put(&self, _id: &str, _record: &str, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn fetch(&self, _id: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

/// Fields applied by [`JobStore::set_status`].
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub error: Option<String>,
    pub output_files: Option<BTreeMap<String, PathBuf>>,
    pub summary_path: Option<PathBuf>,
}

impl StatusUpdate {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            error: None,
            output_files: None,
            summary_path: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(JobStatus::Failed).with_error(message)
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn with_outputs(mut self, outputs: BTreeMap<String, PathBuf>) -> Self {
        self.output_files = Some(outputs);
        self
    }

    pub fn with_summary(mut self, path: Option<PathBuf>) -> Self {
        self.summary_path = path;
        self
    }

    fn apply(self, job: &mut Job) {
        job.status = self.status;
        job.error_message = self.error;

        if let Some(outputs) = self.output_files {
            job.output_files.extend(outputs);
        }

        if let Some(summary) = self.summary_path.filter(|p| !p.as_os_str().is_empty()) {
            job.summary_path = Some(summary);
        }

        if self.status.is_terminal() {
            job.completed_at = Some(Utc::now());
        }
    }
}

pub struct JobStore {
    cache: RwLock<HashMap<String, Job>>,
    persistence: Arc<dyn Persistence>,
    ttl: Duration,
}

impl JobStore {
    /// Store without a durable backend.
    pub fn volatile() -> Self {
        Self::with_persistence(Arc::new(Volatile), 1)
    }

    /// Store writing through to `persistence` with a lifetime of `retention_days`.
    pub fn with_persistence(persistence: Arc<dyn Persistence>, retention_days: u32) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            persistence,
            ttl: Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.persistence.name()
    }

    /// Replaces any record with the same id and returns the stored job.
    pub async fn upsert(&self, job: Job) -> Job {
        let mut job = job;
        job.id = normalize_id(&job.id);

        match serde_json::to_string(&job) {
            Ok(record) => {
                if let Err(e) = self.persistence.put(&job.id, &record, self.ttl).await {
                    error!(
                        "Failed to persist job {} to {} backend, keeping it in memory only: {}",
                        job.id,
                        self.persistence.name(),
                        e
                    );
                }
            }
            Err(e) => error!("Failed to serialize job {}: {}", job.id, e),
        }

        self.cache.write().await.insert(job.id.clone(), job.clone());
        job
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        let id = normalize_id(id);

        if let Some(job) = self.cache.read().await.get(&id) {
            return Some(job.clone());
        }

        let record = match self.persistence.fetch(&id).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(
                    "Failed to read job {} from {} backend: {}",
                    id,
                    self.persistence.name(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_str::<Job>(&record) {
            Ok(job) => {
                debug!("Job {} restored from {} backend", id, self.persistence.name());
                self.cache.write().await.insert(id, job.clone());
                Some(job)
            }
            Err(e) => {
                warn!("Discarding unreadable record for job {}: {}", id, e);
                None
            }
        }
    }

    /// Mutates an owned copy of the record and stores it as a whole.
    /// Unknown ids are logged and left absent.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let Some(mut job) = self.get(id).await else {
            warn!("Cannot update job {}: not found", id);
            return None;
        };
        mutate(&mut job);
        Some(self.upsert(job).await)
    }

    /// Applies a status change, merging outputs key by key.
    ///
    /// Unknown ids and transitions out of a terminal state (or skipping
    /// `Processing`) are logged and ignored.
    pub async fn set_status(&self, id: &str, update: StatusUpdate) -> Option<Job> {
        let Some(mut job) = self.get(id).await else {
            warn!(
                "Cannot set status {} for job {}: not found",
                update.status, id
            );
            return None;
        };

        if !job.status.can_transition_to(update.status) {
            warn!(
                "Ignoring status change for job {}: {} -> {}",
                job.id, job.status, update.status
            );
            return Some(job);
        }

        update.apply(&mut job);
        Some(self.upsert(job).await)
    }
}
