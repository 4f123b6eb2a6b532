//! Durable job records plus a per-type priority index.
//!
//! Each job lives in two places in the store:
//!
//! - `{prefix}:data:{id}`: the JSON record, rewritten on every state change
//!   with a fresh expiry.
//! - `{prefix}:queue:{type}`: a sorted set of pending job IDs scored by
//!   [`Job::score`].
//!
//! [`Queue::dequeue`] is the only operation that removes from the index, and
//! it does so with the store's atomic pop-max, so a job is claimed by at
//! most one worker.

use crate::error::{JobResult, StoreError};
use crate::job::{Job, JobId, JobStatus};
use crate::observability::JobQueueObserver;
use crate::store::JobStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Key prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "taskflow:jobs";

/// Expiry applied to job records on every write.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Queue key layout and record expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Namespace for every key the queue writes.
    pub prefix: String,
    /// Expiry re-armed on every record write.
    pub record_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            record_ttl: DEFAULT_RECORD_TTL,
        }
    }
}

/// Handle to the job queue. Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("config", &self.config).finish()
    }
}

impl Queue {
    /// Queue over `store` with the default prefix and expiry.
    pub fn new(store: impl JobStore + 'static) -> Self {
        Self::with_config(Arc::new(store), QueueConfig::default())
    }

    /// Queue over a shared store with explicit settings.
    ///
    /// An empty prefix falls back to [`DEFAULT_PREFIX`].
    #[must_use]
    pub fn with_config(store: Arc<dyn JobStore>, mut config: QueueConfig) -> Self {
        if config.prefix.is_empty() {
            config.prefix = DEFAULT_PREFIX.to_string();
        }
        Self { store, config }
    }

    /// Active settings.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}:data:{id}", self.config.prefix)
    }

    fn index_key(&self, job_type: &str) -> String {
        format!("{}:queue:{job_type}", self.config.prefix)
    }

    /// Persist `job` and add it to its type's priority index.
    ///
    /// The job is visible to workers only once this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the record cannot be encoded, or a
    /// store error if either write fails.
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
    pub async fn enqueue(&self, job: &Job) -> JobResult<()> {
        self.write_record(job).await?;
        self.store
            .zadd(&self.index_key(&job.job_type), &job.id.to_string(), job.score())
            .await?;
        JobQueueObserver::log_enqueued(job);
        Ok(())
    }

    /// Claim the highest-priority pending job of `job_type`.
    ///
    /// Returns `Ok(None)` when the index is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RecordMissing`] if the index held an ID whose
    /// record has expired; the ID is consumed either way. Store failures
    /// and undecodable records are returned as errors.
    #[instrument(skip(self))]
    pub async fn dequeue(&self, job_type: &str) -> JobResult<Option<Job>> {
        let Some((id, _score)) = self.store.zpopmax(&self.index_key(job_type)).await? else {
            return Ok(None);
        };

        let bytes = self
            .store
            .get(&self.record_key(&id))
            .await?
            .ok_or(StoreError::RecordMissing(id))?;
        let job: Job = serde_json::from_slice(&bytes)?;

        JobQueueObserver::log_dequeued(&job);
        Ok(Some(job))
    }

    /// Overwrite the job's record. The index is left untouched.
    ///
    /// # Errors
    ///
    /// Returns a serialization or store error.
    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status))]
    pub async fn update(&self, job: &Job) -> JobResult<()> {
        self.write_record(job).await?;
        JobQueueObserver::log_updated(job.id, job.status);
        Ok(())
    }

    /// Mark `job` as retrying and enqueue it again.
    ///
    /// The score is recomputed from the original `created_at`, so a retried
    /// job keeps its place relative to newer work of the same priority.
    ///
    /// # Errors
    ///
    /// Same as [`enqueue`](Self::enqueue).
    pub async fn requeue(&self, job: &mut Job) -> JobResult<()> {
        job.status = JobStatus::Retrying;
        self.enqueue(job).await
    }

    /// Read a job record without claiming it.
    ///
    /// # Errors
    ///
    /// Returns a serialization or store error.
    pub async fn get(&self, id: JobId) -> JobResult<Option<Job>> {
        let Some(bytes) = self.store.get(&self.record_key(&id.to_string())).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Number of pending entries in `job_type`'s index.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn pending_count(&self, job_type: &str) -> JobResult<usize> {
        Ok(self.store.zcard(&self.index_key(job_type)).await?)
    }

    /// Release the store. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a store error if the backend fails to shut down.
    pub async fn close(&self) -> JobResult<()> {
        self.store.close().await?;
        Ok(())
    }

    async fn write_record(&self, job: &Job) -> JobResult<()> {
        let bytes = serde_json::to_vec(job)?;
        self.store
            .set_ex(&self.record_key(&job.id.to_string()), bytes, self.config.record_ttl)
            .await?;
        Ok(())
    }
}
