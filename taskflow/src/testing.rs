//! Testing utilities for queues and worker pools.
//!
//! - [`memory_queue`]: a [`Queue`] over a fresh [`MemoryStore`]
//! - [`RecordingHandler`]: succeeds and records every job it sees
//! - [`FlakyHandler`]: fails a fixed number of times, then succeeds
//! - [`FailingHandler`]: always fails with a fixed message
//! - [`wait_for_status`]: polls a job record until it reaches a status
//!
//! # Example
//!
//! ```rust
//! use taskflow::prelude::*;
//! use taskflow::testing::{memory_queue, wait_for_status, RecordingHandler};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (queue, _store) = memory_queue();
//!     let recorder = RecordingHandler::new();
//!
//!     let pool = WorkerPool::new(queue.clone(), WorkerConfig::default().with_concurrency(1));
//!     pool.register_handler("email", recorder.clone());
//!
//!     let token = CancellationToken::new();
//!     pool.start(token.clone());
//!
//!     let job = Job::new("email", &serde_json::json!({"to": "a@example.com"}))?;
//!     queue.enqueue(&job).await?;
//!     wait_for_status(&queue, job.id, JobStatus::Completed, Duration::from_secs(5)).await?;
//!
//!     token.cancel();
//!     pool.wait().await?;
//!     assert_eq!(recorder.job_ids(), vec![job.id]);
//!     Ok(())
//! }
//! ```

use crate::cancellation::CancellationToken;
use crate::error::{HandlerError, JobError, JobResult};
use crate::handler::Handler;
use crate::job::{Job, JobId, JobStatus};
use crate::queue::{Queue, QueueConfig};
use crate::store::MemoryStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A queue over a new in-memory store, plus the store for inspection.
#[must_use]
pub fn memory_queue() -> (Queue, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let queue = Queue::with_config(store.clone(), QueueConfig::default());
    (queue, store)
}

/// Succeeds and records each job it is called with.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<Job>>>,
    delay: Option<Duration>,
}

impl RecordingHandler {
    /// Create a handler with no delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Jobs seen so far, in call order.
    #[must_use]
    pub fn jobs(&self) -> Vec<Job> {
        self.seen.lock().clone()
    }

    /// IDs of jobs seen so far, in call order.
    #[must_use]
    pub fn job_ids(&self) -> Vec<JobId> {
        self.seen.lock().iter().map(|job| job.id).collect()
    }

    /// Number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, _ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        self.seen.lock().push(job.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Fails the first `failures` calls, then succeeds.
#[derive(Debug, Clone)]
pub struct FlakyHandler {
    failures: u32,
    calls: Arc<AtomicU32>,
}

impl FlakyHandler {
    /// Fail `failures` times before succeeding.
    #[must_use]
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for FlakyHandler {
    async fn handle(&self, _ctx: &CancellationToken, _job: &Job) -> Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(HandlerError::new(format!("flaky failure {call}")))
        } else {
            Ok(())
        }
    }
}

/// Always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    message: String,
    calls: Arc<AtomicU32>,
}

impl FailingHandler {
    /// Fail every call with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for FailingHandler {
    async fn handle(&self, _ctx: &CancellationToken, _job: &Job) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::new(&self.message))
    }
}

/// Poll the record of `id` until its status equals `status`.
///
/// # Errors
///
/// Returns the last store error, or [`JobError::InvalidJob`] describing the
/// last observed status if `timeout` elapses first.
pub async fn wait_for_status(
    queue: &Queue,
    id: JobId,
    status: JobStatus,
    timeout: Duration,
) -> JobResult<Job> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let current = queue.get(id).await?;
        if let Some(job) = current.as_ref().filter(|job| job.status == status) {
            return Ok(job.clone());
        }
        if tokio::time::Instant::now() >= deadline {
            let last = current.map_or_else(|| "missing".to_string(), |job| job.status.to_string());
            return Err(JobError::InvalidJob(format!(
                "job {id} did not reach '{status}' within {timeout:?} (last: {last})"
            )));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
