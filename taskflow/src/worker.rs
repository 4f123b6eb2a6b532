//! Worker pool: per-type execution loops driving claim, dispatch and retry.
//!
//! [`WorkerPool::start`] spawns `concurrency` loops for every registered job
//! type. Each loop repeatedly claims the next job of its type, runs the
//! handler and records the outcome:
//!
//! 1. `dequeue`; if nothing is pending, sleep for the poll interval.
//! 2. `mark_started` and persist.
//! 3. Success: `mark_completed` and persist.
//! 4. Failure: `mark_failed` and persist, then `requeue` while attempts
//!    remain. A failed requeue leaves the job `failed` with both errors.
//!
//! Loops stop claiming once the token is cancelled; a job already running is
//! allowed to finish. [`WorkerPool::wait`] joins every loop and then closes
//! the store.

use crate::cancellation::CancellationToken;
use crate::error::{HandlerError, JobError, JobResult};
use crate::handler::{BoxedHandler, Handler};
use crate::job::Job;
use crate::observability::{JobExecutionContext, JobQueueObserver};
use crate::queue::Queue;
use crate::registry::{HandlerRegistry, HandlerSnapshot};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Loops per job type when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Idle wait between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Execution loops per registered job type.
    pub concurrency: usize,
    /// Sleep after an empty poll or a failed claim.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WorkerConfig {
    /// Set loops per type. Zero selects [`DEFAULT_CONCURRENCY`].
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = if concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            concurrency
        };
        self
    }

    /// Set the idle poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Running totals across every loop of a pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    claimed: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    unroutable: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    /// Jobs taken off an index.
    pub claimed: u64,
    /// Handler invocations that succeeded.
    pub succeeded: u64,
    /// Failed attempts put back on the queue.
    pub retried: u64,
    /// Jobs that ended in `failed`: attempts exhausted or requeue refused.
    pub failed: u64,
    /// Claimed jobs whose type had no handler.
    pub unroutable: u64,
    /// Store or decode errors seen by the loops.
    pub errors: u64,
}

impl WorkerStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counters.
    #[must_use]
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            claimed: self.claimed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Owns the handler registry and the execution loops.
///
/// # Example
///
/// ```rust,no_run
/// use taskflow::prelude::*;
/// use taskflow::store::MemoryStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let queue = Queue::new(MemoryStore::new());
/// let pool = WorkerPool::new(queue.clone(), WorkerConfig::default());
/// pool.register_handler("noop", handler_fn(|_ctx, _job| async { Ok::<_, HandlerError>(()) }));
///
/// let token = CancellationToken::new();
/// pool.start(token.clone());
///
/// queue.enqueue(&Job::new("noop", &serde_json::json!({}))?).await?;
///
/// token.cancel();
/// pool.wait().await?;
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool {
    queue: Queue,
    registry: HandlerRegistry,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Create a pool over `queue`. A zero concurrency selects the default.
    #[must_use]
    pub fn new(queue: Queue, config: WorkerConfig) -> Self {
        let concurrency = config.concurrency;
        Self {
            queue,
            registry: HandlerRegistry::new(),
            config: config.with_concurrency(concurrency),
            stats: Arc::new(WorkerStats::default()),
            loops: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Register `handler` for `job_type`; the last registration wins.
    ///
    /// Only registrations made before [`start`](Self::start) get loops.
    pub fn register_handler<H>(&self, job_type: impl Into<String>, handler: H)
    where
        H: Handler + 'static,
    {
        let job_type = job_type.into();
        if self.started.load(Ordering::Acquire) {
            warn!(
                job_type = %job_type,
                "handler registered after start; no loops will run for it"
            );
        }
        self.registry.register(job_type, handler);
    }

    /// The pool's registry, e.g. for registering pre-composed handlers.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The pool's queue.
    #[must_use]
    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Submit a job through the pool's queue.
    ///
    /// # Errors
    ///
    /// Same as [`Queue::enqueue`].
    pub async fn enqueue(&self, job: &Job) -> JobResult<()> {
        self.queue.enqueue(job).await
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn the execution loops and return immediately.
    ///
    /// The registry is snapshotted here. Calling `start` twice is a no-op.
    pub fn start(&self, token: CancellationToken) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("worker pool already started");
            return;
        }

        let handlers = self.registry.snapshot();
        let mut job_types: Vec<&String> = handlers.keys().collect();
        job_types.sort_unstable();

        let mut loops = self.loops.lock();
        for job_type in job_types {
            for worker_id in 0..self.config.concurrency {
                let worker = Worker {
                    worker_id,
                    job_type: job_type.clone(),
                    queue: self.queue.clone(),
                    handlers: Arc::clone(&handlers),
                    stats: Arc::clone(&self.stats),
                    poll_interval: self.config.poll_interval,
                    token: token.clone(),
                };
                loops.push(tokio::spawn(worker.run()));
            }
        }

        info!(
            job_types = ?self.registry.job_types(),
            concurrency = self.config.concurrency,
            loops = loops.len(),
            "worker pool started"
        );
    }

    /// Wait for every loop to exit, then close the store.
    ///
    /// Loops exit only after the start token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if closing the store fails.
    pub async fn wait(&self) -> JobResult<()> {
        let loops = std::mem::take(&mut *self.loops.lock());
        for handle in loops {
            if let Err(err) = handle.await {
                error!(error = %err, "worker loop aborted");
            }
        }
        self.queue.close().await?;
        info!(stats = ?self.stats.snapshot(), "worker pool stopped");
        Ok(())
    }
}

/// One execution loop bound to a single job type.
struct Worker {
    worker_id: usize,
    job_type: String,
    queue: Queue,
    handlers: HandlerSnapshot,
    stats: Arc<WorkerStats>,
    poll_interval: Duration,
    token: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(job_type = %self.job_type, worker_id = self.worker_id, "worker loop started");

        while !self.token.is_cancelled() {
            match self.process_next().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    WorkerStats::bump(&self.stats.errors);
                    error!(
                        job_type = %self.job_type,
                        worker_id = self.worker_id,
                        error = %err,
                        "worker loop error"
                    );
                }
            }

            tokio::select! {
                () = self.token.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!(job_type = %self.job_type, worker_id = self.worker_id, "worker loop stopped");
    }

    /// Claim and execute one job. `Ok(false)` means the index was empty.
    async fn process_next(&self) -> JobResult<bool> {
        let Some(mut job) = self.queue.dequeue(&self.job_type).await? else {
            return Ok(false);
        };
        WorkerStats::bump(&self.stats.claimed);

        let Some(handler) = self.handlers.get(&job.job_type).cloned() else {
            self.reject_unroutable(&mut job).await?;
            return Ok(true);
        };

        self.execute(handler, &mut job).await;
        Ok(true)
    }

    async fn execute(&self, handler: BoxedHandler, job: &mut Job) {
        job.mark_started();
        let ctx = JobExecutionContext::new(job);
        ctx.log_start();
        self.persist(job).await;

        match self.invoke(handler, job).await {
            Ok(()) => {
                job.mark_completed();
                self.persist(job).await;
                WorkerStats::bump(&self.stats.succeeded);
                ctx.log_completion();
            }
            Err(err) => {
                job.mark_failed(&err);
                self.persist(job).await;
                if !job.should_retry() {
                    WorkerStats::bump(&self.stats.failed);
                    ctx.log_failure(err.message());
                } else if let Err(requeue_err) = self.queue.requeue(job).await {
                    // No longer indexed, so the record must not claim a retry.
                    let message = format!("{}; requeue failed: {requeue_err}", err.message());
                    job.mark_failed(&message);
                    self.persist(job).await;
                    WorkerStats::bump(&self.stats.errors);
                    WorkerStats::bump(&self.stats.failed);
                    ctx.log_failure(&message);
                } else {
                    WorkerStats::bump(&self.stats.retried);
                    ctx.log_retry(err.message());
                }
            }
        }
    }

    /// Run the handler on its own task so a panic fails the attempt instead
    /// of killing the loop.
    async fn invoke(&self, handler: BoxedHandler, job: &Job) -> Result<(), HandlerError> {
        let token = self.token.clone();
        let job = job.clone();
        let task = tokio::spawn(async move { handler.handle(&token, &job).await });
        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(HandlerError::new("handler panicked")),
            Err(err) => Err(HandlerError::new(format!("handler task failed: {err}"))),
        }
    }

    /// Write the record, logging instead of failing. The in-memory job stays
    /// authoritative for the rest of the attempt.
    async fn persist(&self, job: &Job) {
        if let Err(err) = self.queue.update(job).await {
            WorkerStats::bump(&self.stats.errors);
            warn!(
                job_id = %job.id,
                status = %job.status,
                error = %err,
                "failed to persist job state"
            );
        }
    }

    async fn reject_unroutable(&self, job: &mut Job) -> JobResult<()> {
        JobQueueObserver::log_unroutable(job.id, &job.job_type);
        job.mark_failed(JobError::UnregisteredType(job.job_type.clone()));
        WorkerStats::bump(&self.stats.unroutable);
        self.queue.update(job).await
    }
}
