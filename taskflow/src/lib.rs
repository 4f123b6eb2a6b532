//! # taskflow
//!
//! Asynchronous job processing backed by Redis.
//!
//! Producers build a [`Job`](job::Job) and submit it to a
//! [`Queue`](queue::Queue). A [`WorkerPool`](worker::WorkerPool) runs a fixed
//! number of loops per registered job type; each loop claims the
//! highest-priority pending job, dispatches it to its
//! [`Handler`](handler::Handler) and retries failures until the job's
//! attempt budget is spent.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use taskflow::prelude::*;
//! use taskflow::store::RedisStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = Queue::new(RedisStore::connect("localhost:6379").await?);
//!
//!     let pool = WorkerPool::new(queue.clone(), WorkerConfig::default());
//!     pool.register_handler("echo", handler_fn(|_ctx, job: Job| async move {
//!         tracing::info!(payload = %job.payload, "echo");
//!         Ok::<_, HandlerError>(())
//!     }));
//!
//!     let token = CancellationToken::new();
//!     pool.start(token.clone());
//!
//!     let job = Job::new("echo", &serde_json::json!({"hello": "world"}))?
//!         .with_priority(Priority::HIGH);
//!     queue.enqueue(&job).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     token.cancel();
//!     pool.wait().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `redis` - [`RedisStore`](store::RedisStore) backend (default)

pub mod cancellation;
pub mod error;
pub mod handler;
pub mod job;
pub mod observability;
pub mod queue;
pub mod registry;
pub mod store;
pub mod testing;
pub mod worker;

pub mod prelude {
    //! Convenience re-exports for producers and workers.
    //!
    //! ```rust
    //! use taskflow::prelude::*;
    //! ```

    pub use crate::cancellation::CancellationToken;
    pub use crate::error::{HandlerError, JobError, JobResult, StoreError};
    pub use crate::handler::{chain, handler_fn, logging, timeout, BoxedHandler, Handler, Middleware};
    pub use crate::job::{Job, JobId, JobStatus, Priority};
    pub use crate::queue::{Queue, QueueConfig};
    pub use crate::registry::HandlerRegistry;
    pub use crate::store::{JobStore, MemoryStore};
    pub use crate::worker::{WorkerConfig, WorkerPool, WorkerStatsSnapshot};
}
