//! # taskflow-worker
//!
//! The `taskflow` worker process: layered configuration and the built-in
//! `email`, `webhook`, `notification` and `cleanup` handlers.
//!
//! ```rust,no_run
//! use taskflow::prelude::*;
//! use taskflow::store::RedisStore;
//! use taskflow_worker::{config::TaskflowConfig, handlers};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TaskflowConfig::load(None)?;
//!     let store = RedisStore::connect(&config.redis.addr).await?;
//!     let queue = Queue::with_config(std::sync::Arc::new(store), config.redis.queue_config());
//!
//!     let pool = WorkerPool::new(queue, config.worker.worker_config());
//!     handlers::register_all(&pool, &config)?;
//!
//!     let token = CancellationToken::new();
//!     pool.start(token.clone());
//!     tokio::signal::ctrl_c().await?;
//!     token.cancel();
//!     pool.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod handlers;
