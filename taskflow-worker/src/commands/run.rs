//! `taskflow run`: the long-running worker process

use anyhow::Result;
use console::style;
use taskflow::observability;
use taskflow::prelude::*;
use taskflow_worker::{config::TaskflowConfig, handlers};
use tracing::info;

use super::{connect, INFO, SUCCESS};

/// Start the worker pool and run until SIGINT or SIGTERM.
#[derive(Debug)]
pub struct RunCommand {
    /// Overrides `worker.concurrency`.
    pub concurrency: Option<usize>,
}

impl RunCommand {
    /// Execute the run command
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logging cannot be initialized
    /// - Redis is unreachable
    /// - A handler cannot be set up
    /// - Installing the signal handlers fails
    pub async fn execute(&self, mut config: TaskflowConfig) -> Result<()> {
        if let Some(concurrency) = self.concurrency {
            config.worker.concurrency = concurrency;
        }
        observability::init(config.log.format)?;

        let queue = connect(&config).await?;
        let worker_config = config.worker.worker_config();
        let pool = WorkerPool::new(queue, worker_config.clone());
        handlers::register_all(&pool, &config)?;

        let job_types = pool.registry().job_types();
        println!(
            "{} Worker started: {} loops for each of {}",
            INFO,
            style(worker_config.concurrency).cyan(),
            style(job_types.join(", ")).cyan()
        );
        info!(
            redis = %config.redis.addr,
            prefix = %config.redis.prefix,
            concurrency = worker_config.concurrency,
            job_types = ?job_types,
            "Worker starting"
        );

        let token = CancellationToken::new();
        pool.start(token.clone());

        shutdown_signal().await?;
        info!("Shutdown signal received, finishing running jobs");
        token.cancel();
        pool.wait().await?;

        let stats = pool.stats();
        info!(
            claimed = stats.claimed,
            succeeded = stats.succeeded,
            retried = stats.retried,
            failed = stats.failed,
            unroutable = stats.unroutable,
            errors = stats.errors,
            "Worker stopped"
        );
        println!("{} Worker stopped", SUCCESS);
        Ok(())
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
