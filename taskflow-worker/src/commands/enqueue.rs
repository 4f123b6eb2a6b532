//! `taskflow enqueue`: submit a job from the command line

use anyhow::{Context, Result};
use console::style;
use taskflow::prelude::*;
use taskflow_worker::config::TaskflowConfig;

use super::{connect, SUCCESS};

/// Build a job from flags and add it to the queue.
#[derive(Debug)]
pub struct EnqueueCommand {
    /// Job type, e.g. `email`.
    pub job_type: String,
    /// Payload as a JSON document.
    pub payload: String,
    /// Priority; higher runs first.
    pub priority: i32,
    /// Attempt budget.
    pub max_attempts: u32,
}

impl EnqueueCommand {
    /// Execute the enqueue command
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The payload is not valid JSON
    /// - The job type is blank
    /// - Redis is unreachable
    pub async fn execute(&self, config: &TaskflowConfig) -> Result<()> {
        let job = self.build_job()?;
        let queue = connect(config).await?;
        queue.enqueue(&job).await.context("Failed to enqueue job")?;
        queue.close().await?;

        println!(
            "{} Enqueued {} job {} (priority {}, max attempts {})",
            SUCCESS,
            style(&job.job_type).cyan(),
            style(job.id).bold(),
            job.priority,
            job.max_attempts
        );
        Ok(())
    }

    fn build_job(&self) -> Result<Job> {
        let payload: serde_json::Value =
            serde_json::from_str(&self.payload).context("Payload is not valid JSON")?;
        Ok(Job::new(self.job_type.as_str(), &payload)?
            .with_priority(self.priority)
            .with_max_attempts(self.max_attempts))
    }
}
