//! `taskflow inspect` and `taskflow pending`: read-only queue queries

use anyhow::{bail, Result};
use console::style;
use taskflow::prelude::*;
use taskflow_worker::config::TaskflowConfig;

use super::{connect, INFO};

/// Print a job record as JSON.
#[derive(Debug)]
pub struct InspectCommand {
    /// Job ID.
    pub id: String,
}

impl InspectCommand {
    /// Execute the inspect command
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is malformed, Redis is unreachable or the
    /// record does not exist (never enqueued, or expired).
    pub async fn execute(&self, config: &TaskflowConfig) -> Result<()> {
        let id = JobId::parse(&self.id)?;
        let queue = connect(config).await?;
        let job = queue.get(id).await?;
        queue.close().await?;

        let Some(job) = job else {
            bail!("No record for job {id}; it was never enqueued or has expired");
        };
        println!("{}", serde_json::to_string_pretty(&job)?);
        Ok(())
    }
}

/// Print how many jobs of a type are waiting.
#[derive(Debug)]
pub struct PendingCommand {
    /// Job type.
    pub job_type: String,
}

impl PendingCommand {
    /// Execute the pending command
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable.
    pub async fn execute(&self, config: &TaskflowConfig) -> Result<()> {
        let queue = connect(config).await?;
        let pending = queue.pending_count(&self.job_type).await?;
        queue.close().await?;

        println!(
            "{} {} pending {} job(s)",
            INFO,
            style(pending).cyan(),
            style(&self.job_type).bold()
        );
        Ok(())
    }
}
