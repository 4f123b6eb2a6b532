//! Structured logging for job execution and queue traffic.

use crate::job::{Job, JobId, JobStatus, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    #[default]
    Auto,
    /// Human-readable multi-line output.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the built-in filter.
///
/// # Example
///
/// ```rust,no_run
/// use taskflow::observability::{self, LogFormat};
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init(LogFormat::Auto)?;
/// tracing::info!("worker starting");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("debug,taskflow=trace")
        } else {
            EnvFilter::new("info")
        }
    });

    let json = match format {
        LogFormat::Auto => !cfg!(debug_assertions),
        LogFormat::Pretty => false,
        LogFormat::Json => true,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).try_init()?;
    }

    Ok(())
}

/// Per-attempt logging context, created when a worker starts a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobExecutionContext {
    /// Job ID.
    pub job_id: JobId,
    /// Job type.
    pub job_type: String,
    /// When this attempt started.
    pub started_at: DateTime<Utc>,
    /// Job priority.
    pub priority: Priority,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// Attempt limit.
    pub max_attempts: u32,
}

impl JobExecutionContext {
    /// Capture the context of a job that has just been marked started.
    #[must_use]
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            started_at: job.started_at.unwrap_or_else(Utc::now),
            priority: job.priority,
            attempt: job.attempts,
            max_attempts: job.max_attempts,
        }
    }

    /// Milliseconds since the attempt started.
    #[must_use]
    pub fn execution_duration_ms(&self) -> u64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0)
            .try_into()
            .unwrap_or(0)
    }

    /// Log job start.
    pub fn log_start(&self) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            priority = self.priority.value(),
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            "job execution started"
        );
    }

    /// Log job completion.
    pub fn log_completion(&self) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            duration_ms = self.execution_duration_ms(),
            attempt = self.attempt,
            "job completed"
        );
    }

    /// Log a failure that will be retried.
    pub fn log_retry(&self, error: &str) {
        warn!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            duration_ms = self.execution_duration_ms(),
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            error = error,
            "job failed, requeued for retry"
        );
    }

    /// Log a failure with no attempts left.
    pub fn log_failure(&self, error: &str) {
        error!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            duration_ms = self.execution_duration_ms(),
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            error = error,
            "job failed permanently"
        );
    }
}

/// Queue-level events.
pub struct JobQueueObserver;

impl JobQueueObserver {
    /// Log job enqueued.
    pub fn log_enqueued(job: &Job) {
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = job.priority.value(),
            status = %job.status,
            "job enqueued"
        );
    }

    /// Log job claimed from the index.
    pub fn log_dequeued(job: &Job) {
        let queue_time_ms: u64 = Utc::now()
            .signed_duration_since(job.created_at)
            .num_milliseconds()
            .max(0)
            .try_into()
            .unwrap_or(0);
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            queue_time_ms = queue_time_ms,
            "job dequeued"
        );
    }

    /// Log a record write.
    pub fn log_updated(job_id: JobId, status: JobStatus) {
        debug!(job_id = %job_id, status = %status, "job record updated");
    }

    /// Log a claim whose type has no handler.
    pub fn log_unroutable(job_id: JobId, job_type: &str) {
        error!(
            job_id = %job_id,
            job_type = job_type,
            "no handler registered for claimed job, marking failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_context_from_started_job() {
        let mut job = Job::new("email", &json!({})).unwrap().with_max_attempts(4);
        job.mark_started();
        let ctx = JobExecutionContext::new(&job);
        assert_eq!(ctx.job_id, job.id);
        assert_eq!(ctx.attempt, 1);
        assert_eq!(ctx.max_attempts, 4);
        assert_eq!(Some(ctx.started_at), job.started_at);
    }

    #[test]
    fn test_execution_duration_never_negative() {
        let mut job = Job::new("email", &json!({})).unwrap();
        job.started_at = Some(Utc::now() + chrono::Duration::hours(1));
        assert_eq!(JobExecutionContext::new(&job).execution_duration_ms(), 0);
    }

    #[test]
    fn test_log_format_parses_lowercase() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Auto);
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
    }
}
