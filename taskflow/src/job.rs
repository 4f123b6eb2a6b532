//! Job record and lifecycle transitions.
//!
//! A [`Job`] is created by a producer, persisted by the
//! [`Queue`](crate::queue::Queue) and mutated only by the worker pool as it
//! moves through the states described by [`JobStatus`]:
//!
//! ```text
//! pending  --claimed-->            running
//! running  --handler ok-->         completed
//! running  --error, may retry-->   retrying --requeue--> pending
//! running  --error, exhausted-->   failed
//! ```

use crate::error::{JobError, JobResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default number of execution attempts for a new job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse a job ID from its hyphenated string form.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidJob`] if the input is not a UUID.
    pub fn parse(s: &str) -> JobResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| JobError::InvalidJob(format!("invalid job id '{s}': {e}")))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<JobId> for Uuid {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Job priority. Higher values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Background work.
    pub const LOW: Self = Self(1);
    /// Default priority for new jobs.
    pub const NORMAL: Self = Self(5);
    /// Served ahead of normal work.
    pub const HIGH: Self = Self(10);

    /// The raw priority value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued and waiting to be claimed.
    #[default]
    Pending,
    /// Claimed by a worker and executing.
    Running,
    /// Handler succeeded.
    Completed,
    /// Handler failed and retries are exhausted, or the job could not be routed.
    Failed,
    /// Handler failed and the job is being put back on the queue.
    Retrying,
}

impl JobStatus {
    /// Check if the job is in a terminal state (completed or failed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get a human-readable status name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit of work and its lifecycle state.
///
/// The payload is an opaque JSON document; only the handler registered for
/// `job_type` interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, fixed at creation.
    pub id: JobId,
    /// Selects the handler.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Handler-specific payload.
    pub payload: serde_json::Value,
    /// Higher is served first.
    pub priority: Priority,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Number of executions started so far.
    pub attempts: u32,
    /// Upper bound on `attempts`.
    pub max_attempts: u32,
    /// When the job was created. Drives FIFO order within a priority.
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Message of the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidJob`] if `job_type` is empty and
    /// [`JobError::Serialization`] if the payload cannot be encoded as JSON.
    ///
    /// # Example
    ///
    /// ```rust
    /// use taskflow::job::{Job, JobStatus, Priority};
    /// use serde_json::json;
    ///
    /// let job = Job::new("email", &json!({"to": "ops@example.com"}))
    ///     .unwrap()
    ///     .with_priority(Priority::HIGH);
    ///
    /// assert_eq!(job.status, JobStatus::Pending);
    /// assert_eq!(job.max_attempts, 3);
    /// ```
    pub fn new<P>(job_type: impl Into<String>, payload: &P) -> JobResult<Self>
    where
        P: Serialize + ?Sized,
    {
        let job_type = job_type.into();
        if job_type.trim().is_empty() {
            return Err(JobError::InvalidJob("job type must not be empty".into()));
        }
        let payload = serde_json::to_value(payload)?;

        Ok(Self {
            id: JobId::new(),
            job_type,
            payload,
            priority: Priority::default(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        })
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Set the maximum number of attempts. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Start an attempt: `running`, stamps `started_at`, counts the attempt.
    ///
    /// Not idempotent. Every call counts as a new attempt, so call it exactly
    /// once per handler invocation.
    pub fn mark_started(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Terminal success.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Record a failure. Whether to retry is decided by the caller with
    /// [`should_retry`](Self::should_retry).
    pub fn mark_failed(&mut self, err: impl fmt::Display) {
        self.status = JobStatus::Failed;
        self.error = Some(err.to_string());
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Decode the payload into a handler-specific type.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Serialization`] if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> JobResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Sort key in the per-type priority index.
    ///
    /// `priority * 1e12 - created_at_nanos`: within a priority the earlier job
    /// has the larger score. One priority step outweighs 1000 seconds of age,
    /// so a much older job can still beat a slightly higher priority.
    /// Resolution at current epoch values is roughly 256ns.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self) -> f64 {
        let nanos = self.created_at.timestamp_nanos_opt().unwrap_or(i64::MAX);
        f64::from(self.priority.0).mul_add(1e12, -(nanos as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use serde_json::json;

    fn job() -> Job {
        Job::new("test", &json!({"n": 1})).unwrap()
    }

    #[test]
    fn test_job_id_creation() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_job_id_parse_round_trip() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).unwrap(), id);
        assert!(JobId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_new_job_defaults() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, Priority::NORMAL);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_new_job_rejects_empty_type() {
        let err = Job::new("  ", &json!({})).unwrap_err();
        assert!(matches!(err, JobError::InvalidJob(_)));
    }

    #[test]
    fn test_new_job_rejects_unencodable_payload() {
        let mut payload = std::collections::HashMap::new();
        payload.insert((1, 2), "tuple keys are not valid JSON object keys");
        let err = Job::new("test", &payload).unwrap_err();
        assert!(matches!(err, JobError::Serialization(_)));
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(job().with_max_attempts(0).max_attempts, 1);
        assert_eq!(job().with_max_attempts(7).max_attempts, 7);
    }

    #[test]
    fn test_mark_started_counts_every_call() {
        let mut job = job();
        job.mark_started();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert_eq!(job.attempts, 1);

        job.mark_started();
        assert_eq!(job.attempts, 2);
    }

    #[test]
    fn test_mark_completed() {
        let mut job = job();
        job.mark_started();
        job.mark_completed();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_mark_failed_keeps_message() {
        let mut job = job();
        job.mark_started();
        job.mark_failed("boom");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_should_retry_until_exhausted() {
        let mut job = job().with_max_attempts(3);
        let mut seen = Vec::new();
        for _ in 0..3 {
            job.mark_started();
            seen.push(job.should_retry());
        }
        assert_eq!(seen, vec![true, true, false]);
    }

    #[test]
    fn test_status_wire_names() {
        let encoded = serde_json::to_string(&JobStatus::Retrying).unwrap();
        assert_eq!(encoded, "\"retrying\"");
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert!(!JobStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_record_layout() {
        let job = job().with_priority(Priority::HIGH);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "test");
        assert_eq!(value["priority"], 10);
        assert_eq!(value["status"], "pending");
        assert_eq!(value["payload"]["n"], 1);
        assert!(value.get("error").is_none());
        assert!(value.get("started_at").is_none());
    }

    #[test]
    fn test_payload_as() {
        #[derive(Deserialize)]
        struct P {
            n: u32,
        }
        assert_eq!(job().payload_as::<P>().unwrap().n, 1);
        assert!(job().payload_as::<Vec<String>>().is_err());
    }

    #[test]
    fn test_score_prefers_priority_over_age() {
        let mut old_low = job().with_priority(Priority::LOW);
        old_low.created_at -= Duration::minutes(5);
        let new_high = job().with_priority(Priority::HIGH);
        assert!(new_high.score() > old_low.score());
    }

    proptest! {
        #[test]
        fn prop_earlier_job_scores_higher(priority in -100i32..100, gap_us in 1i64..3_600_000_000) {
            let first = job().with_priority(priority);
            let mut second = first.clone();
            second.created_at = first.created_at + Duration::microseconds(gap_us);
            prop_assert!(first.score() > second.score());
        }

        #[test]
        fn prop_higher_priority_scores_higher(p in -100i32..100, bump in 1i32..100, skew_s in 0i64..900) {
            let low = job().with_priority(p);
            let mut high = job().with_priority(p + bump);
            high.created_at = low.created_at + Duration::seconds(skew_s);
            prop_assert!(high.score() > low.score());
        }
    }
}
