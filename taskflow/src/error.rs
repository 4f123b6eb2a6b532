//! Job-related error types.

use std::fmt;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors that can occur while creating, storing or dispatching jobs.
#[derive(Debug, Error)]
pub enum JobError {
    /// Payload or job record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A handler returned an error.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// A job was claimed for a type with no registered handler.
    #[error("no handler registered for job type '{0}'")]
    UnregisteredType(String),

    /// The job was rejected before it reached the store.
    #[error("invalid job: {0}")]
    InvalidJob(String),
}

/// Errors raised by a [`JobStore`](crate::store::JobStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command failed.
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Could not check a connection out of the pool.
    #[cfg(feature = "redis")]
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// The pool could not be built from the configured address.
    #[cfg(feature = "redis")]
    #[error("connection pool setup failed: {0}")]
    PoolSetup(#[from] deadpool_redis::CreatePoolError),

    /// The index referenced a job whose record is gone (expired or deleted).
    #[error("job record missing: {0}")]
    RecordMissing(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Error returned by a [`Handler`](crate::handler::Handler).
///
/// Carries only the message; the message is what ends up in the job
/// record's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error from any displayable message.
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid payload: {err}"))
    }
}

impl From<JobError> for HandlerError {
    fn from(err: JobError) -> Self {
        Self::new(err)
    }
}
