//! Storage backends for job records and per-type priority indexes.
//!
//! The queue needs four primitives from its store: a key/value write with
//! expiry, a key/value read, a sorted-set insert and an atomic
//! pop-max-score. [`RedisStore`] maps them onto `SET EX`, `GET`, `ZADD` and
//! `ZPOPMAX`; [`MemoryStore`] keeps everything in process for tests and
//! single-node development.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Key/value plus sorted-set storage shared by every worker loop.
///
/// Implementations must be safe for concurrent use, and
/// [`zpopmax`](Self::zpopmax) must be atomic: a member is returned to at most
/// one caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value and arming a
    /// fresh expiry.
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// Read the value under `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or rescore `member` in the sorted set at `key`.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Remove and return the highest-scored member of the sorted set at `key`.
    async fn zpopmax(&self, key: &str) -> StoreResult<Option<(String, f64)>>;

    /// Number of members in the sorted set at `key`.
    async fn zcard(&self, key: &str) -> StoreResult<usize>;

    /// Release connections. Safe to call more than once.
    async fn close(&self) -> StoreResult<()>;
}
