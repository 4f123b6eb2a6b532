use super::{JobStore, StoreResult};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Redis-backed [`JobStore`] over a deadpool connection pool.
///
/// `ZPOPMAX` is atomic on the server, so any number of worker loops, in any
/// number of processes, can share one Redis without claiming a job twice.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisStore")
            .field("pool_size", &status.size)
            .field("pool_available", &status.available)
            .finish()
    }
}

impl RedisStore {
    /// Build a pool for `addr` and verify it with a `PING`.
    ///
    /// `addr` may be a full URL (`redis://host:6379/0`) or a bare
    /// `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the server does not
    /// answer.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use taskflow::store::RedisStore;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = RedisStore::connect("localhost:6379").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(addr: &str) -> StoreResult<Self> {
        let url = redis_url(addr);
        let pool = Config::from_url(url.as_str()).create_pool(Some(Runtime::Tokio1))?;

        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        info!(url = %url, "connected to redis");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Prefix a bare `host:port` with the `redis://` scheme.
fn redis_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        // Redis rejects EX 0.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        let _: usize = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zpopmax(&self, key: &str) -> StoreResult<Option<(String, f64)>> {
        let mut conn = self.pool.get().await?;
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMAX")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        Ok(popped.into_iter().next())
    }

    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        let mut conn = self.pool.get().await?;
        let count: usize = conn.zcard(key).await?;
        Ok(count)
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.pool.is_closed() {
            self.pool.close();
            debug!("redis pool closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url_adds_scheme() {
        assert_eq!(redis_url("localhost:6379"), "redis://localhost:6379");
        assert_eq!(redis_url("redis://cache:6380/2"), "redis://cache:6380/2");
        assert_eq!(redis_url("rediss://secure:6380"), "rediss://secure:6380");
    }
}
