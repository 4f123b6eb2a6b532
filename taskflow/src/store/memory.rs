use super::{JobStore, StoreResult};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// In-process [`JobStore`].
///
/// A single mutex covers records and indexes, which makes `zpopmax` atomic
/// across worker loops in the same process. Expiry follows `tokio::time`, so
/// paused-clock tests can expire records; expired records are dropped on
/// read and swept on every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, Record>,
    sets: HashMap<String, HashMap<String, f64>>,
    closed: bool,
}

#[derive(Debug)]
struct Record {
    value: Vec<u8>,
    expires_at: Instant,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a record immediately, as if its expiry had passed.
    pub fn expire(&self, key: &str) -> bool {
        self.inner.lock().records.remove(key).is_some()
    }

    /// Whether [`close`](JobStore::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Inner {
    const fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Highest score first; equal scores fall back to the larger member, as
/// Redis does for `ZPOPMAX`.
fn rank(a: (&String, &f64), b: (&String, &f64)) -> Ordering {
    a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0))
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let now = Instant::now();
        inner.records.retain(|_, record| record.expires_at > now);
        inner.records.insert(
            key.to_string(),
            Record {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        if let Some(record) = inner.records.get(key) {
            if record.expires_at > Instant::now() {
                return Ok(Some(record.value.clone()));
            }
            inner.records.remove(key);
        }
        Ok(None)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zpopmax(&self, key: &str) -> StoreResult<Option<(String, f64)>> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(None);
        };
        let top = set
            .iter()
            .max_by(|a, b| rank(*a, *b))
            .map(|(member, _)| member.clone());
        Ok(top.and_then(|member| set.remove_entry(&member)))
    }

    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner.sets.get(key).map_or(0, HashMap::len))
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}
