//! Deadline decorator for any [`KvStore`].
//!
//! A timed-out call surfaces as [`StoreError::Timeout`]. Its effect on the
//! store is unknown, so callers must re-read rather than assume failure.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::{KvStore, SharedStore, StoreError};

/// Wraps a store so that every call completes within `limit`.
#[derive(Clone)]
pub struct TimeoutStore {
    inner: SharedStore,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: SharedStore, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.limit)),
        }
    }
}

#[async_trait]
impl KvStore for TimeoutStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.bounded(self.inner.set(key, value, ttl)).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.bounded(self.inner.set_if_absent(key, value, ttl)).await
    }

    async fn set_if_present(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.bounded(self.inner.set_if_present(key, value, ttl)).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.bounded(self.inner.compare_and_set(key, expected, value, ttl))
            .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.bounded(self.inner.compare_and_delete(key, expected)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.bounded(self.inner.delete(key)).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.bounded(self.inner.set_add(key, member)).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.bounded(self.inner.set_remove(key, member)).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.bounded(self.inner.set_members(key)).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.bounded(self.inner.list_push(key, value)).await
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.bounded(self.inner.list_range(key)).await
    }

    async fn list_last(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded(self.inner.list_last(key)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.inner.ping()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::MemoryStore;

    fn bounded_memory(limit: Duration) -> TimeoutStore {
        TimeoutStore::new(Arc::new(MemoryStore::new()), limit)
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let store = bounded_memory(Duration::from_secs(1));
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.limit(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let store = bounded_memory(Duration::from_millis(200));
        let result: Result<(), StoreError> = store
            .bounded(std::future::pending::<Result<(), StoreError>>())
            .await;
        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == Duration::from_millis(200)));
        assert!(result.unwrap_err().is_transient());
    }
}
