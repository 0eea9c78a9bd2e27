//! Key-value store client contract and adapters.
//!
//! The coordination managers never talk to a concrete backend; they consume
//! the [`KvStore`] trait, whose every mutating primitive is a single atomic
//! operation on the backing store. Correctness across service instances
//! depends on that, not on any in-process lock.
//!
//! - [`MemoryStore`]: in-process backend for single-node use and tests.
//! - [`RedisStore`]: Redis backend (`SET NX PX`, Lua compare-and-swap).
//! - [`TimeoutStore`]: decorator bounding every call by a deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub mod error;
pub mod keys;
pub mod memory;
pub mod models;
pub mod redis_store;
pub mod timeout;

pub use error::StoreError;
pub use keys::Keyspace;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use timeout::TimeoutStore;

/// Shared handle to any store backend.
pub type SharedStore = Arc<dyn KvStore>;

/// Atomic primitives the coordination core requires from its store.
///
/// String values are opaque to the store. A `ttl` of `None` means the value
/// never expires. Expired values must be indistinguishable from absent ones.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally write a string value.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Write only if the key is absent. Returns `true` if written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Overwrite only if the key is present. Returns `true` if written.
    async fn set_if_present(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Overwrite only if the current value equals `expected`.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Delete only if the current value equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Delete unconditionally. Returns `true` if a value was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Add a member to a set. Returns `true` if it was not already present.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove a member from a set. Returns `true` if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// All members of a set, in no particular order.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Append to a list. Returns the list length after the append.
    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// All list entries in insertion order.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// The most recently appended list entry.
    async fn list_last(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.list_range(key).await?.pop())
    }

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Build a store from a connection URL.
///
/// | URL                 | Backend         |
/// |---------------------|-----------------|
/// | `memory://`         | [`MemoryStore`] |
/// | `redis://...`       | [`RedisStore`]  |
/// | `rediss://...`      | [`RedisStore`]  |
pub async fn create_store(url: &str) -> Result<SharedStore, StoreError> {
    let url = url.trim();
    if url.starts_with("memory://") {
        tracing::info!("Using in-process memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        let store = RedisStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()))
}
