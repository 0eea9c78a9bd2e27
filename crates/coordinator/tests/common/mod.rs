//! Shared helpers for coordinator integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use concord_coordinator::{Coordinator, CoordinatorConfig};
use concord_events::SharedBroker;
use concord_store::{KvStore, MemoryStore, SharedStore, StoreError};
use futures::future::{BoxFuture, FutureExt};

/// Default configuration with the sampler off.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        metrics_sample_interval: None,
        ..CoordinatorConfig::default()
    }
}

/// A coordinator over a fresh in-memory store, store-only mode.
pub fn memory_coordinator() -> (Coordinator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(store.clone(), None, &test_config());
    (coordinator, store)
}

/// A coordinator over a fresh in-memory store with a broker.
pub fn coordinator_with_broker(broker: SharedBroker) -> (Coordinator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(store.clone(), Some(broker), &test_config());
    (coordinator, store)
}

// ---------------------------------------------------------------------------
// Misbehaving stores
// ---------------------------------------------------------------------------

/// Delegates to an in-memory store until `fail()` is called, after which
/// every call reports the store as unavailable.
pub struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            down: AtomicBool::new(false),
        }
    }

    pub fn fail(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.down.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn set_if_present(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.set_if_present(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.compare_and_set(key, expected, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        self.inner.set_members(key).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.list_push(key, value).await
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        self.inner.list_range(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()?;
        self.inner.ping().await
    }
}

/// A store whose every call hangs forever.
pub struct StalledStore;

impl StalledStore {
    pub fn shared() -> SharedStore {
        Arc::new(Self)
    }
}

async fn hang<T>() -> Result<T, StoreError> {
    std::future::pending::<()>().await;
    Err(StoreError::Unavailable("unreachable".into()))
}

#[async_trait]
impl KvStore for StalledStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        hang().await
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
        hang().await
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        hang().await
    }

    async fn set_if_present(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        hang().await
    }

    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: &str,
        _value: &str,
        _ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        hang().await
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &str) -> Result<bool, StoreError> {
        hang().await
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        hang().await
    }

    async fn set_add(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        hang().await
    }

    async fn set_remove(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        hang().await
    }

    async fn set_members(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        hang().await
    }

    async fn list_push(&self, _key: &str, _value: &str) -> Result<u64, StoreError> {
        hang().await
    }

    async fn list_range(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        hang().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        hang().await
    }
}

// ---------------------------------------------------------------------------
// Interleaving store
// ---------------------------------------------------------------------------

/// Point in a store call where a [`HookStore`] runs an injected action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// After a `get` of this key found nothing, before returning.
    GetMiss(String),
    /// Before a `set_remove` from this set key.
    SetRemove(String),
}

/// Delegates to a shared in-memory store, running one-shot actions at
/// chosen points so tests can interleave another caller mid-operation.
/// Compare-and-set can also be forced to lose.
pub struct HookStore {
    inner: Arc<MemoryStore>,
    hooks: Mutex<Vec<(Trigger, BoxFuture<'static, ()>)>>,
    cas_loses: AtomicBool,
}

impl HookStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            hooks: Mutex::new(Vec::new()),
            cas_loses: AtomicBool::new(false),
        }
    }

    /// Run `action` once, the first time `trigger` is reached.
    pub fn on(&self, trigger: Trigger, action: impl Future<Output = ()> + Send + 'static) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.push((trigger, action.boxed()));
        }
    }

    /// Make every compare-and-set report a lost race.
    pub fn lose_cas(&self) {
        self.cas_loses.store(true, Ordering::SeqCst);
    }

    async fn fire(&self, trigger: Trigger) {
        let action = self.hooks.lock().ok().and_then(|mut hooks| {
            let at = hooks.iter().position(|(t, _)| *t == trigger)?;
            Some(hooks.remove(at).1)
        });
        if let Some(action) = action {
            action.await;
        }
    }
}

#[async_trait]
impl KvStore for HookStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.inner.get(key).await?;
        if value.is_none() {
            self.fire(Trigger::GetMiss(key.to_string())).await;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn set_if_present(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.inner.set_if_present(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        if self.cas_loses.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.compare_and_set(key, expected, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.fire(Trigger::SetRemove(key.to_string())).await;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.set_members(key).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.inner.list_push(key, value).await
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_range(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
