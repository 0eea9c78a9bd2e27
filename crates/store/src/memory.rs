//! In-process [`KvStore`] backend.
//!
//! All primitives run under one mutex, which makes each of them atomic with
//! respect to every other caller sharing this instance. Expiry is enforced
//! lazily: an expired entry is dropped the next time its key is touched.
//! This is the backend for single-node deployments and the test suite; it
//! offers no durability across restarts.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{KvStore, StoreError};

enum Value {
    Str(String),
    Set(BTreeSet<String>),
    List(Vec<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn string(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: Value::Str(value.to_string()),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Thread-safe in-memory key-value store with TTL support.
///
/// Designed to be wrapped in `Arc` and shared by every manager in the
/// process.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (non-expired) keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop `key` if its entry has expired.
fn evict_expired(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
        entries.remove(key);
    }
}

/// Current string value at `key`, if any.
fn read_string<'a>(
    entries: &'a HashMap<String, Entry>,
    key: &str,
) -> Result<Option<&'a str>, StoreError> {
    match entries.get(key) {
        None => Ok(None),
        Some(Entry {
            value: Value::Str(s),
            ..
        }) => Ok(Some(s.as_str())),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        Ok(read_string(&entries, key)?.map(str::to_string))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry::string(value, ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::string(value, Some(ttl)));
        Ok(true)
    }

    async fn set_if_present(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        if read_string(&entries, key)?.is_none() {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::string(value, ttl));
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        if read_string(&entries, key)? != Some(expected) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::string(value, ttl));
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        if read_string(&entries, key)? != Some(expected) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        Ok(entries.remove(key).is_some())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        let (removed, now_empty) = match &mut entry.value {
            Value::Set(set) => (set.remove(member), set.is_empty()),
            _ => return Err(StoreError::WrongType(key.to_string())),
        };
        // Empty sets disappear, matching Redis.
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(Vec::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(list) => {
                list.push(value.to_string());
                Ok(list.len() as u64)
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.clone()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn list_last(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.last().cloned()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_only_writes_once() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.set_if_absent("k", "first", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "second", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_values_read_as_absent() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(100)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_succeeds_after_expiry() {
        let store = MemoryStore::new();
        let ttl = Duration::from_millis(100);

        assert!(store.set_if_absent("k", "a", ttl).await.unwrap());
        tokio::time::advance(Duration::from_millis(101)).await;
        assert!(store.set_if_absent("k", "b", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn set_if_present_never_creates() {
        let store = MemoryStore::new();
        assert!(!store.set_if_present("k", "v", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "old", None).await.unwrap();
        assert!(store.set_if_present("k", "new", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn compare_and_set_requires_exact_match() {
        let store = MemoryStore::new();
        store.set("k", "v1", None).await.unwrap();

        assert!(!store.compare_and_set("k", "other", "v2", None).await.unwrap());
        assert!(store.compare_and_set("k", "v1", "v2", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn compare_and_delete_requires_exact_match() {
        let store = MemoryStore::new();
        store.set("k", "v1", None).await.unwrap();

        assert!(!store.compare_and_delete("k", "v0").await.unwrap());
        assert!(store.compare_and_delete("k", "v1").await.unwrap());
        assert!(!store.compare_and_delete("k", "v1").await.unwrap());
    }

    #[tokio::test]
    async fn sets_drop_when_emptied() {
        let store = MemoryStore::new();
        assert!(store.set_add("s", "a").await.unwrap());
        assert!(!store.set_add("s", "a").await.unwrap());
        assert!(store.set_add("s", "b").await.unwrap());

        let mut members = store.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        assert!(store.set_remove("s", "a").await.unwrap());
        assert!(store.set_remove("s", "b").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn lists_keep_insertion_order() {
        let store = MemoryStore::new();
        assert_eq!(store.list_push("l", "x").await.unwrap(), 1);
        assert_eq!(store.list_push("l", "y").await.unwrap(), 2);
        assert_eq!(store.list_push("l", "z").await.unwrap(), 3);
        assert_eq!(store.list_range("l").await.unwrap(), vec!["x", "y", "z"]);
        assert_eq!(store.list_last("l").await.unwrap().as_deref(), Some("z"));
        assert_eq!(store.list_last("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn type_mismatch_is_reported() {
        let store = MemoryStore::new();
        store.set_add("s", "a").await.unwrap();

        assert!(matches!(store.get("s").await, Err(StoreError::WrongType(_))));
        assert!(matches!(
            store.list_push("s", "x").await,
            Err(StoreError::WrongType(_))
        ));
    }
}
