//! Durable, per-resource reconciliation event log.
//!
//! [`EventLog::publish`] writes the event record and appends its id to the
//! resource's index before attempting broker dispatch. The store write is the
//! durability guarantee; the broker only shortens the time until consumers
//! notice. Consumers poll [`EventLog::list_unreconciled`] (or react to a
//! broker message) and call [`EventLog::mark_reconciled`] once applied, so
//! delivery is at-least-once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use concord_core::collaboration::{validate_event_type, validate_identifier};
use concord_core::error::CoreError;
use concord_store::models::{decode, encode, ReconciliationEvent};
use concord_store::{Keyspace, KvStore, SharedStore, StoreError};

use crate::broker::{topic_for, BrokerError, SharedBroker};

/// Default deadline for a single broker publish.
const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of `published_at` timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Errors from event log operations.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Malformed identifier or event type; nothing was written.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// The store failed or timed out.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Dispatch counters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of the broker dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DispatchSnapshot {
    /// Events the broker accepted.
    pub dispatched: u64,
    /// Events recorded durably whose broker publish failed or timed out.
    pub failed: u64,
    /// Events recorded while no broker was configured.
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Stateless view over the event records in the store.
///
/// Cheap to clone; clones share the dispatch counters.
#[derive(Clone)]
pub struct EventLog {
    store: SharedStore,
    keys: Keyspace,
    broker: Option<SharedBroker>,
    topic_prefix: String,
    dispatch_timeout: Duration,
    clock: Clock,
    counters: Arc<DispatchCounters>,
}

impl EventLog {
    /// An event log with no broker (store-only mode).
    pub fn new(store: SharedStore, keys: Keyspace) -> Self {
        Self {
            store,
            keys,
            broker: None,
            topic_prefix: String::new(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            clock: Arc::new(Utc::now),
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    /// Dispatch recorded events to `broker` on `{topic_prefix}.{event_type}`.
    pub fn with_broker(mut self, broker: SharedBroker, topic_prefix: impl Into<String>) -> Self {
        self.broker = Some(broker);
        self.topic_prefix = topic_prefix.into();
        self
    }

    /// Bound each broker publish by `timeout`.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Take `published_at` from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Same log (and counters) over a different store handle.
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = store;
        self
    }

    pub fn has_broker(&self) -> bool {
        self.broker.is_some()
    }

    /// Record a new event and hand it to the broker.
    ///
    /// Succeeds once the event is recorded and indexed, whatever happens
    /// at the broker. Broker failures are logged and counted only.
    pub async fn publish(
        &self,
        resource_id: &str,
        actor_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<ReconciliationEvent, EventError> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;
        validate_identifier("actor_id", actor_id).map_err(CoreError::Validation)?;
        validate_event_type(event_type).map_err(CoreError::Validation)?;

        let index = self.keys.event_index(resource_id);
        let published_at = self.next_timestamp(&index).await?;
        let event = ReconciliationEvent::new(resource_id, actor_id, event_type, payload, published_at);
        let record_key = self.keys.event(&event.event_id);

        self.store.set(&record_key, &encode(&event)?, None).await?;
        let position = self
            .store
            .list_push(&index, &event.event_id)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    event_id = %event.event_id,
                    resource_id,
                    "Event recorded but not indexed"
                );
            })?;

        tracing::info!(
            event_id = %event.event_id,
            resource_id,
            actor_id,
            event_type,
            position,
            "Event recorded"
        );

        self.dispatch(&event).await;
        Ok(event)
    }

    /// The clock reading, never earlier than the newest indexed event, so
    /// timestamps stay monotonic along the index when a clock steps back.
    async fn next_timestamp(&self, index: &str) -> Result<DateTime<Utc>, EventError> {
        let now = (self.clock)();
        let Some(last_id) = self.store.list_last(index).await? else {
            return Ok(now);
        };
        let key = self.keys.event(&last_id);
        match self.store.get(&key).await? {
            Some(raw) => {
                let last: ReconciliationEvent = decode(&key, &raw)?;
                Ok(now.max(last.published_at))
            }
            None => Ok(now),
        }
    }

    /// Best-effort broker dispatch. Never fails the caller.
    async fn dispatch(&self, event: &ReconciliationEvent) {
        let Some(broker) = &self.broker else {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let topic = topic_for(&self.topic_prefix, &event.event_type);
        let result = match tokio::time::timeout(self.dispatch_timeout, broker.publish(&topic, event))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.dispatch_timeout)),
        };

        match result {
            Ok(()) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event_id = %event.event_id, topic = %topic, "Event dispatched");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    event_id = %event.event_id,
                    resource_id = %event.resource_id,
                    topic = %topic,
                    "Broker dispatch failed, event remains unreconciled in the log"
                );
            }
        }
    }

    /// Fetch one event by id.
    pub async fn get(&self, event_id: &str) -> Result<Option<ReconciliationEvent>, EventError> {
        validate_identifier("event_id", event_id).map_err(CoreError::Validation)?;
        let key = self.keys.event(event_id);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(decode(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// All events for a resource in index (append) order, oldest first.
    pub async fn list(&self, resource_id: &str) -> Result<Vec<ReconciliationEvent>, EventError> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;

        let ids = self
            .store
            .list_range(&self.keys.event_index(resource_id))
            .await?;

        let mut events = Vec::with_capacity(ids.len());
        for event_id in ids {
            let key = self.keys.event(&event_id);
            match self.store.get(&key).await? {
                Some(raw) => events.push(decode::<ReconciliationEvent>(&key, &raw)?),
                None => {
                    tracing::debug!(event_id = %event_id, resource_id, "Indexed event has no record");
                }
            }
        }

        Ok(events)
    }

    /// Events for a resource not yet marked reconciled, oldest first.
    pub async fn list_unreconciled(
        &self,
        resource_id: &str,
    ) -> Result<Vec<ReconciliationEvent>, EventError> {
        let mut events = self.list(resource_id).await?;
        events.retain(|e| !e.reconciled);
        Ok(events)
    }

    /// Mark an event as processed.
    ///
    /// Returns `true` if this call performed the transition; `false` if the
    /// event was already reconciled, is missing, or a concurrent call won.
    pub async fn mark_reconciled(&self, event_id: &str) -> Result<bool, EventError> {
        validate_identifier("event_id", event_id).map_err(CoreError::Validation)?;

        let key = self.keys.event(event_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(false);
        };
        let event: ReconciliationEvent = decode(&key, &raw)?;
        if event.reconciled {
            return Ok(false);
        }

        let updated = encode(&event.into_reconciled())?;
        // Only the unreconciled record is replaced, so the flag never reverts.
        let swapped = self
            .store
            .compare_and_set(&key, &raw, &updated, None)
            .await?;
        if swapped {
            tracing::info!(event_id, "Event reconciled");
        }
        Ok(swapped)
    }

    /// Current dispatch counters.
    pub fn dispatch_snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}
