//! The coordinator: one entry point per inbound operation.
//!
//! [`Coordinator`] composes the lock manager, presence tracker, and event log.
//! It holds no coordination state of its own. Its job is call ordering,
//! result shaping, and building the [`Notification`] the transport layer
//! should broadcast to the other actors attached to the resource.

use std::sync::Arc;
use std::time::Duration;

use concord_core::collaboration::{Notification, PresenceMode, PresenceStatus, ReleaseReason};
use concord_events::{create_broker, EventLog, SharedBroker};
use concord_store::models::{Lock, PresenceMetadata, PresenceRecord, ReconciliationEvent};
use concord_store::{create_store, Keyspace, KvStore, SharedStore, TimeoutStore};
use serde::Serialize;

use crate::config::CoordinatorConfig;
use crate::error::CoordResult;
use crate::lock::{
    AcquireOutcome, AdministrativeOverride, LockManager, ReleaseOutcome, RenewOutcome,
};
use crate::metrics::{MetricsSnapshot, OpCounters};
use crate::presence::PresenceTracker;

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// An operation result plus the notification to broadcast for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notified<T> {
    pub value: T,
    pub notification: Notification,
}

/// A manager outcome plus the notification to broadcast, present only
/// when the operation changed state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reported<T> {
    pub outcome: T,
    pub notification: Option<Notification>,
}

/// Everything a client needs right after attaching to a resource.
///
/// The three reads are sequential, not a transaction: the lock and the
/// presence list may already be stale when the caller sees them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachSnapshot {
    /// The caller's own presence record.
    pub presence: PresenceRecord,
    /// Current lock on the resource, if any.
    pub lock: Option<Lock>,
    /// Everyone attached, the caller included.
    pub all_presence: Vec<PresenceRecord>,
    /// `actor-joined` for the other attached actors.
    pub notification: Notification,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share the store, broker, and counters.
#[derive(Clone)]
pub struct Coordinator {
    /// Unwrapped backend, kept so [`with_op_timeout`](Self::with_op_timeout)
    /// can re-bound it.
    base_store: SharedStore,
    /// `base_store` behind the operation deadline.
    store: SharedStore,
    keys: Keyspace,
    locks: LockManager,
    presence: PresenceTracker,
    events: EventLog,
    counters: Arc<OpCounters>,
}

impl Coordinator {
    /// Build a coordinator over an existing store and optional broker.
    ///
    /// Every store call and broker publish is bounded by `config.op_timeout`.
    pub fn new(
        store: SharedStore,
        broker: Option<SharedBroker>,
        config: &CoordinatorConfig,
    ) -> Self {
        let keys = Keyspace::new(config.namespace.clone());
        let bounded: SharedStore = Arc::new(TimeoutStore::new(store.clone(), config.op_timeout));

        let mut events = EventLog::new(bounded.clone(), keys.clone())
            .with_dispatch_timeout(config.op_timeout);
        if let Some(broker) = broker {
            events = events.with_broker(broker, config.topic_prefix.clone());
        }

        Self {
            base_store: store,
            locks: LockManager::new(bounded.clone(), keys.clone(), config.lock_ttl),
            presence: PresenceTracker::new(
                bounded.clone(),
                keys.clone(),
                config.presence_stale_threshold,
            ),
            store: bounded,
            keys,
            events,
            counters: Arc::new(OpCounters::default()),
        }
    }

    /// Connect to the configured store and broker.
    pub async fn connect(config: &CoordinatorConfig) -> CoordResult<Self> {
        let store = create_store(&config.store_url).await?;
        let broker = match &config.broker_url {
            Some(url) => Some(create_broker(url).await?),
            None => {
                tracing::info!("No broker configured, events are recorded in the store only");
                None
            }
        };
        Ok(Self::new(store, broker, config))
    }

    /// A view of this coordinator whose store calls and broker publishes are
    /// bounded by `timeout` instead of the configured default.
    pub fn with_op_timeout(&self, timeout: Duration) -> Self {
        let bounded: SharedStore = Arc::new(TimeoutStore::new(self.base_store.clone(), timeout));
        Self {
            base_store: self.base_store.clone(),
            store: bounded.clone(),
            keys: self.keys.clone(),
            locks: LockManager::new(bounded.clone(), self.keys.clone(), *self.locks.ttl_policy()),
            presence: PresenceTracker::new(
                bounded.clone(),
                self.keys.clone(),
                self.presence.stale_threshold(),
            ),
            events: self
                .events
                .clone()
                .with_store(bounded)
                .with_dispatch_timeout(timeout),
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Check that the store answers.
    pub async fn health_check(&self) -> CoordResult<()> {
        let result = self.store.ping().await.map_err(Into::into);
        self.track(result)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.counters.snapshot(self.events.dispatch_snapshot())
    }

    fn track<T>(&self, result: CoordResult<T>) -> CoordResult<T> {
        if let Err(e) = &result {
            self.counters.record_error(e);
        }
        result
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// Join, then read the lock, then list presence.
    pub async fn attach(
        &self,
        actor_id: &str,
        resource_id: &str,
        mode: PresenceMode,
        metadata: Option<PresenceMetadata>,
    ) -> CoordResult<AttachSnapshot> {
        let result = self
            .attach_inner(actor_id, resource_id, mode, metadata)
            .await;
        self.track(result)
    }

    async fn attach_inner(
        &self,
        actor_id: &str,
        resource_id: &str,
        mode: PresenceMode,
        metadata: Option<PresenceMetadata>,
    ) -> CoordResult<AttachSnapshot> {
        let presence = self
            .presence
            .join(actor_id, resource_id, mode, metadata)
            .await?;
        OpCounters::incr(&self.counters.presence_joined);
        let lock = self.locks.get(resource_id).await?;
        let all_presence = self.presence.list(resource_id).await?;

        Ok(AttachSnapshot {
            notification: Notification::ActorJoined {
                resource_id: resource_id.to_string(),
                actor_id: actor_id.to_string(),
                mode: presence.mode,
            },
            presence,
            lock,
            all_presence,
        })
    }

    /// Leave the resource. The notification is produced even if the actor
    /// had already expired, so clients can clear stale entries.
    pub async fn detach(&self, actor_id: &str, resource_id: &str) -> CoordResult<Notification> {
        let removed = self.track(self.presence.leave(actor_id, resource_id).await)?;
        if removed {
            OpCounters::incr(&self.counters.presence_left);
        }
        Ok(Notification::ActorLeft {
            resource_id: resource_id.to_string(),
            actor_id: actor_id.to_string(),
        })
    }

    pub async fn heartbeat(
        &self,
        actor_id: &str,
        resource_id: &str,
    ) -> CoordResult<Option<PresenceRecord>> {
        let record = self.track(self.presence.heartbeat(actor_id, resource_id).await)?;
        match record {
            Some(_) => OpCounters::incr(&self.counters.heartbeats),
            None => OpCounters::incr(&self.counters.heartbeats_ignored),
        }
        Ok(record)
    }

    /// `None` when the actor is not attached; nothing to broadcast then.
    pub async fn update_status(
        &self,
        actor_id: &str,
        resource_id: &str,
        status: PresenceStatus,
    ) -> CoordResult<Option<Notified<PresenceRecord>>> {
        let record = self.track(
            self.presence
                .update_status(actor_id, resource_id, status)
                .await,
        )?;
        let Some(record) = record else {
            OpCounters::incr(&self.counters.heartbeats_ignored);
            return Ok(None);
        };
        Ok(Some(Notified {
            notification: Notification::StatusChanged {
                resource_id: resource_id.to_string(),
                actor_id: actor_id.to_string(),
                status: record.status,
            },
            value: record,
        }))
    }

    pub async fn list_presence(&self, resource_id: &str) -> CoordResult<Vec<PresenceRecord>> {
        self.track(self.presence.list(resource_id).await)
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    pub async fn acquire_lock(
        &self,
        resource_id: &str,
        owner_id: &str,
        ttl: Option<Duration>,
    ) -> CoordResult<AcquireOutcome> {
        let outcome = self.track(self.locks.acquire(resource_id, owner_id, ttl).await)?;
        match &outcome {
            AcquireOutcome::Acquired(_) => OpCounters::incr(&self.counters.locks_acquired),
            AcquireOutcome::Denied { .. } => OpCounters::incr(&self.counters.locks_denied),
        }
        Ok(outcome)
    }

    /// Acquire and build the lock-acquired notification. A denial is
    /// reported without one.
    pub async fn lock_and_notify(
        &self,
        resource_id: &str,
        owner_id: &str,
        ttl: Option<Duration>,
    ) -> CoordResult<Reported<AcquireOutcome>> {
        let outcome = self.acquire_lock(resource_id, owner_id, ttl).await?;
        let notification = match &outcome {
            AcquireOutcome::Acquired(lock) => Some(Notification::LockAcquired {
                resource_id: lock.resource_id.clone(),
                owner_id: lock.owner_id.clone(),
                lock_id: lock.lock_id.clone(),
                expires_at: lock.expires_at,
            }),
            AcquireOutcome::Denied { .. } => None,
        };
        Ok(Reported {
            outcome,
            notification,
        })
    }

    pub async fn release_lock(
        &self,
        resource_id: &str,
        owner_id: &str,
        lock_id: Option<&str>,
    ) -> CoordResult<ReleaseOutcome> {
        let outcome = self.track(self.locks.release(resource_id, owner_id, lock_id).await)?;
        if let ReleaseOutcome::Released(_) = &outcome {
            OpCounters::incr(&self.counters.locks_released);
        }
        Ok(outcome)
    }

    /// Release and build the lock-released notification. Not-owner and
    /// not-found are reported without one.
    pub async fn unlock_and_notify(
        &self,
        resource_id: &str,
        owner_id: &str,
        lock_id: Option<&str>,
    ) -> CoordResult<Reported<ReleaseOutcome>> {
        let outcome = self.release_lock(resource_id, owner_id, lock_id).await?;
        let notification = match &outcome {
            ReleaseOutcome::Released(lock) => Some(Notification::LockReleased {
                resource_id: lock.resource_id.clone(),
                owner_id: Some(lock.owner_id.clone()),
                reason: ReleaseReason::Released,
            }),
            ReleaseOutcome::NotOwner { .. } | ReleaseOutcome::NotFound { .. } => None,
        };
        Ok(Reported {
            outcome,
            notification,
        })
    }

    pub async fn renew_lock(
        &self,
        resource_id: &str,
        owner_id: &str,
        ttl: Option<Duration>,
    ) -> CoordResult<RenewOutcome> {
        let outcome = self.track(self.locks.renew(resource_id, owner_id, ttl).await)?;
        if let RenewOutcome::Renewed(_) = &outcome {
            OpCounters::incr(&self.counters.locks_renewed);
        }
        Ok(outcome)
    }

    pub async fn get_lock(&self, resource_id: &str) -> CoordResult<Option<Lock>> {
        self.track(self.locks.get(resource_id).await)
    }

    /// Administrative unlock, bypassing the ownership check.
    pub async fn force_unlock(&self, resource_id: &str) -> CoordResult<AdministrativeOverride> {
        let outcome = self.track(self.locks.force_unlock(resource_id).await)?;
        OpCounters::incr(&self.counters.locks_overridden);
        Ok(outcome)
    }

    pub async fn force_unlock_and_notify(
        &self,
        resource_id: &str,
    ) -> CoordResult<Notified<AdministrativeOverride>> {
        let outcome = self.force_unlock(resource_id).await?;
        Ok(Notified {
            notification: Notification::LockReleased {
                resource_id: resource_id.to_string(),
                owner_id: outcome.previous.as_ref().map(|l| l.owner_id.clone()),
                reason: ReleaseReason::AdministrativeOverride,
            },
            value: outcome,
        })
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub async fn publish_event(
        &self,
        resource_id: &str,
        actor_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> CoordResult<ReconciliationEvent> {
        let event = self.track(
            self.events
                .publish(resource_id, actor_id, event_type, payload)
                .await
                .map_err(Into::into),
        )?;
        OpCounters::incr(&self.counters.events_published);
        Ok(event)
    }

    pub async fn publish_and_notify(
        &self,
        resource_id: &str,
        actor_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> CoordResult<Notified<ReconciliationEvent>> {
        let event = self
            .publish_event(resource_id, actor_id, event_type, payload)
            .await?;
        Ok(Notified {
            notification: Notification::EventPublished {
                resource_id: event.resource_id.clone(),
                actor_id: event.actor_id.clone(),
                event_id: event.event_id.clone(),
                event_type: event.event_type.clone(),
            },
            value: event,
        })
    }

    pub async fn list_events(&self, resource_id: &str) -> CoordResult<Vec<ReconciliationEvent>> {
        self.track(self.events.list(resource_id).await.map_err(Into::into))
    }

    pub async fn list_unreconciled_events(
        &self,
        resource_id: &str,
    ) -> CoordResult<Vec<ReconciliationEvent>> {
        self.track(
            self.events
                .list_unreconciled(resource_id)
                .await
                .map_err(Into::into),
        )
    }

    /// `true` if this call flipped the event to reconciled.
    pub async fn mark_reconciled(&self, event_id: &str) -> CoordResult<bool> {
        let swapped = self.track(
            self.events
                .mark_reconciled(event_id)
                .await
                .map_err(Into::into),
        )?;
        if swapped {
            OpCounters::incr(&self.counters.events_reconciled);
        }
        Ok(swapped)
    }
}
