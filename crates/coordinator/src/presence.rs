//! Presence tracking with TTL-based liveness.
//!
//! Each (resource, actor) pair has one record whose store expiry is the
//! stale threshold; a client that stops heartbeating simply disappears.
//! The per-resource membership index can briefly list actors whose record
//! already expired. Readers treat the missing record as authoritative and
//! drop the index entry as they go.

use std::time::Duration;

use chrono::Utc;
use concord_core::collaboration::{
    validate_identifier, validate_presence_ref, PresenceMode, PresenceStatus,
};
use concord_core::error::CoreError;
use concord_store::models::{decode, encode, PresenceMetadata, PresenceRecord};
use concord_store::{Keyspace, KvStore, SharedStore};

use crate::error::CoordResult;

/// Bound on read/compare-and-set rounds for one update.
const MAX_ATTEMPTS: usize = 3;

/// Stateless presence operations over a shared store.
#[derive(Clone)]
pub struct PresenceTracker {
    store: SharedStore,
    keys: Keyspace,
    stale_threshold: Duration,
}

impl PresenceTracker {
    pub fn new(store: SharedStore, keys: Keyspace, stale_threshold: Duration) -> Self {
        Self {
            store,
            keys,
            stale_threshold,
        }
    }

    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Attach `actor_id` to `resource_id`.
    ///
    /// Joining again keeps the original `joined_at`, switches to the new
    /// mode, marks the actor online, and refreshes the TTL. Metadata is
    /// replaced only when supplied.
    pub async fn join(
        &self,
        actor_id: &str,
        resource_id: &str,
        mode: PresenceMode,
        metadata: Option<PresenceMetadata>,
    ) -> CoordResult<PresenceRecord> {
        validate_presence_ref(resource_id, actor_id).map_err(CoreError::Validation)?;

        let key = self.keys.presence(resource_id, actor_id);
        let ttl = Some(self.stale_threshold);
        let mut record = None;
        let mut last_seen = None;

        for _ in 0..MAX_ATTEMPTS {
            let now = Utc::now();
            match self.store.get(&key).await? {
                None => {
                    let fresh =
                        PresenceRecord::new(actor_id, resource_id, mode, metadata.clone(), now);
                    if self
                        .store
                        .set_if_absent(&key, &encode(&fresh)?, self.stale_threshold)
                        .await?
                    {
                        record = Some(fresh);
                        break;
                    }
                }
                Some(raw) => {
                    let existing: PresenceRecord = decode(&key, &raw)?;
                    let rejoined = PresenceRecord {
                        mode,
                        status: PresenceStatus::Online,
                        last_heartbeat_at: now,
                        metadata: metadata.clone().or(existing.metadata.clone()),
                        ..existing
                    };
                    if self
                        .store
                        .compare_and_set(&key, &raw, &encode(&rejoined)?, ttl)
                        .await?
                    {
                        record = Some(rejoined);
                        break;
                    }
                    last_seen = Some(rejoined);
                }
            }
        }

        let record = match record {
            Some(record) => record,
            None => {
                // Racing with ourselves from another connection. Keep the
                // join time already recorded.
                self.join_contended(&key, last_seen, actor_id, resource_id, mode, metadata)
                    .await?
            }
        };

        self.index(actor_id, resource_id).await?;

        tracing::info!(actor_id, resource_id, mode = %record.mode, "Presence joined");
        Ok(record)
    }

    /// Last resort for a join that lost every compare-and-set round.
    async fn join_contended(
        &self,
        key: &str,
        last_seen: Option<PresenceRecord>,
        actor_id: &str,
        resource_id: &str,
        mode: PresenceMode,
        metadata: Option<PresenceMetadata>,
    ) -> CoordResult<PresenceRecord> {
        let ttl = Some(self.stale_threshold);
        if let Some(rejoined) = last_seen {
            if self
                .store
                .set_if_present(key, &encode(&rejoined)?, ttl)
                .await?
            {
                return Ok(rejoined);
            }
        }

        let fresh = PresenceRecord::new(actor_id, resource_id, mode, metadata, Utc::now());
        if self
            .store
            .set_if_absent(key, &encode(&fresh)?, self.stale_threshold)
            .await?
        {
            return Ok(fresh);
        }

        // Another join for the same actor just created the record.
        match self.store.get(key).await? {
            Some(raw) => Ok(decode(key, &raw)?),
            None => {
                self.store.set(key, &encode(&fresh)?, ttl).await?;
                Ok(fresh)
            }
        }
    }

    /// Make sure the actor is listed in the resource's index and the
    /// resource is tracked for sweeping. Idempotent.
    async fn index(&self, actor_id: &str, resource_id: &str) -> CoordResult<()> {
        self.store
            .set_add(&self.keys.presence_index(resource_id), actor_id)
            .await?;
        self.store
            .set_add(&self.keys.presence_resources(), resource_id)
            .await?;
        Ok(())
    }

    /// Detach `actor_id`. Returns `true` if a record was removed.
    pub async fn leave(&self, actor_id: &str, resource_id: &str) -> CoordResult<bool> {
        validate_presence_ref(resource_id, actor_id).map_err(CoreError::Validation)?;

        let removed = self
            .store
            .delete(&self.keys.presence(resource_id, actor_id))
            .await?;
        self.store
            .set_remove(&self.keys.presence_index(resource_id), actor_id)
            .await?;

        if removed {
            tracing::info!(actor_id, resource_id, "Presence left");
        }
        Ok(removed)
    }

    /// Refresh liveness. `None` if the actor is not attached; a heartbeat
    /// never recreates an expired or removed record.
    pub async fn heartbeat(
        &self,
        actor_id: &str,
        resource_id: &str,
    ) -> CoordResult<Option<PresenceRecord>> {
        validate_presence_ref(resource_id, actor_id).map_err(CoreError::Validation)?;
        self.refresh(actor_id, resource_id, |_| {}).await
    }

    /// Change the reported status and refresh liveness. `None` if the actor
    /// is not attached.
    pub async fn update_status(
        &self,
        actor_id: &str,
        resource_id: &str,
        status: PresenceStatus,
    ) -> CoordResult<Option<PresenceRecord>> {
        validate_presence_ref(resource_id, actor_id).map_err(CoreError::Validation)?;
        let record = self
            .refresh(actor_id, resource_id, |r| r.status = status)
            .await?;
        if record.is_some() {
            tracing::debug!(actor_id, resource_id, %status, "Presence status changed");
        }
        Ok(record)
    }

    /// Everyone attached to `resource_id`, earliest joiner first.
    pub async fn list(&self, resource_id: &str) -> CoordResult<Vec<PresenceRecord>> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;

        let (mut records, _) = self.scan(resource_id).await?;
        records.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.actor_id.cmp(&b.actor_id))
        });
        Ok(records)
    }

    /// Drop index entries whose record has expired. Returns how many were
    /// dropped. A resource whose index ends up empty stops being tracked.
    pub async fn prune(&self, resource_id: &str) -> CoordResult<usize> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;
        let (records, dropped) = self.scan(resource_id).await?;
        if records.is_empty() {
            let tracked = self.keys.presence_resources();
            self.store.set_remove(&tracked, resource_id).await?;
            // A join may have indexed someone since the scan.
            let index = self.keys.presence_index(resource_id);
            if !self.store.set_members(&index).await?.is_empty() {
                self.store.set_add(&tracked, resource_id).await?;
            }
        }
        Ok(dropped)
    }

    /// Resources that have had presence since they were last pruned empty.
    pub async fn tracked_resources(&self) -> CoordResult<Vec<String>> {
        Ok(self
            .store
            .set_members(&self.keys.presence_resources())
            .await?)
    }

    /// Read every indexed record, removing index entries with no record.
    async fn scan(&self, resource_id: &str) -> CoordResult<(Vec<PresenceRecord>, usize)> {
        let index = self.keys.presence_index(resource_id);
        let members = self.store.set_members(&index).await?;

        let mut records = Vec::with_capacity(members.len());
        let mut dropped = 0;
        for actor_id in members {
            let key = self.keys.presence(resource_id, &actor_id);
            match self.store.get(&key).await? {
                Some(raw) => records.push(decode(&key, &raw)?),
                None => {
                    if !self.store.set_remove(&index, &actor_id).await? {
                        continue;
                    }
                    // The actor may have rejoined between the read and the
                    // removal; their join saw the entry still present.
                    if let Some(raw) = self.store.get(&key).await? {
                        self.store.set_add(&index, &actor_id).await?;
                        records.push(decode(&key, &raw)?);
                        continue;
                    }
                    dropped += 1;
                    tracing::debug!(actor_id = %actor_id, resource_id, "Dropped stale presence entry");
                }
            }
        }
        Ok((records, dropped))
    }

    /// Apply `change` to the current record and write it back, refreshing
    /// `last_heartbeat_at` and the TTL. Only ever overwrites an existing
    /// record, and re-asserts its index entry after a successful write.
    async fn refresh(
        &self,
        actor_id: &str,
        resource_id: &str,
        change: impl Fn(&mut PresenceRecord),
    ) -> CoordResult<Option<PresenceRecord>> {
        let key = self.keys.presence(resource_id, actor_id);
        let ttl = Some(self.stale_threshold);

        let mut latest = None;
        for _ in 0..MAX_ATTEMPTS {
            let Some(raw) = self.store.get(&key).await? else {
                tracing::debug!(actor_id, resource_id, "Refresh for absent presence ignored");
                return Ok(None);
            };
            let mut record: PresenceRecord = decode(&key, &raw)?;
            change(&mut record);
            record.last_heartbeat_at = Utc::now();

            if self
                .store
                .compare_and_set(&key, &raw, &encode(&record)?, ttl)
                .await?
            {
                self.index(actor_id, resource_id).await?;
                return Ok(Some(record));
            }
            latest = Some(record);
        }

        // Still contended: write our view only if the record still exists.
        let Some(record) = latest else {
            return Ok(None);
        };
        if self
            .store
            .set_if_present(&key, &encode(&record)?, ttl)
            .await?
        {
            self.index(actor_id, resource_id).await?;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}
