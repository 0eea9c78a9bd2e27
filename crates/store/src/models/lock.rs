//! Exclusive resource lock record.

use std::time::Duration;

use concord_core::types::{ActorId, ResourceId, Timestamp};
use serde::{Deserialize, Serialize};

use super::expiry_after;

/// A live lock on one resource. Absence of the record means unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub resource_id: ResourceId,
    /// Opaque token, unique per acquisition.
    pub lock_id: String,
    pub owner_id: ActorId,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Lock {
    /// A fresh lock with a new `lock_id`, expiring `ttl` after `now`.
    pub fn new(resource_id: &str, owner_id: &str, ttl: Duration, now: Timestamp) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            lock_id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            acquired_at: now,
            expires_at: expiry_after(now, ttl),
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry, or `None` if already expired.
    pub fn remaining_at(&self, now: Timestamp) -> Option<Duration> {
        (self.expires_at - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Ownership check; `lock_id` is compared only when supplied.
    pub fn is_held_by(&self, owner_id: &str, lock_id: Option<&str>) -> bool {
        self.owner_id == owner_id && lock_id.map_or(true, |id| id == self.lock_id)
    }
}
