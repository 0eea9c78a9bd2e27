//! Exclusive, TTL-bounded resource locks.
//!
//! Acquisition is one `set_if_absent` call with the lock TTL as the store
//! expiry. Release and renew inspect the current record and then mutate it
//! with a compare-and-delete / compare-and-set against the exact value read,
//! so a record that changed in between is never touched. The store is the
//! only source of truth; nothing is cached here.

use std::time::Duration;

use chrono::Utc;
use concord_core::collaboration::{validate_identifier, LockTtlPolicy};
use concord_core::error::CoreError;
use concord_core::types::ResourceId;
use concord_store::models::{decode, encode, expiry_after, Lock};
use concord_store::{Keyspace, KvStore, SharedStore};

use crate::error::CoordResult;

/// How many times release/renew/acquire re-evaluate after the record changed
/// between the read and the conditional write.
const MAX_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(Lock),
    /// A live lock exists. `holder` is read back best-effort and may be
    /// `None` if it vanished or could not be read.
    Denied { holder: Option<Lock> },
}

impl AcquireOutcome {
    /// Convert a denial into [`CoreError::Conflict`] naming the holder.
    pub fn into_result(self) -> Result<Lock, CoreError> {
        match self {
            Self::Acquired(lock) => Ok(lock),
            Self::Denied { holder: Some(h) } => Err(CoreError::Conflict(format!(
                "Resource {} is locked by {} until {}",
                h.resource_id, h.owner_id, h.expires_at
            ))),
            Self::Denied { holder: None } => {
                Err(CoreError::Conflict("Resource is already locked".into()))
            }
        }
    }
}

/// Result of [`LockManager::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lock that was removed.
    Released(Lock),
    /// Someone else holds the lock (or the supplied `lock_id` is stale).
    NotOwner { holder: Lock },
    NotFound { resource_id: ResourceId },
}

impl ReleaseOutcome {
    pub fn into_result(self) -> Result<Lock, CoreError> {
        match self {
            Self::Released(lock) => Ok(lock),
            Self::NotOwner { holder } => Err(CoreError::Conflict(format!(
                "You do not hold the lock on resource {}",
                holder.resource_id
            ))),
            Self::NotFound { resource_id } => Err(CoreError::NotFound {
                entity: "Lock",
                id: resource_id,
            }),
        }
    }
}

/// Result of [`LockManager::renew`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    /// The lock with its extended `expires_at`.
    Renewed(Lock),
    NotOwner { holder: Lock },
    NotFound { resource_id: ResourceId },
}

impl RenewOutcome {
    pub fn into_result(self) -> Result<Lock, CoreError> {
        match self {
            Self::Renewed(lock) => Ok(lock),
            Self::NotOwner { holder } => Err(CoreError::Conflict(format!(
                "You do not hold the lock on resource {}",
                holder.resource_id
            ))),
            Self::NotFound { resource_id } => Err(CoreError::NotFound {
                entity: "Lock",
                id: resource_id,
            }),
        }
    }
}

/// Result of [`LockManager::force_unlock`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AdministrativeOverride {
    /// The live lock that was removed, if there was one.
    pub previous: Option<Lock>,
}

// ---------------------------------------------------------------------------
// LockManager
// ---------------------------------------------------------------------------

/// Stateless lock operations over a shared store.
#[derive(Clone)]
pub struct LockManager {
    store: SharedStore,
    keys: Keyspace,
    ttl: LockTtlPolicy,
}

impl LockManager {
    pub fn new(store: SharedStore, keys: Keyspace, ttl: LockTtlPolicy) -> Self {
        Self { store, keys, ttl }
    }

    pub fn ttl_policy(&self) -> &LockTtlPolicy {
        &self.ttl
    }

    /// Try to take the lock on `resource_id` for `owner_id`.
    ///
    /// `ttl` defaults to the policy default and is clamped to its bounds.
    /// Denied whenever a live lock exists, including one held by `owner_id`.
    pub async fn acquire(
        &self,
        resource_id: &str,
        owner_id: &str,
        ttl: Option<Duration>,
    ) -> CoordResult<AcquireOutcome> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;
        validate_identifier("owner_id", owner_id).map_err(CoreError::Validation)?;

        let ttl = self.ttl.resolve(ttl);
        let key = self.keys.lock(resource_id);

        for _ in 0..MAX_ATTEMPTS {
            let lock = Lock::new(resource_id, owner_id, ttl, Utc::now());
            if self.store.set_if_absent(&key, &encode(&lock)?, ttl).await? {
                tracing::info!(
                    resource_id,
                    owner_id,
                    lock_id = %lock.lock_id,
                    expires_at = %lock.expires_at,
                    "Lock acquired"
                );
                return Ok(AcquireOutcome::Acquired(lock));
            }

            // Lock already held -- fetch holder info for the denial.
            match self.read(&key).await {
                Ok(Some((raw, holder))) if holder.is_expired_at(Utc::now()) => {
                    // Lapsed but not yet evicted by the store.
                    self.store.compare_and_delete(&key, &raw).await?;
                }
                Ok(Some((_, holder))) => {
                    tracing::info!(
                        resource_id,
                        owner_id,
                        holder_id = %holder.owner_id,
                        "Lock denied"
                    );
                    return Ok(AcquireOutcome::Denied {
                        holder: Some(holder),
                    });
                }
                // Released between our write and the read; try again.
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, resource_id, "Could not read lock holder");
                    return Ok(AcquireOutcome::Denied { holder: None });
                }
            }
        }

        tracing::info!(resource_id, owner_id, "Lock denied after repeated contention");
        Ok(AcquireOutcome::Denied { holder: None })
    }

    /// Release the lock if `owner_id` holds it.
    ///
    /// When `lock_id` is given it must match the current acquisition too,
    /// which stops a client from releasing a newer lock it re-acquired
    /// elsewhere.
    pub async fn release(
        &self,
        resource_id: &str,
        owner_id: &str,
        lock_id: Option<&str>,
    ) -> CoordResult<ReleaseOutcome> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;
        validate_identifier("owner_id", owner_id).map_err(CoreError::Validation)?;

        let key = self.keys.lock(resource_id);
        for _ in 0..MAX_ATTEMPTS {
            let Some((raw, lock)) = self.read_live(&key).await? else {
                return Ok(ReleaseOutcome::NotFound {
                    resource_id: resource_id.to_string(),
                });
            };
            if !lock.is_held_by(owner_id, lock_id) {
                return Ok(ReleaseOutcome::NotOwner { holder: lock });
            }
            if self.store.compare_and_delete(&key, &raw).await? {
                tracing::info!(resource_id, owner_id, lock_id = %lock.lock_id, "Lock released");
                return Ok(ReleaseOutcome::Released(lock));
            }
        }

        Err(CoreError::Conflict(format!(
            "Lock on resource {resource_id} kept changing during release"
        ))
        .into())
    }

    /// Extend the lock held by `owner_id`.
    ///
    /// The new expiry is `now + ttl`, but never earlier than one
    /// millisecond past the current expiry.
    pub async fn renew(
        &self,
        resource_id: &str,
        owner_id: &str,
        ttl: Option<Duration>,
    ) -> CoordResult<RenewOutcome> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;
        validate_identifier("owner_id", owner_id).map_err(CoreError::Validation)?;

        let ttl = self.ttl.resolve(ttl);
        let key = self.keys.lock(resource_id);
        for _ in 0..MAX_ATTEMPTS {
            let Some((raw, lock)) = self.read_live(&key).await? else {
                return Ok(RenewOutcome::NotFound {
                    resource_id: resource_id.to_string(),
                });
            };
            if !lock.is_held_by(owner_id, None) {
                return Ok(RenewOutcome::NotOwner { holder: lock });
            }

            let now = Utc::now();
            let expires_at = expiry_after(now, ttl)
                .max(lock.expires_at + chrono::Duration::milliseconds(1));
            let renewed = Lock { expires_at, ..lock };
            let store_ttl = renewed.remaining_at(now).unwrap_or(ttl);

            if self
                .store
                .compare_and_set(&key, &raw, &encode(&renewed)?, Some(store_ttl))
                .await?
            {
                tracing::debug!(
                    resource_id,
                    owner_id,
                    new_expires_at = %renewed.expires_at,
                    "Lock renewed"
                );
                return Ok(RenewOutcome::Renewed(renewed));
            }
        }

        Err(CoreError::Conflict(format!(
            "Lock on resource {resource_id} kept changing during renew"
        ))
        .into())
    }

    /// The live lock on `resource_id`, if any.
    ///
    /// A record past its `expires_at` reads as unlocked and is removed.
    pub async fn get(&self, resource_id: &str) -> CoordResult<Option<Lock>> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;
        let key = self.keys.lock(resource_id);
        Ok(self.read_live(&key).await?.map(|(_, lock)| lock))
    }

    /// Remove the lock regardless of owner.
    pub async fn force_unlock(&self, resource_id: &str) -> CoordResult<AdministrativeOverride> {
        validate_identifier("resource_id", resource_id).map_err(CoreError::Validation)?;

        let key = self.keys.lock(resource_id);
        for _ in 0..MAX_ATTEMPTS {
            let Some((raw, lock)) = self.read(&key).await? else {
                return Ok(AdministrativeOverride { previous: None });
            };
            if self.store.compare_and_delete(&key, &raw).await? {
                let previous = (!lock.is_expired_at(Utc::now())).then_some(lock);
                tracing::warn!(
                    resource_id,
                    previous_owner = previous.as_ref().map(|l| l.owner_id.as_str()),
                    "Lock removed by administrative override"
                );
                return Ok(AdministrativeOverride { previous });
            }
        }

        // Churning: remove whatever is there now.
        self.store.delete(&key).await?;
        tracing::warn!(resource_id, "Lock removed by administrative override");
        Ok(AdministrativeOverride { previous: None })
    }

    async fn read(&self, key: &str) -> CoordResult<Option<(String, Lock)>> {
        match self.store.get(key).await? {
            Some(raw) => {
                let lock = decode(key, &raw)?;
                Ok(Some((raw, lock)))
            }
            None => Ok(None),
        }
    }

    /// Like [`read`](Self::read), treating a lapsed record as absent and
    /// removing it.
    async fn read_live(&self, key: &str) -> CoordResult<Option<(String, Lock)>> {
        match self.read(key).await? {
            Some((raw, lock)) if lock.is_expired_at(Utc::now()) => {
                if self.store.compare_and_delete(key, &raw).await? {
                    tracing::debug!(
                        resource_id = %lock.resource_id,
                        lock_id = %lock.lock_id,
                        "Removed lapsed lock"
                    );
                }
                Ok(None)
            }
            other => Ok(other),
        }
    }
}
