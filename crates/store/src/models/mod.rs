//! Records persisted in the store.
//!
//! Each submodule contains one JSON-serialized record type plus the small
//! helpers the managers need to reason about it (expiry, ownership).

pub mod event;
pub mod lock;
pub mod presence;

pub use event::ReconciliationEvent;
pub use lock::Lock;
pub use presence::{PresenceMetadata, PresenceRecord};

use std::time::Duration;

use chrono::{DateTime, Utc};
use concord_core::types::Timestamp;

/// `now + ttl`, saturating at the latest representable instant.
pub fn expiry_after(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Decode a stored record, attributing failures to the key.
pub fn decode<T: serde::de::DeserializeOwned>(
    key: &str,
    raw: &str,
) -> Result<T, crate::StoreError> {
    serde_json::from_str(raw).map_err(|source| crate::StoreError::Corrupt {
        key: key.to_string(),
        source,
    })
}

/// Encode a record for storage.
pub fn encode<T: serde::Serialize>(record: &T) -> Result<String, crate::StoreError> {
    Ok(serde_json::to_string(record)?)
}
