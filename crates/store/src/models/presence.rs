//! Per-(resource, actor) presence record.

use std::collections::BTreeMap;

use concord_core::collaboration::{PresenceMode, PresenceStatus};
use concord_core::types::{ActorId, ResourceId, Timestamp};
use serde::{Deserialize, Serialize};

/// Opaque client-supplied attributes (cursor colour, display name, ...).
pub type PresenceMetadata = BTreeMap<String, serde_json::Value>;

/// An actor attached to a resource. The record's store TTL is its liveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub actor_id: ActorId,
    pub resource_id: ResourceId,
    pub mode: PresenceMode,
    pub status: PresenceStatus,
    pub joined_at: Timestamp,
    pub last_heartbeat_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PresenceMetadata>,
}

impl PresenceRecord {
    /// A freshly joined, online actor.
    pub fn new(
        actor_id: &str,
        resource_id: &str,
        mode: PresenceMode,
        metadata: Option<PresenceMetadata>,
        now: Timestamp,
    ) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            resource_id: resource_id.to_string(),
            mode,
            status: PresenceStatus::Online,
            joined_at: now,
            last_heartbeat_at: now,
            metadata,
        }
    }
}
