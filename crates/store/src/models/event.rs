//! Reconciliation event record.

use concord_core::types::{ActorId, ResourceId, Timestamp};
use serde::{Deserialize, Serialize};

/// One published mutation intent. Never deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationEvent {
    /// UUID v7, so ids sort roughly by creation time.
    pub event_id: String,
    pub resource_id: ResourceId,
    pub actor_id: ActorId,
    /// Free-form tag; also selects the broker topic.
    pub event_type: String,
    pub payload: serde_json::Value,
    pub published_at: Timestamp,
    /// Flips false to true once and never back.
    pub reconciled: bool,
}

impl ReconciliationEvent {
    pub fn new(
        resource_id: &str,
        actor_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        published_at: Timestamp,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::now_v7().to_string(),
            resource_id: resource_id.to_string(),
            actor_id: actor_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            published_at,
            reconciled: false,
        }
    }

    /// The same event marked as processed.
    pub fn into_reconciled(self) -> Self {
        Self {
            reconciled: true,
            ..self
        }
    }
}
