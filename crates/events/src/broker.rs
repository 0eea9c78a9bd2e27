//! Broker client contract.
//!
//! The broker is a notification accelerator, not the store of record: the
//! [`EventLog`](crate::EventLog) writes every event to the key-value store
//! before it ever calls [`Broker::publish`], and a failed publish is never
//! retried by this crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use concord_store::models::ReconciliationEvent;

use crate::bus::EventBus;
use crate::redis_broker::RedisBroker;

/// Shared handle to any broker backend.
pub type SharedBroker = Arc<dyn Broker>;

/// Failures handing an event to the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported broker URL: {0}")]
    UnsupportedUrl(String),
}

/// Fire-and-forget publish of a recorded event on a topic.
///
/// Implementations return once the transport has accepted the message; they
/// do not wait for consumers.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, event: &ReconciliationEvent) -> Result<(), BrokerError>;
}

/// Topic an event type is published on, e.g. `resource.events.update`.
pub fn topic_for(prefix: &str, event_type: &str) -> String {
    if prefix.is_empty() {
        event_type.to_string()
    } else {
        format!("{prefix}.{event_type}")
    }
}

/// Build a broker from a connection URL.
///
/// `memory://` yields an in-process [`EventBus`]; `redis://` and `rediss://`
/// yield a [`RedisBroker`].
pub async fn create_broker(url: &str) -> Result<SharedBroker, BrokerError> {
    let url = url.trim();
    if url.starts_with("memory://") {
        tracing::info!("Using in-process event bus as broker");
        return Ok(Arc::new(EventBus::default()));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        let broker = RedisBroker::connect(url).await?;
        return Ok(Arc::new(broker));
    }
    Err(BrokerError::UnsupportedUrl(url.to_string()))
}
