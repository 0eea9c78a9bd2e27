//! Broker that publishes events on Redis pub/sub channels.
//!
//! Each topic is a channel name; the message body is the event as JSON.
//! Redis pub/sub does not buffer for absent subscribers, which is acceptable
//! because consumers can always recover missed events from the event log.

use async_trait::async_trait;
use concord_store::models::ReconciliationEvent;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::broker::{Broker, BrokerError};

pub struct RedisBroker {
    conn: ConnectionManager,
}

impl RedisBroker {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        tracing::info!("Connected to Redis broker");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, topic: &str, event: &ReconciliationEvent) -> Result<(), BrokerError> {
        let body = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(topic, body).await?;
        tracing::trace!(topic, receivers, event_id = %event.event_id, "Published to Redis");
        Ok(())
    }
}
