//! In-process broker backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans recorded events out to every subscriber in the same
//! process, tagged with the topic they were published on. It is designed to
//! be shared via `Arc<EventBus>`.

use async_trait::async_trait;
use concord_store::models::ReconciliationEvent;
use tokio::sync::broadcast;

use crate::broker::{Broker, BrokerError};

// ---------------------------------------------------------------------------
// BrokerMessage
// ---------------------------------------------------------------------------

/// One published event together with its topic.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    pub event: ReconciliationEvent,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`BrokerMessage`].
pub struct EventBus {
    sender: broadcast::Sender<BrokerMessage>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`. Dropped
    /// messages remain recoverable from the event log.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every message published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerMessage> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl Broker for EventBus {
    async fn publish(&self, topic: &str, event: &ReconciliationEvent) -> Result<(), BrokerError> {
        let message = BrokerMessage {
            topic: topic.to_string(),
            event: event.clone(),
        };
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
