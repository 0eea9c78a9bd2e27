//! Concord event log and broker adapters.
//!
//! This crate provides the reconciliation side of the coordination core:
//!
//! - [`EventLog`]: durable, per-resource, append-only record of mutation
//!   events with a processed flag, stored through the key-value store.
//! - [`Broker`]: best-effort fan-out of freshly recorded events.
//! - [`EventBus`]: in-process broker backed by `tokio::sync::broadcast`.
//! - [`RedisBroker`]: broker that publishes on Redis pub/sub channels.

pub mod broker;
pub mod bus;
pub mod event_log;
pub mod redis_broker;

pub use broker::{create_broker, topic_for, Broker, BrokerError, SharedBroker};
pub use bus::{BrokerMessage, EventBus};
pub use event_log::{Clock, DispatchSnapshot, EventError, EventLog};
pub use redis_broker::RedisBroker;
