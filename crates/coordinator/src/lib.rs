//! Concord coordinator: locks, presence, and event reconciliation for
//! resources shared by many concurrently connected actors.
//!
//! The transport layer (WebSocket or HTTP handlers, not part of this crate)
//! calls the [`Coordinator`] on behalf of an actor and broadcasts the
//! [`Notification`](concord_core::collaboration::Notification) values it gets
//! back to the other actors attached to the same resource.

pub mod background;
pub mod config;
pub mod error;
pub mod facade;
pub mod lock;
pub mod metrics;
pub mod presence;

pub use config::CoordinatorConfig;
pub use error::{CoordError, CoordResult, ErrorKind};
pub use facade::{AttachSnapshot, Coordinator, Notified, Reported};
pub use lock::{
    AcquireOutcome, AdministrativeOverride, LockManager, ReleaseOutcome, RenewOutcome,
};
pub use metrics::MetricsSnapshot;
pub use presence::PresenceTracker;
