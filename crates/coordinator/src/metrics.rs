//! Operation counters kept by the [`Coordinator`](crate::Coordinator).
//!
//! Counters are process-local and monotonic. The metrics sampler logs a
//! snapshot periodically; nothing here is persisted.

use std::sync::atomic::{AtomicU64, Ordering};

use concord_events::DispatchSnapshot;
use serde::Serialize;

use crate::error::{CoordError, ErrorKind};

#[derive(Debug, Default)]
pub(crate) struct OpCounters {
    pub locks_acquired: AtomicU64,
    pub locks_denied: AtomicU64,
    pub locks_released: AtomicU64,
    pub locks_renewed: AtomicU64,
    pub locks_overridden: AtomicU64,
    pub presence_joined: AtomicU64,
    pub presence_left: AtomicU64,
    pub heartbeats: AtomicU64,
    pub heartbeats_ignored: AtomicU64,
    pub events_published: AtomicU64,
    pub events_reconciled: AtomicU64,
    pub transient_errors: AtomicU64,
    pub other_errors: AtomicU64,
}

impl OpCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: &CoordError) {
        match err.kind() {
            ErrorKind::Transient => Self::incr(&self.transient_errors),
            _ => Self::incr(&self.other_errors),
        }
    }

    pub fn snapshot(&self, dispatch: DispatchSnapshot) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            locks_acquired: load(&self.locks_acquired),
            locks_denied: load(&self.locks_denied),
            locks_released: load(&self.locks_released),
            locks_renewed: load(&self.locks_renewed),
            locks_overridden: load(&self.locks_overridden),
            presence_joined: load(&self.presence_joined),
            presence_left: load(&self.presence_left),
            heartbeats: load(&self.heartbeats),
            heartbeats_ignored: load(&self.heartbeats_ignored),
            events_published: load(&self.events_published),
            events_reconciled: load(&self.events_reconciled),
            transient_errors: load(&self.transient_errors),
            other_errors: load(&self.other_errors),
            dispatch,
        }
    }
}

/// Point-in-time copy of the coordinator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub locks_acquired: u64,
    pub locks_denied: u64,
    pub locks_released: u64,
    pub locks_renewed: u64,
    pub locks_overridden: u64,
    pub presence_joined: u64,
    pub presence_left: u64,
    pub heartbeats: u64,
    /// Heartbeats or status updates for actors with no presence record.
    pub heartbeats_ignored: u64,
    pub events_published: u64,
    pub events_reconciled: u64,
    /// Store timeouts and unreachable backends.
    pub transient_errors: u64,
    /// Validation, data, and other non-retryable failures.
    pub other_errors: u64,
    pub dispatch: DispatchSnapshot,
}
