//! Periodic logging of coordinator counters.

use std::time::Duration;

use super::IntervalTask;
use crate::facade::Coordinator;
use crate::metrics::MetricsSnapshot;

/// Logs a [`MetricsSnapshot`] every interval until stopped.
///
/// Optional: the daemon only starts it when
/// `METRICS_SAMPLE_INTERVAL_SECS` is non-zero.
pub struct MetricsSampler {
    task: IntervalTask,
}

impl MetricsSampler {
    pub fn start(coordinator: Coordinator, interval: Duration) -> Self {
        let mut previous = MetricsSnapshot::default();
        let task = IntervalTask::spawn("metrics-sampler", interval, move || {
            let current = coordinator.metrics();
            log_sample(&previous, &current);
            previous = current;
            std::future::ready(())
        });
        Self { task }
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) {
        self.task.stop().await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn log_sample(previous: &MetricsSnapshot, current: &MetricsSnapshot) {
    tracing::info!(
        locks_acquired = current.locks_acquired,
        locks_denied = current.locks_denied,
        locks_released = current.locks_released,
        presence_joined = current.presence_joined,
        heartbeats = current.heartbeats,
        events_published = current.events_published,
        events_reconciled = current.events_reconciled,
        dispatch_failed = current.dispatch.failed,
        transient_errors = current.transient_errors,
        "Coordinator metrics"
    );

    let new_failures = current.dispatch.failed.saturating_sub(previous.dispatch.failed);
    if new_failures > 0 {
        tracing::warn!(new_failures, "Broker dispatch failures since last sample");
    }
}
