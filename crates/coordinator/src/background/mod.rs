//! Background services owned by the process lifecycle.
//!
//! Each service is started explicitly, runs on a fixed interval, and stops
//! when its [`CancellationToken`] is cancelled. Nothing here is required for
//! correctness: the managers stay correct with every service disabled.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod metrics_sampler;
pub mod presence_sweep;

pub use metrics_sampler::MetricsSampler;
pub use presence_sweep::PresenceSweeper;

/// How long `stop()` waits for a service loop to finish its current tick.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A spawned interval loop plus the token that ends it.
struct IntervalTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl IntervalTask {
    /// Spawn a loop that awaits `tick()` every `period` until cancelled.
    ///
    /// The first tick fires one full period after start.
    fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(
                service = name,
                interval_secs = period.as_secs(),
                "Background service started"
            );
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!(service = name, "Background service stopping");
                        break;
                    }
                    _ = interval.tick() => tick().await,
                }
            }
        });

        Self {
            name,
            cancel,
            handle,
        }
    }

    async fn stop(self) {
        self.cancel.cancel();
        match tokio::time::timeout(STOP_TIMEOUT, self.handle).await {
            Ok(Ok(())) => tracing::info!(service = self.name, "Background service stopped"),
            Ok(Err(e)) => {
                tracing::error!(service = self.name, error = %e, "Background service panicked")
            }
            Err(_) => {
                tracing::warn!(service = self.name, "Background service did not stop in time")
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
