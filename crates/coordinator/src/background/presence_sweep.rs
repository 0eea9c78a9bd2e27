//! Periodic cleanup of presence membership indexes.
//!
//! Readers already drop index entries whose record expired, so this only
//! matters for resources nobody lists for a long time. Disabled by default.

use std::time::Duration;

use super::IntervalTask;
use crate::presence::PresenceTracker;

pub struct PresenceSweeper {
    task: IntervalTask,
}

impl PresenceSweeper {
    pub fn start(presence: PresenceTracker, interval: Duration) -> Self {
        let task = IntervalTask::spawn("presence-sweeper", interval, move || {
            let presence = presence.clone();
            async move {
                if let Err(e) = sweep(&presence).await {
                    tracing::error!(error = %e, "Presence sweep failed");
                }
            }
        });
        Self { task }
    }

    pub async fn stop(self) {
        self.task.stop().await;
    }
}

/// Prune every tracked resource. Returns the number of entries dropped.
pub async fn sweep(presence: &PresenceTracker) -> crate::error::CoordResult<usize> {
    let resources = presence.tracked_resources().await?;
    let mut dropped = 0;
    for resource_id in &resources {
        match presence.prune(resource_id).await {
            Ok(n) => dropped += n,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    resource_id = %resource_id,
                    "Could not prune presence index"
                );
            }
        }
    }

    if dropped > 0 {
        tracing::info!(
            dropped,
            resources = resources.len(),
            "Presence sweep dropped stale entries"
        );
    } else {
        tracing::debug!(resources = resources.len(), "Presence sweep found nothing stale");
    }
    Ok(dropped)
}
