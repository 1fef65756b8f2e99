//! Periodic progress reporting.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::TaskRegistry;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Read-only observer that logs batch progress on a fixed cadence.
pub struct StatusReporter;

impl StatusReporter {
    /// Spawn the reporter loop.
    ///
    /// The loop ends once every task is terminal or `stop` is cancelled.
    pub fn spawn(registry: Arc<TaskRegistry>, interval: Duration, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        Self::report(&registry);
                        if registry.all_done() {
                            break;
                        }
                    }
                }
            }
            debug!("Status reporter stopped");
        })
    }

    /// Log one progress line plus one debug line per task.
    pub fn report(registry: &TaskRegistry) {
        let counts = registry.counts();
        info!(
            total = counts.total,
            finished = counts.finished(),
            progress_pct = (counts.progress() * 100.0).round() as u64,
            "Batch progress: {}", counts
        );

        for snapshot in registry.snapshots() {
            debug!(task_key = %snapshot.key, "{}", snapshot);
        }
    }
}
