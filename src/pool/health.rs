use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::pool::WorkerPool;

/// Periodically probes every worker and sweeps expired results.
pub struct HealthMonitor {
    pool: Arc<WorkerPool>,
    cache: Arc<ResultCache>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(pool: Arc<WorkerPool>, cache: Arc<ResultCache>, interval: Duration) -> Self {
        Self {
            pool,
            cache,
            interval,
        }
    }

    /// One probe-and-sweep pass.
    pub async fn tick(&self) {
        let healthy = self.pool.refresh_health().await;
        let total = self.pool.len().await;
        let swept = self.cache.sweep_expired().await;
        tracing::debug!(healthy, total, swept, "Health check pass finished");
    }

    /// Run until `shutdown` is cancelled. The first pass happens immediately.
    /// A failed pass never stops later ones.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            // A panicking pass is logged and the next interval still runs.
            tokio::select! {
                _ = shutdown.cancelled() => break,
                pass = AssertUnwindSafe(self.tick()).catch_unwind() => {
                    if pass.is_err() {
                        tracing::error!("Health check pass panicked");
                    }
                }
            }
        }

        tracing::info!("Health monitor stopped");
    }
}
