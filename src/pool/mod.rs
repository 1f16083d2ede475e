//! Pool of single-capacity device agents.
//!
//! [`WorkerPool`] is the only place worker busy/health state changes. Scan and
//! mark in [`WorkerPool::acquire`] and the update in [`WorkerPool::release`]
//! happen under one lock, so two callers can never hold the same worker.

pub mod health;
pub mod record;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::worker::WorkerClient;

pub use health::HealthMonitor;
pub use record::WorkerRecord;

/// Totals over every release since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total_jobs: u64,
    pub successful_jobs: u64,
    pub failed_jobs: u64,
}

#[derive(Debug)]
struct PoolState {
    workers: Vec<WorkerRecord>,
    /// Index the next acquire scan starts from.
    cursor: usize,
    stats: PoolStats,
}

pub struct WorkerPool {
    state: Mutex<PoolState>,
    client: Arc<dyn WorkerClient>,
}

impl WorkerPool {
    pub fn new(addresses: &[String], client: Arc<dyn WorkerClient>) -> Result<Self> {
        if addresses.is_empty() {
            return Err(OrchestratorError::Config(
                "worker pool needs at least one address".to_string(),
            ));
        }

        let workers = addresses
            .iter()
            .enumerate()
            .map(|(i, addr)| WorkerRecord::new(i, addr.clone()))
            .collect();

        Ok(Self {
            state: Mutex::new(PoolState {
                workers,
                cursor: 0,
                stats: PoolStats::default(),
            }),
            client,
        })
    }

    /// Claim the first healthy idle worker, scanning round-robin from the
    /// worker after the last one handed out. Returns `None` without waiting
    /// if every worker is busy or unhealthy.
    pub async fn acquire(&self) -> Option<WorkerRecord> {
        let mut state = self.state.lock().await;
        let count = state.workers.len();

        for offset in 0..count {
            let idx = (state.cursor + offset) % count;
            if !state.workers[idx].is_available() {
                continue;
            }

            state.workers[idx].busy = true;
            state.cursor = (idx + 1) % count;
            let worker = state.workers[idx].clone();
            tracing::info!(worker_id = %worker.id, "Assigned worker");
            return Some(worker);
        }

        None
    }

    /// Return a worker to the pool and record the job outcome.
    ///
    /// Must be called exactly once per successful [`acquire`](Self::acquire);
    /// a second call double-counts.
    pub async fn release(&self, worker_id: &str, success: bool) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(worker) = state.workers.iter_mut().find(|w| w.id == worker_id) else {
            tracing::warn!(worker_id, "Release for unknown worker ignored");
            return;
        };

        worker.busy = false;
        if success {
            worker.jobs_completed += 1;
        } else {
            worker.jobs_failed += 1;
        }

        let stats = &mut state.stats;
        stats.total_jobs += 1;
        if success {
            stats.successful_jobs += 1;
        } else {
            stats.failed_jobs += 1;
        }

        tracing::info!(worker_id, success, "Released worker");
    }

    /// Probe every worker concurrently and record the results. Returns the
    /// number of workers that answered healthy.
    ///
    /// The lock is not held while probing, so acquire/release proceed while
    /// slow agents time out.
    pub async fn refresh_health(&self) -> usize {
        let targets: Vec<(String, String)> = {
            let state = self.state.lock().await;
            state
                .workers
                .iter()
                .map(|w| (w.id.clone(), w.address.clone()))
                .collect()
        };

        let probes = targets.into_iter().map(|(id, address)| {
            let client = self.client.clone();
            async move {
                let result = client.health(&address).await;
                (id, result)
            }
        });
        let results = futures::future::join_all(probes).await;

        let checked_at = Utc::now();
        let mut state = self.state.lock().await;
        let mut healthy = 0;

        for (id, result) in results {
            let Some(worker) = state.workers.iter_mut().find(|w| w.id == id) else {
                continue;
            };
            worker.last_health_check = Some(checked_at);
            match result {
                Ok(()) => {
                    if !worker.healthy {
                        tracing::info!(worker_id = %id, "Worker recovered");
                    }
                    worker.healthy = true;
                    healthy += 1;
                }
                Err(e) => {
                    tracing::warn!(worker_id = %id, error = %e, "Health check failed");
                    worker.healthy = false;
                }
            }
        }

        healthy
    }

    pub async fn snapshot(&self) -> Vec<WorkerRecord> {
        self.state.lock().await.workers.clone()
    }

    pub async fn stats(&self) -> PoolStats {
        self.state.lock().await.stats
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.workers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn healthy_count(&self) -> usize {
        let state = self.state.lock().await;
        state.workers.iter().filter(|w| w.healthy).count()
    }

    /// Workers that an `acquire` right now could hand out.
    pub async fn available_count(&self) -> usize {
        let state = self.state.lock().await;
        state.workers.iter().filter(|w| w.is_available()).count()
    }
}
