use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::{JobResult, ResultCache};
use crate::config::DispatchConfig;
use crate::error::{OrchestratorError, WorkerCallError};
use crate::pool::{WorkerPool, WorkerRecord};
use crate::scheduler::{Job, JobQueue, JobStatus};
use crate::worker::WorkerClient;

pub const SHUTDOWN_REASON: &str = "Orchestrator shutting down";

enum AcquireError {
    Exhausted(u32),
    Shutdown,
}

/// One dispatch loop's view of the shared orchestrator state.
///
/// Cloned once per loop; all clones share the same queue, pool, cache and
/// client.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<JobQueue>,
    pool: Arc<WorkerPool>,
    cache: Arc<ResultCache>,
    client: Arc<dyn WorkerClient>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<JobQueue>,
        pool: Arc<WorkerPool>,
        cache: Arc<ResultCache>,
        client: Arc<dyn WorkerClient>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            queue,
            pool,
            cache,
            client,
            config,
        }
    }

    /// Take jobs until `shutdown` is cancelled.
    pub async fn run(self, index: usize, shutdown: CancellationToken) {
        tracing::info!(dispatcher = index, "Dispatch loop started");

        while let Some(job) = self.queue.take(&shutdown).await {
            self.process(job, &shutdown).await;
        }

        tracing::info!(dispatcher = index, "Dispatch loop stopped");
    }

    /// Drive one job to a terminal cache entry and return its status.
    ///
    /// 1. Acquire a worker, retrying every poll interval up to the attempt
    ///    ceiling
    /// 2. Call the worker's extract endpoint under the extraction timeout
    /// 3. Write the outcome to the cache, then release the worker
    pub async fn process(&self, job: Job, shutdown: &CancellationToken) -> JobStatus {
        tracing::info!(job_id = %job.id, package = %job.request_key, "Processing job");

        let worker = match self.acquire(shutdown).await {
            Ok(worker) => worker,
            Err(AcquireError::Exhausted(attempts)) => {
                let reason = OrchestratorError::NoWorkerAvailable(attempts).to_string();
                tracing::error!(job_id = %job.id, attempts, "No worker available for job");
                self.cache
                    .put(job.id, JobResult::failed(job.request_key, None, reason))
                    .await;
                return JobStatus::Failed;
            }
            Err(AcquireError::Shutdown) => {
                tracing::warn!(job_id = %job.id, "Job abandoned during shutdown");
                self.cache
                    .put(job.id, JobResult::failed(job.request_key, None, SHUTDOWN_REASON))
                    .await;
                return JobStatus::Failed;
            }
        };

        tracing::info!(job_id = %job.id, worker_id = %worker.id, "Extracting");

        match self.extract(&job, &worker, shutdown).await {
            Ok(data) => {
                self.cache
                    .put(
                        job.id.clone(),
                        JobResult::completed(job.request_key, worker.id.clone(), data),
                    )
                    .await;
                self.pool.release(&worker.id, true).await;
                tracing::info!(job_id = %job.id, worker_id = %worker.id, "Job completed");
                JobStatus::Completed
            }
            Err(reason) => {
                tracing::warn!(
                    job_id = %job.id,
                    worker_id = %worker.id,
                    error = %reason,
                    "Job failed"
                );
                self.cache
                    .put(
                        job.id,
                        JobResult::failed(job.request_key, Some(worker.id.clone()), reason),
                    )
                    .await;
                self.pool.release(&worker.id, false).await;
                JobStatus::Failed
            }
        }
    }

    async fn acquire(&self, shutdown: &CancellationToken) -> Result<WorkerRecord, AcquireError> {
        let attempts = self.config.max_acquire_attempts;

        for attempt in 1..=attempts {
            if let Some(worker) = self.pool.acquire().await {
                return Ok(worker);
            }
            if attempt == attempts {
                break;
            }

            tracing::debug!(attempt, attempts, "No worker free, waiting");
            tokio::select! {
                _ = shutdown.cancelled() => return Err(AcquireError::Shutdown),
                _ = tokio::time::sleep(self.config.acquire_poll_interval) => {}
            }
        }

        Err(AcquireError::Exhausted(attempts))
    }

    /// Run the extract call in its own task so a panicking client surfaces as
    /// a failed job instead of killing the dispatch loop.
    async fn extract(
        &self,
        job: &Job,
        worker: &WorkerRecord,
        shutdown: &CancellationToken,
    ) -> Result<Value, String> {
        let client = self.client.clone();
        let address = worker.address.clone();
        let request_key = job.request_key.clone();
        let mut call = tokio::spawn(async move { client.extract(&address, &request_key).await });

        let timeout = self.config.extraction_timeout;
        let joined = tokio::select! {
            _ = shutdown.cancelled() => None,
            joined = tokio::time::timeout(timeout, &mut call) => Some(joined),
        };

        let Some(joined) = joined else {
            call.abort();
            return Err(SHUTDOWN_REASON.to_string());
        };

        match joined {
            Err(_) => {
                call.abort();
                Err(format!("Extraction timeout ({}s)", timeout.as_secs()))
            }
            Ok(Err(join_error)) => Err(format!("Extraction task failed: {join_error}")),
            Ok(Ok(Err(e))) => Err(failure_reason(e)),
            Ok(Ok(Ok(data))) => Ok(data),
        }
    }
}

/// Message stored for a failed extract call. Agent-supplied error messages are
/// passed through as-is.
fn failure_reason(error: WorkerCallError) -> String {
    match error {
        WorkerCallError::Status { message, .. } => message,
        WorkerCallError::Timeout(secs) => format!("Extraction timeout ({secs}s)"),
        other => other.to_string(),
    }
}
