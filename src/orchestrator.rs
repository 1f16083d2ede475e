use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::ResultCache;
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::gateway::{run_gateway, GatewayState};
use crate::pool::{HealthMonitor, WorkerPool};
use crate::scheduler::{Dispatcher, JobQueue};
use crate::worker::{HttpWorkerClient, WorkerClient};

/// Owns every shared component and the background tasks driving them.
///
/// Nothing here is global: the queue, pool, cache and worker client are
/// built once and handed out as `Arc`s to the dispatch loops, the health
/// monitor and the gateway.
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    queue: Arc<JobQueue>,
    pool: Arc<WorkerPool>,
    cache: Arc<ResultCache>,
    client: Arc<dyn WorkerClient>,
    shutdown: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Orchestrator {
    /// Build an orchestrator that talks to real device agents over HTTP.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let client = HttpWorkerClient::new(
            config.health_check_timeout,
            config.dispatch.extraction_timeout,
            config.proxy_timeout,
        )?;
        Self::with_client(config, Arc::new(client))
    }

    pub fn with_client(config: OrchestratorConfig, client: Arc<dyn WorkerClient>) -> Result<Self> {
        config.validate()?;

        let pool = WorkerPool::new(&config.worker_urls, client.clone())?;
        let cache = ResultCache::new(&config.cache)?;

        Ok(Self {
            config: Arc::new(config),
            queue: Arc::new(JobQueue::new()),
            pool: Arc::new(pool),
            cache: Arc::new(cache),
            client,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    pub fn gateway_state(&self) -> GatewayState {
        GatewayState {
            queue: self.queue.clone(),
            pool: self.pool.clone(),
            cache: self.cache.clone(),
            client: self.client.clone(),
            config: self.config.clone(),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// True between a successful `start` and the following `stop`.
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Spawn the dispatch loops (`dispatch-1..=N`) and the health monitor.
    /// Calling this on a running or stopped orchestrator does nothing.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            tracing::warn!("Orchestrator already started");
            return;
        }
        if self.shutdown.is_cancelled() {
            tracing::warn!("Orchestrator already stopped, not restarting");
            return;
        }

        let dispatcher = Dispatcher::new(
            self.queue.clone(),
            self.pool.clone(),
            self.cache.clone(),
            self.client.clone(),
            self.config.dispatch.clone(),
        );

        for index in 1..=self.config.dispatch.workers {
            let name = format!("dispatch-{index}");
            let span = tracing::info_span!("dispatch", index);
            let handle = tokio::spawn(
                dispatcher
                    .clone()
                    .run(index, self.shutdown.clone())
                    .instrument(span),
            );
            self.tasks.push((name, handle));
        }

        let monitor = HealthMonitor::new(
            self.pool.clone(),
            self.cache.clone(),
            self.config.health_check_interval,
        );
        let handle = tokio::spawn(
            monitor
                .run(self.shutdown.clone())
                .instrument(tracing::info_span!("health_monitor")),
        );
        self.tasks.push(("health-monitor".to_string(), handle));

        tracing::info!(
            workers = self.config.worker_urls.len(),
            dispatchers = self.config.dispatch.workers,
            "Orchestrator started"
        );
    }

    /// Signal every background task and wait for all of them to exit.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();

        for (name, handle) in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(task = %name, error = %e, "Background task ended abnormally");
            }
        }

        tracing::info!("Orchestrator stopped");
    }

    /// Start background tasks, serve the gateway until `shutdown` fires, then
    /// stop everything.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        self.start();

        let state = self.gateway_state();
        let result = run_gateway(self.config.listen_addr, state, shutdown).await;

        self.stop().await;
        result
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
