use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use apk_orchestrator::config::{CacheConfig, DispatchConfig, OrchestratorConfig};
use apk_orchestrator::shutdown::install_shutdown_handler;
use apk_orchestrator::Orchestrator;

#[derive(Parser, Debug)]
#[command(name = "apk-orchestrator")]
#[command(version)]
#[command(about = "Load balancer and job queue for multi-device APK extraction")]
struct Args {
    /// Port to serve the HTTP API on
    #[arg(long, env = "PORT", default_value = "8001")]
    port: u16,

    /// Device agent base URLs (comma-separated)
    #[arg(
        long,
        env = "CONTAINER_URLS",
        default_value = "http://localhost:5001,http://localhost:5002,http://localhost:5003"
    )]
    container_urls: String,

    /// Number of concurrent dispatch loops
    #[arg(long, env = "WORKER_THREADS", default_value = "3")]
    worker_threads: usize,

    /// Timeout for a single extraction call, in seconds
    #[arg(long, env = "EXTRACTION_TIMEOUT", default_value = "180")]
    extraction_timeout: u64,

    /// Seconds between health check passes
    #[arg(long, env = "HEALTH_CHECK_INTERVAL", default_value = "60")]
    health_check_interval: u64,

    /// Timeout for a single health probe, in seconds
    #[arg(long, env = "HEALTH_CHECK_TIMEOUT", default_value = "10")]
    health_check_timeout: u64,

    /// Timeout for proxied download/list calls, in seconds
    #[arg(long, env = "PROXY_TIMEOUT", default_value = "60")]
    proxy_timeout: u64,

    /// Delay between attempts to find a free worker, in milliseconds
    #[arg(long, env = "ACQUIRE_POLL_INTERVAL_MS", default_value = "2000")]
    acquire_poll_interval_ms: u64,

    /// Attempts before a job fails with "no worker available"
    #[arg(long, env = "MAX_ACQUIRE_ATTEMPTS", default_value = "60")]
    max_acquire_attempts: u32,

    /// Seconds a finished job's result stays available
    #[arg(long, env = "RESULT_EXPIRATION", default_value = "3600")]
    result_expiration: u64,

    /// Maximum number of cached results
    #[arg(long, env = "MAX_CACHED_RESULTS", default_value = "1000")]
    max_cached_results: usize,

    /// Only reuse completed results newer than this many seconds
    /// (defaults to the full result expiration)
    #[arg(long, env = "DEDUP_WINDOW")]
    dedup_window: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<OrchestratorConfig, Box<dyn std::error::Error>> {
        let listen_addr: SocketAddr = format!("0.0.0.0:{}", self.port).parse()?;

        Ok(OrchestratorConfig {
            listen_addr,
            worker_urls: OrchestratorConfig::parse_worker_urls(&self.container_urls),
            dispatch: DispatchConfig {
                workers: self.worker_threads,
                acquire_poll_interval: Duration::from_millis(self.acquire_poll_interval_ms),
                max_acquire_attempts: self.max_acquire_attempts,
                extraction_timeout: Duration::from_secs(self.extraction_timeout),
            },
            cache: CacheConfig {
                ttl: Duration::from_secs(self.result_expiration),
                max_entries: self.max_cached_results,
                dedup_window: self.dedup_window.map(Duration::from_secs),
            },
            health_check_interval: Duration::from_secs(self.health_check_interval),
            health_check_timeout: Duration::from_secs(self.health_check_timeout),
            proxy_timeout: Duration::from_secs(self.proxy_timeout),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        workers = ?config.worker_urls,
        dispatchers = config.dispatch.workers,
        extraction_timeout_secs = config.dispatch.extraction_timeout.as_secs(),
        result_ttl_secs = config.cache.ttl.as_secs(),
        "Starting apk-orchestrator"
    );

    let orchestrator = Orchestrator::new(config)?;
    let shutdown = install_shutdown_handler();
    orchestrator.run(shutdown).await?;

    Ok(())
}
