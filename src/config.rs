use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

/// Result cache sizing and expiry.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a terminal job result stays readable.
    pub ttl: Duration,
    /// Maximum number of results held at once. The least recently touched
    /// entry is evicted when a new one would exceed this.
    pub max_entries: usize,
    /// Only completed results cached within this window answer a duplicate
    /// submission. `None` means any unexpired result does.
    pub dedup_window: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
            dedup_window: None,
        }
    }
}

/// Settings shared by every dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of concurrent dispatch loops.
    pub workers: usize,
    /// Sleep between attempts to acquire a free worker.
    pub acquire_poll_interval: Duration,
    /// Attempts before a job is failed with "no worker available".
    pub max_acquire_attempts: u32,
    /// Upper bound on a single extract call.
    pub extraction_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            acquire_poll_interval: Duration::from_secs(2),
            max_acquire_attempts: 60,
            extraction_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub listen_addr: SocketAddr,
    /// Base URLs of the device agents, in registration order.
    pub worker_urls: Vec<String>,
    pub dispatch: DispatchConfig,
    pub cache: CacheConfig,
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
    /// Timeout for download and list calls proxied to workers.
    pub proxy_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:8001"
                .parse()
                .expect("default listen address is valid"),
            worker_urls: vec![
                "http://localhost:5001".to_string(),
                "http://localhost:5002".to_string(),
                "http://localhost:5003".to_string(),
            ],
            dispatch: DispatchConfig::default(),
            cache: CacheConfig::default(),
            health_check_interval: Duration::from_secs(60),
            health_check_timeout: Duration::from_secs(10),
            proxy_timeout: Duration::from_secs(60),
        }
    }
}

impl OrchestratorConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            worker_urls: Vec::new(),
            ..Default::default()
        }
    }

    pub fn with_worker(mut self, url: impl Into<String>) -> Self {
        self.worker_urls.push(url.into());
        self
    }

    pub fn with_dispatch_workers(mut self, workers: usize) -> Self {
        self.dispatch.workers = workers;
        self
    }

    /// Parse a comma-separated list of worker URLs, skipping blanks and
    /// trailing slashes.
    pub fn parse_worker_urls(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_urls.is_empty() {
            return Err(OrchestratorError::Config(
                "at least one worker URL is required".to_string(),
            ));
        }
        if self.dispatch.workers == 0 {
            return Err(OrchestratorError::Config(
                "dispatch worker count must be at least 1".to_string(),
            ));
        }
        if self.dispatch.max_acquire_attempts == 0 {
            return Err(OrchestratorError::Config(
                "max acquire attempts must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(OrchestratorError::Config(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        if self.cache.ttl.is_zero() {
            return Err(OrchestratorError::Config(
                "result TTL must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
