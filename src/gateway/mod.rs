//! HTTP surface of the orchestrator.
//!
//! Handlers are thin: they validate input, then talk to the queue, cache and
//! pool through their public operations. Anything other than a validation or
//! not-found error is logged and answered with a generic 500.

pub mod validation;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::{CacheEntry, Outcome, ResultCache};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result, WorkerCallError};
use crate::pool::{PoolStats, WorkerPool, WorkerRecord};
use crate::scheduler::{Job, JobId, JobQueue, JobStatus};
use crate::worker::WorkerClient;

pub use validation::{validate_filename, validate_package_name};

const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

#[derive(Clone)]
pub struct GatewayState {
    pub queue: Arc<JobQueue>,
    pub pool: Arc<WorkerPool>,
    pub cache: Arc<ResultCache>,
    pub client: Arc<dyn WorkerClient>,
    pub config: Arc<OrchestratorConfig>,
}

#[derive(Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    package: String,
}

#[derive(Serialize)]
struct QueuedResponse {
    job_id: JobId,
    status: JobStatus,
    queue_position: usize,
    package: String,
}

#[derive(Serialize)]
struct CachedResponse {
    job_id: JobId,
    status: JobStatus,
    cached: bool,
    worker_id: Option<String>,
    data: Value,
}

#[derive(Serialize)]
struct StatusResponse {
    job_id: JobId,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_size: Option<usize>,
}

impl StatusResponse {
    fn from_entry(job_id: JobId, entry: CacheEntry) -> Self {
        let status = entry.result.status();
        let (data, error) = match entry.result.outcome {
            Outcome::Completed(data) => (Some(data), None),
            Outcome::Failed(error) => (None, Some(error)),
        };
        Self {
            job_id,
            status,
            worker_id: entry.result.worker_id,
            data,
            error,
            cached_at: Some(entry.cached_at),
            queue_size: None,
        }
    }
}

#[derive(Serialize)]
struct PackagesResponse {
    packages: Vec<Value>,
    total_packages: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    orchestrator: &'static str,
    containers: Vec<WorkerRecord>,
    healthy_containers: usize,
    available_containers: usize,
    total_containers: usize,
    queue_size: usize,
    cached_results: usize,
    stats: PoolStats,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct ConfigSummary {
    worker_threads: usize,
    extraction_timeout: u64,
    result_expiration: u64,
    max_cached_results: usize,
}

#[derive(Serialize)]
struct StatsResponse {
    queue_size: usize,
    cached_results: usize,
    containers: Vec<WorkerRecord>,
    jobs: PoolStats,
    config: ConfigSummary,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            OrchestratorError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            OrchestratorError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => {
                tracing::error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub fn router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/extract", post(submit_handler))
        .route("/status/:job_id", get(status_handler))
        .route("/download/:package/:filename", get(download_handler))
        .route("/packages", get(packages_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the gateway on `addr` until `shutdown` is cancelled.
pub async fn run_gateway(
    addr: SocketAddr,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind gateway");
        e
    })?;

    tracing::info!(addr = %addr, "Gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn submit_handler(
    State(state): State<GatewayState>,
    payload: Option<Json<SubmitRequest>>,
) -> Result<Response> {
    let raw = payload.map(|Json(body)| body.package).unwrap_or_default();
    let package = validate_package_name(&raw)?;

    if let Some((job_id, entry)) = state.cache.find_completed(&package).await {
        if let Outcome::Completed(data) = entry.result.outcome {
            tracing::info!(job_id = %job_id, package = %package, "Returning cached result");
            let body = CachedResponse {
                job_id,
                status: JobStatus::Completed,
                cached: true,
                worker_id: entry.result.worker_id,
                data,
            };
            return Ok((StatusCode::OK, Json(body)).into_response());
        }
    }

    let job = Job::new(package.clone());
    let job_id = job.id.clone();
    let queue_position = state.queue.submit(job);
    tracing::info!(job_id = %job_id, queue_size = queue_position, "Queued job");

    let body = QueuedResponse {
        job_id,
        status: JobStatus::Queued,
        queue_position,
        package,
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn status_handler(
    State(state): State<GatewayState>,
    Path(job_id): Path<String>,
) -> Json<StatusResponse> {
    let job_id = JobId::from(job_id);

    match state.cache.get(&job_id).await {
        Some(entry) => Json(StatusResponse::from_entry(job_id, entry)),
        // Queued and in-flight jobs are indistinguishable from here.
        None => Json(StatusResponse {
            job_id,
            status: JobStatus::Processing,
            worker_id: None,
            data: None,
            error: None,
            cached_at: None,
            queue_size: Some(state.queue.len()),
        }),
    }
}

async fn download_handler(
    State(state): State<GatewayState>,
    Path((package, filename)): Path<(String, String)>,
) -> Result<Response> {
    let package = validate_package_name(&package)
        .map_err(|_| OrchestratorError::Validation("Invalid package name".to_string()))?;
    validate_filename(&filename)?;

    let workers = healthy_workers(&state.pool).await;
    let found = first_success(workers, |worker| {
        let client = state.client.clone();
        let package = package.clone();
        let filename = filename.clone();
        async move { client.download(&worker.address, &package, &filename).await }
    })
    .await;

    let Some((worker_id, bytes)) = found else {
        return Err(OrchestratorError::NotFound(
            "File not found in any container".to_string(),
        ));
    };

    tracing::info!(worker_id = %worker_id, package = %package, filename = %filename, "Download served");
    let headers = [
        (header::CONTENT_TYPE, APK_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={package}_{filename}"),
        ),
    ];
    Ok((StatusCode::OK, headers, bytes).into_response())
}

async fn packages_handler(State(state): State<GatewayState>) -> Json<PackagesResponse> {
    let workers = healthy_workers(&state.pool).await;
    let packages = first_success(workers, |worker| {
        let client = state.client.clone();
        async move { client.list(&worker.address).await }
    })
    .await
    .map(|(_, items)| items)
    .unwrap_or_default();

    Json(PackagesResponse {
        total_packages: packages.len(),
        packages,
    })
}

async fn health_handler(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let containers = state.pool.snapshot().await;

    Json(HealthResponse {
        orchestrator: "healthy",
        healthy_containers: state.pool.healthy_count().await,
        available_containers: state.pool.available_count().await,
        total_containers: containers.len(),
        containers,
        queue_size: state.queue.len(),
        cached_results: state.cache.len().await,
        stats: state.pool.stats().await,
        timestamp: Utc::now(),
    })
}

async fn stats_handler(State(state): State<GatewayState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        queue_size: state.queue.len(),
        cached_results: state.cache.len().await,
        containers: state.pool.snapshot().await,
        jobs: state.pool.stats().await,
        config: ConfigSummary {
            worker_threads: state.config.dispatch.workers,
            extraction_timeout: state.config.dispatch.extraction_timeout.as_secs(),
            result_expiration: state.cache.ttl().as_secs(),
            max_cached_results: state.cache.capacity(),
        },
    })
}

async fn not_found_handler() -> OrchestratorError {
    OrchestratorError::NotFound("Endpoint not found".to_string())
}

async fn healthy_workers(pool: &WorkerPool) -> Vec<WorkerRecord> {
    pool.snapshot()
        .await
        .into_iter()
        .filter(|w| w.healthy)
        .collect()
}

/// Issue `call` against every worker concurrently and return the first
/// success along with the worker's id. Remaining calls are dropped.
async fn first_success<T, F, Fut>(workers: Vec<WorkerRecord>, call: F) -> Option<(String, T)>
where
    F: Fn(WorkerRecord) -> Fut,
    Fut: Future<Output = std::result::Result<T, WorkerCallError>>,
{
    let mut calls: FuturesUnordered<_> = workers
        .into_iter()
        .map(|worker| {
            let worker_id = worker.id.clone();
            let fut = call(worker);
            async move { (worker_id, fut.await) }
        })
        .collect();

    while let Some((worker_id, result)) = calls.next().await {
        match result {
            Ok(value) => return Some((worker_id, value)),
            Err(WorkerCallError::NotFound) => {
                tracing::debug!(worker_id = %worker_id, "Not found on worker");
            }
            Err(e) => {
                tracing::warn!(worker_id = %worker_id, error = %e, "Proxy call failed");
            }
        }
    }

    None
}
