use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{OrchestratorError, WorkerCallError};

/// Calls made against a remote device agent.
///
/// `address` is the agent's base URL as registered in the pool. Every call is
/// bounded by a timeout chosen by the implementation.
#[async_trait]
pub trait WorkerClient: Send + Sync + 'static {
    /// Succeeds only if the agent reports itself ready.
    async fn health(&self, address: &str) -> Result<(), WorkerCallError>;

    /// Run one extraction and return the agent's opaque JSON payload.
    async fn extract(&self, address: &str, request_key: &str) -> Result<Value, WorkerCallError>;

    async fn download(
        &self,
        address: &str,
        request_key: &str,
        filename: &str,
    ) -> Result<Bytes, WorkerCallError>;

    async fn list(&self, address: &str) -> Result<Vec<Value>, WorkerCallError>;
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<Value>,
}

/// [`WorkerClient`] speaking the device agent's HTTP/JSON contract.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    http: reqwest::Client,
    health_timeout: Duration,
    extraction_timeout: Duration,
    proxy_timeout: Duration,
}

impl HttpWorkerClient {
    pub fn new(
        health_timeout: Duration,
        extraction_timeout: Duration,
        proxy_timeout: Duration,
    ) -> Result<Self, OrchestratorError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| OrchestratorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            health_timeout,
            extraction_timeout,
            proxy_timeout,
        })
    }

    fn map_err(e: reqwest::Error, timeout: Duration) -> WorkerCallError {
        if e.is_timeout() {
            WorkerCallError::Timeout(timeout.as_secs())
        } else {
            WorkerCallError::Transport(e.to_string())
        }
    }

    /// Turn a non-success response into a [`WorkerCallError::Status`],
    /// preferring the agent's `{"error": ...}` message when present.
    async fn status_error(response: reqwest::Response) -> WorkerCallError {
        let status = response.status().as_u16();
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "Unknown error".to_string());
        WorkerCallError::Status { status, message }
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn health(&self, address: &str) -> Result<(), WorkerCallError> {
        let response = self
            .http
            .get(format!("{address}/health"))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| Self::map_err(e, self.health_timeout))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(WorkerCallError::Status {
                status: response.status().as_u16(),
                message: "not ready".to_string(),
            })
        }
    }

    async fn extract(&self, address: &str, request_key: &str) -> Result<Value, WorkerCallError> {
        let response = self
            .http
            .post(format!("{address}/extract"))
            .json(&json!({ "key": request_key }))
            .timeout(self.extraction_timeout)
            .send()
            .await
            .map_err(|e| Self::map_err(e, self.extraction_timeout))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| WorkerCallError::InvalidResponse(e.to_string()))
    }

    async fn download(
        &self,
        address: &str,
        request_key: &str,
        filename: &str,
    ) -> Result<Bytes, WorkerCallError> {
        let response = self
            .http
            .get(format!("{address}/download/{request_key}/{filename}"))
            .timeout(self.proxy_timeout)
            .send()
            .await
            .map_err(|e| Self::map_err(e, self.proxy_timeout))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(WorkerCallError::NotFound);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .bytes()
            .await
            .map_err(|e| Self::map_err(e, self.proxy_timeout))
    }

    async fn list(&self, address: &str) -> Result<Vec<Value>, WorkerCallError> {
        let response = self
            .http
            .get(format!("{address}/list"))
            .timeout(self.proxy_timeout)
            .send()
            .await
            .map_err(|e| Self::map_err(e, self.proxy_timeout))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body = response
            .json::<ListResponse>()
            .await
            .map_err(|e| WorkerCallError::InvalidResponse(e.to_string()))?;
        Ok(body.items)
    }
}
