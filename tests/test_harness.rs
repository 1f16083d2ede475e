//! Shared fakes for orchestrator tests.
//!
//! [`FakeWorkers`] stands in for a fleet of device agents. It answers every
//! [`WorkerClient`] call from in-memory state and records enough about the
//! calls it sees (count, per-address overlap) for tests to assert on.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use apk_orchestrator::config::{CacheConfig, DispatchConfig, OrchestratorConfig};
use apk_orchestrator::error::WorkerCallError;
use apk_orchestrator::worker::WorkerClient;

#[derive(Default)]
struct FakeState {
    down: HashSet<String>,
    failures: HashMap<String, String>,
    panics: HashSet<String>,
    files: HashMap<(String, String, String), Bytes>,
    packages: HashMap<String, Vec<Value>>,
    in_flight: HashMap<String, usize>,
}

#[derive(Default)]
pub struct FakeWorkers {
    state: Mutex<FakeState>,
    extract_delay: Mutex<Duration>,
    extract_calls: AtomicUsize,
    overlapping_calls: AtomicUsize,
}

impl FakeWorkers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, address: &str, down: bool) {
        let mut state = self.state.lock().unwrap();
        if down {
            state.down.insert(address.to_string());
        } else {
            state.down.remove(address);
        }
    }

    pub fn set_extract_delay(&self, delay: Duration) {
        *self.extract_delay.lock().unwrap() = delay;
    }

    /// Every extraction of `key` fails with `message`.
    pub fn fail_extract(&self, key: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(key.to_string(), message.to_string());
    }

    /// Every extraction of `key` panics inside the client.
    pub fn panic_on_extract(&self, key: &str) {
        self.state.lock().unwrap().panics.insert(key.to_string());
    }

    pub fn add_file(&self, address: &str, key: &str, filename: &str, content: &'static [u8]) {
        self.state.lock().unwrap().files.insert(
            (address.to_string(), key.to_string(), filename.to_string()),
            Bytes::from_static(content),
        );
    }

    pub fn set_packages(&self, address: &str, packages: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .packages
            .insert(address.to_string(), packages);
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    /// Extract calls that started while another call on the same address was
    /// still running.
    pub fn overlapping_calls(&self) -> usize {
        self.overlapping_calls.load(Ordering::SeqCst)
    }

    fn check_up(&self, address: &str) -> Result<(), WorkerCallError> {
        if self.state.lock().unwrap().down.contains(address) {
            Err(WorkerCallError::Transport(format!("{address}: connection refused")))
        } else {
            Ok(())
        }
    }
}

pub fn extracted_payload(address: &str, key: &str) -> Value {
    json!({
        "package": key,
        "files": [format!("{key}.apk")],
        "served_by": address,
    })
}

#[async_trait]
impl WorkerClient for FakeWorkers {
    async fn health(&self, address: &str) -> Result<(), WorkerCallError> {
        self.check_up(address)
    }

    async fn extract(&self, address: &str, request_key: &str) -> Result<Value, WorkerCallError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let (failure, panics) = {
            let mut state = self.state.lock().unwrap();
            let running = state.in_flight.entry(address.to_string()).or_insert(0);
            if *running > 0 {
                self.overlapping_calls.fetch_add(1, Ordering::SeqCst);
            }
            *running += 1;
            (
                state.failures.get(request_key).cloned(),
                state.panics.contains(request_key),
            )
        };

        let delay = *self.extract_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(running) = self.state.lock().unwrap().in_flight.get_mut(address) {
            *running -= 1;
        }

        if panics {
            panic!("agent crashed while extracting {request_key}");
        }
        self.check_up(address)?;
        match failure {
            Some(message) => Err(WorkerCallError::Status {
                status: 500,
                message,
            }),
            None => Ok(extracted_payload(address, request_key)),
        }
    }

    async fn download(
        &self,
        address: &str,
        request_key: &str,
        filename: &str,
    ) -> Result<Bytes, WorkerCallError> {
        self.check_up(address)?;
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(
                address.to_string(),
                request_key.to_string(),
                filename.to_string(),
            ))
            .cloned()
            .ok_or(WorkerCallError::NotFound)
    }

    async fn list(&self, address: &str) -> Result<Vec<Value>, WorkerCallError> {
        self.check_up(address)?;
        self.state
            .lock()
            .unwrap()
            .packages
            .get(address)
            .cloned()
            .ok_or_else(|| WorkerCallError::Status {
                status: 503,
                message: "no package list".to_string(),
            })
    }
}

pub fn worker_urls(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("http://android-{i}:5000"))
        .collect()
}

/// Config with `workers` fake agents and fast polling so tests finish quickly.
pub fn test_config(workers: usize, dispatchers: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        worker_urls: worker_urls(workers),
        dispatch: DispatchConfig {
            workers: dispatchers,
            acquire_poll_interval: Duration::from_millis(10),
            max_acquire_attempts: 5,
            extraction_timeout: Duration::from_secs(5),
        },
        cache: CacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 10,
            dedup_window: None,
        },
        health_check_interval: Duration::from_secs(3600),
        health_check_timeout: Duration::from_secs(1),
        proxy_timeout: Duration::from_secs(1),
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await;
    (status, serde_json::from_slice(&body).unwrap())
}

pub async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// Poll `/status/{job_id}` until the job leaves `processing`.
pub async fn wait_for_terminal(app: &Router, job_id: &str, timeout: Duration) -> Value {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let (status, body) = get_json(app, &format!("/status/{job_id}")).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "processing" {
            return body;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} still processing after {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
