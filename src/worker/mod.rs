//! Client side of the device agent contract.
//!
//! Every remote call the orchestrator makes goes through [`WorkerClient`]:
//! - **Health probes** from the pool's periodic refresh
//! - **Extraction** from the dispatch loops
//! - **Download / list** proxied by the gateway
//!
//! [`HttpWorkerClient`] is the production implementation over `reqwest`.
//! Tests substitute in-process fakes.

pub mod client;

pub use client::{HttpWorkerClient, WorkerClient};
