pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod pool;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use orchestrator::Orchestrator;
