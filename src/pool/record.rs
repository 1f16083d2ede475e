use chrono::{DateTime, Utc};
use serde::Serialize;

/// Last known state of one remote device agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerRecord {
    pub id: String,
    #[serde(rename = "url")]
    pub address: String,
    pub busy: bool,
    pub healthy: bool,
    pub last_health_check: Option<DateTime<Utc>>,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

impl WorkerRecord {
    /// Register the agent at `address` as the `index`-th worker (0-based).
    /// Workers start healthy until a probe says otherwise.
    pub fn new(index: usize, address: impl Into<String>) -> Self {
        Self {
            id: format!("android-{}", index + 1),
            address: address.into(),
            busy: false,
            healthy: true,
            last_health_check: None,
            jobs_completed: 0,
            jobs_failed: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.healthy && !self.busy
    }
}
