use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;

use crate::scheduler::JobStatus;

/// Terminal result of a job as written by a dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The agent's response body, passed through untouched.
    Completed(Value),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub request_key: String,
    /// Worker that produced the result. `None` if no worker was ever acquired.
    pub worker_id: Option<String>,
    pub outcome: Outcome,
}

impl JobResult {
    pub fn completed(request_key: impl Into<String>, worker_id: impl Into<String>, data: Value) -> Self {
        Self {
            request_key: request_key.into(),
            worker_id: Some(worker_id.into()),
            outcome: Outcome::Completed(data),
        }
    }

    pub fn failed(
        request_key: impl Into<String>,
        worker_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            request_key: request_key.into(),
            worker_id,
            outcome: Outcome::Failed(error.into()),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self.outcome {
            Outcome::Completed(_) => JobStatus::Completed,
            Outcome::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, Outcome::Completed(_))
    }
}

/// A [`JobResult`] plus its cache bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: JobResult,
    pub cached_at: DateTime<Utc>,
    pub(crate) inserted_at: Instant,
    pub(crate) expires_at: Instant,
}

impl CacheEntry {
    pub(crate) fn new(result: JobResult, ttl: std::time::Duration) -> Self {
        let inserted_at = Instant::now();
        Self {
            result,
            cached_at: Utc::now(),
            inserted_at,
            expires_at: inserted_at + ttl,
        }
    }

    /// Expired from the instant `inserted_at + ttl` is reached.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}
