use thiserror::Error;

/// Failure of a single call to a remote device agent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerCallError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Worker returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from worker: {0}")]
    InvalidResponse(String),

    #[error("Not found on worker")]
    NotFound,
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("No worker available after {0} attempts")]
    NoWorkerAvailable(u32),

    #[error("Worker call failed: {0}")]
    Worker(#[from] WorkerCallError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
