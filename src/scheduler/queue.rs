use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::scheduler::job::Job;

/// Unbounded FIFO of jobs waiting for a dispatch loop.
///
/// Submission never blocks. Dispatch loops share the receiving half; the
/// first loop waiting on it gets the next job.
#[derive(Debug)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    rx: Mutex<mpsc::UnboundedReceiver<Job>>,
    depth: AtomicUsize,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    /// Enqueue a job and return its position (queue length after insert).
    pub fn submit(&self, job: Job) -> usize {
        let position = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = job.id.clone();
        // The receiver lives as long as the queue, so this only fails if the
        // queue itself is being torn down.
        if self.tx.send(job).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            tracing::error!(job_id = %job_id, "Job queue closed, job dropped");
            return 0;
        }
        tracing::debug!(job_id = %job_id, position, "Job enqueued");
        position
    }

    /// Wait for the next job. Returns `None` once `shutdown` is cancelled.
    pub async fn take(&self, shutdown: &CancellationToken) -> Option<Job> {
        let mut rx = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };

        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            job = rx.recv() => job,
        }?;

        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(job)
    }

    /// Jobs submitted but not yet taken by a dispatch loop.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
