pub mod dispatcher;
pub mod job;
pub mod queue;

pub use dispatcher::Dispatcher;
pub use job::{Job, JobId, JobStatus};
pub use queue::JobQueue;
