//! Background-queue boundary.

use std::sync::Mutex;

use pixelmint_core::JobId;

use crate::retry::RetryScheduler;

#[derive(Debug, Clone, thiserror::Error)]
#[error("enqueue failed: {0}")]
pub struct EnqueueError(pub String);

/// Durable delivery queue.
///
/// The queue invokes the processor at least once per attempt and delivers
/// a job no more than `policy.max_retries()` times per enqueue. Delivery
/// is at-least-once: the lifecycle's conditional transitions, not the
/// queue, are what make duplicates harmless.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: JobId, policy: RetryScheduler) -> Result<(), EnqueueError>;
}

/// Queue stub that records enqueues without delivering them (tests drive
/// `process` by hand).
#[derive(Debug, Default)]
pub struct RecordingQueue {
    inner: Mutex<Vec<JobId>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueued(&self) -> Vec<JobId> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job_id: JobId, _policy: RetryScheduler) -> Result<(), EnqueueError> {
        self.inner.lock().unwrap().push(job_id);
        Ok(())
    }
}
