//! In-process delivery queue and worker pool.
//!
//! Deliveries are at-least-once: a `Retry` outcome schedules a delayed
//! redelivery, and nothing here deduplicates; the lifecycle's conditional
//! transitions are what make duplicate deliveries harmless. A job is
//! delivered at most `policy.max_retries()` times per enqueue, which is
//! the same bound the lifecycle finalizes at.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pixelmint_core::JobId;
use pixelmint_jobs::{EnqueueError, JobQueue, ProcessOutcome, Processor, RetryScheduler};

/// One scheduled invocation of `process`.
#[derive(Debug)]
struct Delivery {
    job_id: JobId,
    /// 1-indexed delivery number for this enqueue.
    attempt: u32,
    policy: RetryScheduler,
}

/// Shared delivery channel. Clone-cheap handle: submission side pushes,
/// workers pull.
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobQueue for DeliveryQueue {
    async fn enqueue(&self, job_id: JobId, policy: RetryScheduler) -> Result<(), EnqueueError> {
        self.tx
            .send(Delivery {
                job_id,
                attempt: 1,
                policy,
            })
            .map_err(|_| EnqueueError("delivery channel closed".to_string()))
    }
}

/// Handle to the running workers.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks pulling deliveries from `queue` and feeding
    /// them to `processor`.
    pub fn spawn(queue: &DeliveryQueue, processor: Arc<dyn Processor>, workers: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = (0..workers.max(1))
            .map(|index| {
                let rx = queue.rx.clone();
                let tx = queue.tx.clone();
                let processor = processor.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(worker_loop(index, rx, tx, processor, shutdown))
            })
            .collect();

        Self {
            shutdown: shutdown_tx,
            handles,
        }
    }

    /// Request graceful shutdown and wait for the workers to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    index: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
    tx: mpsc::UnboundedSender<Delivery>,
    processor: Arc<dyn Processor>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(worker = index, "delivery worker started");

    loop {
        let delivery = tokio::select! {
            _ = shutdown.changed() => break,
            delivery = async { rx.lock().await.recv().await } => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let Delivery {
            job_id,
            attempt,
            policy,
        } = delivery;
        debug!(worker = index, job_id = %job_id, attempt, "delivering job");

        match processor.process(job_id).await {
            ProcessOutcome::Completed => {
                debug!(job_id = %job_id, attempt, "delivery finished: completed");
            }
            ProcessOutcome::Failed { error } => {
                debug!(job_id = %job_id, attempt, error = %error, "delivery finished: failed");
            }
            ProcessOutcome::Skipped => {
                debug!(job_id = %job_id, attempt, "delivery skipped");
            }
            ProcessOutcome::Retry { delay } => {
                if attempt < policy.max_retries() {
                    debug!(
                        job_id = %job_id,
                        next_attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling redelivery"
                    );
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if tx
                            .send(Delivery {
                                job_id,
                                attempt: attempt + 1,
                                policy,
                            })
                            .is_err()
                        {
                            warn!(job_id = %job_id, "queue closed before redelivery");
                        }
                    });
                } else {
                    // The lifecycle finalizes at this same bound; landing
                    // here means the two policies disagree.
                    warn!(job_id = %job_id, attempt, "delivery cap exhausted, dropping job");
                }
            }
        }
    }

    info!(worker = index, "delivery worker stopped");
}
