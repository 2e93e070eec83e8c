//! Bounded pool of concurrent job handlers.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempo_core::config::{QueueSettings, WorkerSettings};
use tempo_core::job::{FailOutcome, JobDelivery};
use tempo_core::ports::JobQueue;
use tempo_core::{Error, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, error, info, warn};

/// Processes one delivery. Returning an error hands the job back to the
/// queue's retry policy; handlers never retry on their own.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &JobDelivery) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub concurrency: usize,
    /// Idle wait between empty polls.
    pub poll_interval: Duration,
    pub lease: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(30),
        }
    }
}

impl ConsumerOptions {
    pub fn from_settings(worker: &WorkerSettings, queue: &QueueSettings) -> Self {
        Self {
            concurrency: worker.concurrency.max(1),
            poll_interval: worker.poll_interval(),
            lease: queue.lease(),
        }
    }
}

/// Running consumer. Dropping it also stops fetching, but only
/// [`WorkerHandle::close`] waits for in-flight jobs.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop fetching, then wait for in-flight jobs to finish.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Consumer task ended abnormally");
        }
    }
}

/// Start consuming `queue_name` with `handler`.
pub fn consume(
    queue: Arc<dyn JobQueue>,
    queue_name: impl Into<String>,
    handler: Arc<dyn JobHandler>,
    options: ConsumerOptions,
) -> WorkerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = Consumer {
        queue,
        queue_name: queue_name.into(),
        handler,
        options,
    };
    let task = tokio::spawn(consumer.run(shutdown_rx));
    WorkerHandle { shutdown_tx, task }
}

struct Consumer {
    queue: Arc<dyn JobQueue>,
    queue_name: String,
    handler: Arc<dyn JobHandler>,
    options: ConsumerOptions,
}

impl Consumer {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let concurrency = self.options.concurrency.max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut in_flight = JoinSet::new();

        info!(queue = %self.queue_name, concurrency, "Consumer started");

        loop {
            while let Some(finished) = in_flight.try_join_next() {
                if let Err(e) = finished {
                    error!(queue = %self.queue_name, error = %e, "Job task aborted");
                }
            }

            let permit = tokio::select! {
                _ = shutdown.changed() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if *shutdown.borrow() {
                break;
            }

            match self.queue.fetch(&self.queue_name, self.options.lease).await {
                Ok(Some(job)) => {
                    in_flight.spawn(process(
                        Arc::clone(&self.queue),
                        self.queue_name.clone(),
                        Arc::clone(&self.handler),
                        job,
                        permit,
                    ));
                }
                Ok(None) => {
                    drop(permit);
                    if idle(&mut shutdown, self.options.poll_interval).await {
                        break;
                    }
                }
                Err(e) => {
                    drop(permit);
                    warn!(queue = %self.queue_name, error = %e, "Failed to fetch job");
                    if idle(&mut shutdown, self.options.poll_interval).await {
                        break;
                    }
                }
            }
        }

        info!(
            queue = %self.queue_name,
            in_flight = in_flight.len(),
            "Consumer draining in-flight jobs"
        );
        while let Some(finished) = in_flight.join_next().await {
            if let Err(e) = finished {
                error!(queue = %self.queue_name, error = %e, "Job task aborted");
            }
        }
        info!(queue = %self.queue_name, "Consumer stopped");
    }
}

/// Sleep for `interval`. Returns true if shutdown was requested meanwhile.
async fn idle(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = tokio::time::sleep(interval) => false,
    }
}

async fn process(
    queue: Arc<dyn JobQueue>,
    queue_name: String,
    handler: Arc<dyn JobHandler>,
    job: JobDelivery,
    permit: OwnedSemaphorePermit,
) {
    let span = tempo_trace::job_span(&queue_name, job.id.as_str(), job.attempt);
    async move {
        let started = std::time::Instant::now();
        info!(name = %job.name, "Processing job");

        // A panicking handler must not take the pool down with it.
        let delivery = job.clone();
        let outcome = tokio::spawn(async move { handler.handle(&delivery).await })
            .await
            .unwrap_or_else(|e| Err(Error::Internal(format!("job handler panicked: {e}"))));

        match outcome {
            Ok(()) => match queue.complete(&queue_name, &job.id).await {
                Ok(()) => info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                ),
                Err(e) => error!(error = %e, "Failed to mark job completed"),
            },
            Err(e) => {
                if job.is_last_attempt() {
                    error!(error = %e, max_attempts = job.max_attempts, "Job failed on its last attempt");
                } else {
                    warn!(error = %e, max_attempts = job.max_attempts, "Job failed");
                }
                match queue.fail(&queue_name, &job.id, &e.to_string()).await {
                    Ok(FailOutcome::Retrying { delay }) => warn!(
                        delay_ms = delay.as_millis() as u64,
                        "Job scheduled for retry"
                    ),
                    Ok(FailOutcome::Failed) => error!("Job exhausted its attempts"),
                    Err(e) => error!(error = %e, "Failed to record job failure"),
                }
            }
        }
        drop(permit);
    }
    .instrument(span)
    .await
}
