//! In-process job queue with the same delivery contract as the Redis backend.

use crate::config::QueueConfig;
use crate::metrics::QueueMetrics;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tempo_core::ids::JobId;
use tempo_core::job::{
    EnqueueRequest, FailOutcome, JobDelivery, JobHandle, JobState, Priority, backoff_delay,
};
use tempo_core::ports::JobQueue;
use tempo_core::{Error, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A ready job waiting in the heap.
#[derive(Debug, Clone)]
struct ReadyEntry {
    id: JobId,
    priority: Priority,
    seq: u64,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ReadyEntry {}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier submission
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

#[derive(Debug)]
struct JobRecord {
    name: String,
    payload: serde_json::Value,
    state: JobState,
    priority: Priority,
    attempts: u32,
    max_attempts: u32,
    last_error: Option<String>,
    /// Delayed: when it becomes ready. Active: when the lease runs out.
    /// Completed/failed: when the record is dropped.
    deadline: Option<Instant>,
}

#[derive(Default)]
struct Lane {
    jobs: HashMap<JobId, JobRecord>,
    ready: BinaryHeap<ReadyEntry>,
    seq: u64,
}

impl Lane {
    fn push_ready(&mut self, id: JobId, priority: Priority) {
        self.seq += 1;
        self.ready.push(ReadyEntry {
            id,
            priority,
            seq: self.seq,
        });
    }

    /// Promote due retries, reclaim expired leases, drop expired records.
    fn housekeep(&mut self, now: Instant, config: &QueueConfig) {
        let mut requeue = Vec::new();
        self.jobs.retain(|id, job| {
            let due = job.deadline.is_some_and(|at| at <= now);
            match job.state {
                JobState::Delayed if due => {
                    job.state = JobState::Waiting;
                    job.deadline = None;
                    requeue.push((id.clone(), job.priority));
                    true
                }
                JobState::Active if due => {
                    if job.attempts >= job.max_attempts {
                        job.state = JobState::Failed;
                        job.last_error = Some("lease expired".to_string());
                        job.deadline = Some(now + config.failed_retention);
                    } else {
                        job.state = JobState::Waiting;
                        job.deadline = None;
                        requeue.push((id.clone(), job.priority));
                    }
                    true
                }
                JobState::Completed | JobState::Failed => !due,
                _ => true,
            }
        });
        for (id, priority) in requeue {
            self.push_ready(id, priority);
        }
    }
}

/// Job queue held entirely in memory. Not durable across restarts.
pub struct MemoryJobQueue {
    lanes: Mutex<HashMap<String, Lane>>,
    config: QueueConfig,
    metrics: Arc<QueueMetrics>,
}

impl MemoryJobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            config,
            metrics: QueueMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }

    /// Last recorded failure reason for a job.
    pub async fn last_error(&self, queue: &str, id: &JobId) -> Option<String> {
        let lanes = self.lanes.lock().await;
        lanes
            .get(queue)
            .and_then(|lane| lane.jobs.get(id))
            .and_then(|job| job.last_error.clone())
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, queue: &str, request: EnqueueRequest) -> Result<JobHandle> {
        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry(queue.to_string()).or_default();
        lane.housekeep(Instant::now(), &self.config);

        let id = request.job_id.clone();
        let duplicate = lane
            .jobs
            .get(&id)
            .is_some_and(|job| job.state.is_outstanding());

        if !duplicate {
            lane.jobs.insert(
                id.clone(),
                JobRecord {
                    name: request.name,
                    payload: request.payload,
                    state: JobState::Waiting,
                    priority: request.priority,
                    attempts: 0,
                    max_attempts: request.max_attempts.unwrap_or(self.config.max_attempts).max(1),
                    last_error: None,
                    deadline: None,
                },
            );
            lane.push_ready(id.clone(), request.priority);
        }

        self.metrics.record_enqueue(duplicate);
        debug!(queue, job_id = %id, duplicate, "Enqueued job");
        Ok(JobHandle { id, duplicate })
    }

    async fn fetch(&self, queue: &str, lease: Duration) -> Result<Option<JobDelivery>> {
        let mut lanes = self.lanes.lock().await;
        let Some(lane) = lanes.get_mut(queue) else {
            return Ok(None);
        };
        let now = Instant::now();
        lane.housekeep(now, &self.config);

        while let Some(entry) = lane.ready.pop() {
            let Some(job) = lane.jobs.get_mut(&entry.id) else {
                continue;
            };
            if job.state != JobState::Waiting {
                continue;
            }
            job.state = JobState::Active;
            job.attempts += 1;
            job.deadline = Some(now + lease);
            self.metrics.record_delivery();
            return Ok(Some(JobDelivery {
                id: entry.id,
                name: job.name.clone(),
                payload: job.payload.clone(),
                attempt: job.attempts,
                max_attempts: job.max_attempts,
            }));
        }
        Ok(None)
    }

    async fn complete(&self, queue: &str, id: &JobId) -> Result<()> {
        let mut lanes = self.lanes.lock().await;
        let job = lanes
            .get_mut(queue)
            .and_then(|lane| lane.jobs.get_mut(id))
            .ok_or_else(|| Error::Queue(format!("job {id} not found")))?;
        job.state = JobState::Completed;
        job.deadline = Some(Instant::now() + self.config.completed_retention);
        self.metrics.record_complete();
        Ok(())
    }

    async fn fail(&self, queue: &str, id: &JobId, reason: &str) -> Result<FailOutcome> {
        let mut lanes = self.lanes.lock().await;
        let job = lanes
            .get_mut(queue)
            .and_then(|lane| lane.jobs.get_mut(id))
            .ok_or_else(|| Error::Queue(format!("job {id} not found")))?;
        job.last_error = Some(reason.to_string());

        let now = Instant::now();
        if job.attempts >= job.max_attempts {
            job.state = JobState::Failed;
            job.deadline = Some(now + self.config.failed_retention);
            self.metrics.record_failure();
            return Ok(FailOutcome::Failed);
        }

        let delay = backoff_delay(self.config.backoff_base, job.attempts);
        job.state = JobState::Delayed;
        job.deadline = Some(now + delay);
        self.metrics.record_retry();
        Ok(FailOutcome::Retrying { delay })
    }

    async fn state(&self, queue: &str, id: &JobId) -> Result<Option<JobState>> {
        let mut lanes = self.lanes.lock().await;
        let Some(lane) = lanes.get_mut(queue) else {
            return Ok(None);
        };
        lane.housekeep(Instant::now(), &self.config);
        Ok(lane.jobs.get(id).map(|job| job.state))
    }
}
