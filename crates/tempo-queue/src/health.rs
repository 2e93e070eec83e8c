//! Health check for the job queue backend.

use crate::metrics::QueueMetrics;
use std::sync::Arc;
use tempo_core::ports::KeyValueStore;

/// Health status of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Reachable, but jobs are exhausting their attempts.
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
}

impl HealthCheck {
    /// Probe the backing store and fold in the counters.
    pub async fn probe(store: &dyn KeyValueStore, metrics: &Arc<QueueMetrics>) -> Self {
        let reachable = store.ping().await;
        Self::from_metrics(metrics, reachable.err().map(|e| e.to_string()))
    }

    pub fn from_metrics(metrics: &Arc<QueueMetrics>, store_error: Option<String>) -> Self {
        let snapshot = metrics.snapshot();

        let status = match store_error {
            Some(reason) => HealthStatus::Unhealthy { reason },
            None if snapshot.failed > 0 => HealthStatus::Degraded {
                reason: format!("{} jobs exhausted their attempts", snapshot.failed),
            },
            None => HealthStatus::Healthy,
        };

        Self {
            status,
            enqueued: snapshot.enqueued,
            completed: snapshot.completed,
            failed: snapshot.failed,
        }
    }
}
