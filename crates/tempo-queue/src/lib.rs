//! Durable job queue for Tempo.
//!
//! [`RedisJobQueue`] is the production backend: priority lanes, deterministic
//! job-id deduplication, lease-based at-least-once delivery and exponential
//! retry backoff. [`MemoryJobQueue`] implements the same contract in-process.
//! [`consume`] runs a bounded pool of handlers against either.

pub mod config;
pub mod consumer;
pub mod health;
pub mod memory;
pub mod metrics;
pub mod redis_queue;

pub use config::QueueConfig;
pub use consumer::{ConsumerOptions, JobHandler, WorkerHandle, consume};
pub use health::{HealthCheck, HealthStatus};
pub use memory::MemoryJobQueue;
pub use metrics::{MetricsSnapshot, QueueMetrics};
pub use redis_queue::RedisJobQueue;
