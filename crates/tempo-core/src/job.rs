//! Background job vocabulary shared by producers, queues and consumers.

use crate::ids::{ClientId, JobId};
use crate::range::DateRange;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Priority for queued jobs. Higher priorities are delivered first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    /// Highest first; the order consumers drain lanes in.
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request for the insight worker to (re)compute one client's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightJob {
    pub client_id: ClientId,
    #[serde(flatten)]
    pub range: DateRange,
}

impl InsightJob {
    /// Job name carried on the queue.
    pub const NAME: &'static str = "generate-insight";

    pub fn new(client_id: ClientId, range: DateRange) -> Self {
        Self { client_id, range }
    }

    /// Deterministic id: the same (client, range) always maps to the same job.
    pub fn job_id(&self) -> JobId {
        JobId::new(format!(
            "insight_{}_{}_{}",
            self.client_id,
            self.range.start_str(),
            self.range.end_str()
        ))
    }

    pub fn to_request(&self) -> Result<EnqueueRequest> {
        EnqueueRequest::new(Self::NAME, self.job_id(), self)
    }
}

/// Submission to a job queue.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueRequest {
    pub name: String,
    pub job_id: JobId,
    pub payload: serde_json::Value,
    pub priority: Priority,
    /// Overrides the queue default when set.
    pub max_attempts: Option<u32>,
}

impl EnqueueRequest {
    pub fn new(name: impl Into<String>, job_id: JobId, payload: &impl Serialize) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            job_id,
            payload: serde_json::to_value(payload)?,
            priority: Priority::default(),
            max_attempts: None,
        })
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }
}

/// Returned by enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
    /// True when an outstanding job with the same id absorbed this submission.
    pub duplicate: bool,
}

/// A job leased to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDelivery {
    pub id: JobId,
    pub name: String,
    pub payload: serde_json::Value,
    /// 1-based attempt number of this delivery.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl JobDelivery {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(Error::from)
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// Outstanding jobs absorb new submissions with the same id.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed | JobState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "delayed" => Ok(JobState::Delayed),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(Error::Queue(format!("unknown job state: {other}"))),
        }
    }
}

/// What the queue did with a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Scheduled for redelivery after `delay`.
    Retrying { delay: Duration },
    /// Attempts exhausted; kept for the failed-retention window.
    Failed,
}

/// Exponential backoff: `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::DateRange;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insight_job_id_is_deterministic() {
        let client = ClientId::new();
        let range = DateRange::parse("2026-01-01", "2026-01-31").unwrap();
        let a = InsightJob::new(client, range);
        let b = InsightJob::new(client, range);
        assert_eq!(a.job_id(), b.job_id());
        assert_eq!(
            a.job_id().as_str(),
            format!("insight_{client}_2026-01-01_2026-01-31")
        );
    }

    #[test]
    fn test_insight_job_payload_shape() {
        let client = ClientId::new();
        let range = DateRange::parse("2026-01-01", "2026-01-31").unwrap();
        let request = InsightJob::new(client, range).to_request().unwrap();
        assert_eq!(request.name, InsightJob::NAME);
        assert_eq!(
            request.payload,
            serde_json::json!({
                "clientId": client.to_string(),
                "from": "2026-01-01",
                "to": "2026-01-31",
            })
        );
    }

    #[test]
    fn test_delivery_decode() {
        let job = InsightJob::new(
            ClientId::new(),
            DateRange::parse("2026-03-01", "2026-03-02").unwrap(),
        );
        let delivery = JobDelivery {
            id: job.job_id(),
            name: InsightJob::NAME.into(),
            payload: serde_json::to_value(job).unwrap(),
            attempt: 1,
            max_attempts: 3,
        };
        assert_eq!(delivery.decode::<InsightJob>().unwrap(), job);
        assert!(!delivery.is_last_attempt());
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(4));
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::DESCENDING[0], Priority::Critical);
    }

    #[test]
    fn test_job_state_roundtrip_names() {
        for state in [JobState::Waiting, JobState::Delayed, JobState::Active, JobState::Completed, JobState::Failed] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!(JobState::Delayed.is_outstanding());
        assert!(!JobState::Completed.is_outstanding());
    }
}
