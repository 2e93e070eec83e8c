//! Configuration for the job queue.

use std::time::Duration;
use tempo_core::config::QueueSettings;

/// Queue-wide delivery policy.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Default attempts per job, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles with each further attempt.
    pub backoff_base: Duration,
    /// How long completed jobs stay queryable.
    pub completed_retention: Duration,
    /// How long failed jobs stay queryable.
    pub failed_retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            completed_retention: Duration::from_secs(60 * 60),
            failed_retention: Duration::from_secs(86400 * 7),
        }
    }
}

impl QueueConfig {
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff_base: settings.backoff_base(),
            completed_retention: Duration::from_secs(settings.completed_retention_secs),
            failed_retention: Duration::from_secs(settings.failed_retention_secs),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let config = QueueConfig::from_settings(&QueueSettings::default());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
    }

    #[test]
    fn test_attempts_never_zero() {
        assert_eq!(QueueConfig::default().with_max_attempts(0).max_attempts, 1);
    }
}
