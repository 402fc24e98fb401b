//! Retry policy for jobs whose result is not ready.
//!
//! A not-ready poll sends the job back for resubmission. The policy decides
//! when to stop doing that and how long to wait before the next tick.

use std::time::Duration;

use crate::config::BatchAnalysisSettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts allowed before a job is given up as FAILURE. Zero means unbounded.
    pub max_attempts: u32,
    /// Delay before the follow-up tick when work remains.
    pub backoff_secs: u64,
}

impl RetryPolicy {
    pub fn new(settings: &BatchAnalysisSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff_secs: settings.backoff_secs,
        }
    }

    /// Whether a job that has now made `attempt_count` attempts may be retried.
    pub fn should_retry(&self, attempt_count: u32) -> bool {
        self.max_attempts == 0 || attempt_count < self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_secs: 60,
        }
    }
}
