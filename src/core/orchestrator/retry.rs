use std::time::Duration;

use crate::config::SessionConfig;
use crate::core::stages::{StageError, StageOutput};

/// Result of one stage attempt, as seen by the retry loop.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(StageOutput),
    /// Worth another attempt if any remain.
    Retryable(String),
    /// Stops the stage immediately.
    Fatal(String),
}

impl From<Result<StageOutput, StageError>> for AttemptOutcome {
    fn from(result: Result<StageOutput, StageError>) -> Self {
        match result {
            Ok(output) => AttemptOutcome::Success(output),
            // Model, transport and timeout failures are all transient from here.
            Err(err) => AttemptOutcome::Retryable(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub base_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_secs: 2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_secs: config.retry_base_delay_secs,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Wait before retry `k` (1-based): `base^k` seconds.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs.saturating_pow(retry))
    }

    /// Delay to apply after `failed_attempt` failed, or `None` when attempts are spent.
    pub fn next_delay(&self, failed_attempt: u32) -> Option<Duration> {
        (failed_attempt < self.max_attempts()).then(|| self.delay_for_retry(failed_attempt))
    }
}
