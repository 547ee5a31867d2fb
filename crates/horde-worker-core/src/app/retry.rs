//! Retry policy: decides how often and how long to wait.

use std::time::Duration;

use super::config::WorkerConfig;
use crate::domain::state::Stage;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    pub multiplier: f64,
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Policy for result submission and failure reporting.
    pub fn for_submit(config: &WorkerConfig) -> Self {
        Self {
            max_attempts: config.max_consecutive_failed_job_submits,
            base_delay: config.job_submit_retry_delay(),
            multiplier: config.job_submit_backoff_multiplier,
        }
    }

    /// Policy for one pipeline stage.
    pub fn for_stage(config: &WorkerConfig, stage: Stage) -> Self {
        Self::fixed(
            config.stage_attempts.for_stage(stage),
            config.stage_retry_delay(),
        )
    }

    /// Delay after `attempts` failed attempts (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1)
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Is another attempt allowed after `attempts` failures?
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
