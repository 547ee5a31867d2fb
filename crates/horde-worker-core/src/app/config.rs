//! WorkerConfig - ワーカーの設定
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at all) gives a working configuration. Call [`WorkerConfig::validate`]
//! before use; [`super::builder::WorkerLoopBuilder`] does it for you.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::state::Stage;
use crate::domain::tracker::TransitionMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} = {value} is out of range (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// How many times each pipeline stage is tried before the job errors out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageAttempts {
    pub preload: u32,
    pub generate: u32,
    pub post_process: u32,
    pub safety_check: u32,
}

impl Default for StageAttempts {
    fn default() -> Self {
        Self {
            preload: 3,
            generate: 3,
            post_process: 1,
            safety_check: 3,
        }
    }
}

impl StageAttempts {
    /// Attempts for `stage`. Stages without their own setting get one try.
    pub fn for_stage(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Preload => self.preload,
            Stage::Generate => self.generate,
            Stage::PostProcess => self.post_process,
            Stage::SafetyCheck => self.safety_check,
            Stage::Submit | Stage::ReportFailure | Stage::Cancel => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on jobs in flight at once.
    pub max_concurrent_jobs: usize,

    /// Pause before popping again when there was no work.
    pub pop_interval_ms: u64,

    pub stage_attempts: StageAttempts,

    /// Fixed pause between attempts of one stage.
    pub stage_retry_delay_ms: u64,

    /// Attempts for one result submission or failure report.
    pub max_consecutive_failed_job_submits: u32,

    /// Delay before the second submit attempt; grows by the multiplier.
    pub job_submit_retry_delay_ms: u64,

    pub job_submit_backoff_multiplier: f64,

    /// How long in-flight work may take to stop after a user abort.
    pub cancel_grace_period_ms: u64,

    /// Reject a transition to the state the job is already in.
    pub strict_transitions: bool,

    /// Log state transitions at `debug` instead of `trace`.
    pub extra_logging: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            pop_interval_ms: 1000,
            stage_attempts: StageAttempts::default(),
            stage_retry_delay_ms: 1000,
            max_consecutive_failed_job_submits: 3,
            job_submit_retry_delay_ms: 2000,
            job_submit_backoff_multiplier: 2.0,
            cancel_grace_period_ms: 5000,
            strict_transitions: true,
            extra_logging: true,
        }
    }
}

const MAX_ATTEMPTS: u32 = 10;
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value < min || value > max || value.is_nan() {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_attempts(field: &'static str, value: u32) -> Result<(), ConfigError> {
    check_range(field, f64::from(value), 1.0, f64::from(MAX_ATTEMPTS))
}

impl WorkerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "max_concurrent_jobs",
            self.max_concurrent_jobs as f64,
            1.0,
            f64::from(u32::MAX),
        )?;
        check_attempts("stage_attempts.preload", self.stage_attempts.preload)?;
        check_attempts("stage_attempts.generate", self.stage_attempts.generate)?;
        check_attempts("stage_attempts.post_process", self.stage_attempts.post_process)?;
        check_attempts("stage_attempts.safety_check", self.stage_attempts.safety_check)?;
        check_attempts(
            "max_consecutive_failed_job_submits",
            self.max_consecutive_failed_job_submits,
        )?;
        check_range(
            "job_submit_backoff_multiplier",
            self.job_submit_backoff_multiplier,
            1.0,
            MAX_BACKOFF_MULTIPLIER,
        )?;
        Ok(())
    }

    pub fn pop_interval(&self) -> Duration {
        Duration::from_millis(self.pop_interval_ms)
    }

    pub fn stage_retry_delay(&self) -> Duration {
        Duration::from_millis(self.stage_retry_delay_ms)
    }

    pub fn job_submit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.job_submit_retry_delay_ms)
    }

    pub fn cancel_grace_period(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_period_ms)
    }

    pub fn transition_mode(&self) -> TransitionMode {
        if self.strict_transitions {
            TransitionMode::Strict
        } else {
            TransitionMode::Lenient
        }
    }
}
