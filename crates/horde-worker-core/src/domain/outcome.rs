//! Outcome model: what the pipeline produces and what goes back upstream.
//!
//! These types carry no behavior beyond small helpers. The worker loop
//! assembles them; the dispatch source serializes them however it likes.

use serde::{Deserialize, Serialize};

use super::errors::WorkerErrorKind;
use super::ids::{GenerationId, JobId};
use super::state::JobState;
use super::tracker::{FailureRecord, Transition};

/// A reference to something a generation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Artifact {
    /// Generated text.
    Text(String),

    /// Raw encoded output (e.g. a webp image).
    Bytes(Vec<u8>),

    /// Path to a file written by the backend.
    FilePath(String),

    /// Where the output was uploaded to.
    Url(String),

    /// Arbitrary JSON payload (interrogation results, etc.).
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub generation_id: GenerationId,
    pub artifact: Artifact,
}

/// Output of the generate (and post-process) stages, one result per
/// generation in the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub results: Vec<GenerationResult>,
}

impl GenerationOutput {
    pub fn new(results: Vec<GenerationResult>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Result of the safety check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SafetyVerdict {
    Pass,
    Flagged { nsfw: bool, csam: bool },
}

impl SafetyVerdict {
    /// CSAM is always censored; NSFW only when the requester asked for it.
    pub fn requires_censorship(self, censor_nsfw: bool) -> bool {
        match self {
            SafetyVerdict::Pass => false,
            SafetyVerdict::Flagged { nsfw, csam } => csam || (nsfw && censor_nsfw),
        }
    }
}

/// What gets sent to the dispatch source for a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: JobId,
    pub results: Vec<GenerationResult>,

    /// `None` for kinds that skip the safety check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyVerdict>,

    #[serde(default)]
    pub censored: bool,
}

/// The dispatch source's answer to a result submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitAck {
    /// `reward` is whatever the dispatch source chose to report.
    Accepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reward: Option<f64>,
    },
    /// The job is no longer wanted (expired, already done elsewhere, ...).
    Rejected { reason: String },
}

/// Sent upstream when a job could not be completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub job_id: JobId,
    pub kind: WorkerErrorKind,
    pub reason: String,
}

/// Summary of one finished `run_job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub final_state: JobState,
    pub history: Vec<Transition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.final_state == JobState::Complete
    }

    /// The states the job went through, in order.
    pub fn states(&self) -> Vec<JobState> {
        self.history.iter().map(|t| t.state).collect()
    }
}
