//! Errors - エラー型と分類
//!
//! Collaborator failures carry a [`WorkerErrorKind`] so the failure report
//! tells the dispatch source what kind of trouble the worker ran into.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::JobId;
use super::state::JobState;

/// Classification of why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerErrorKind {
    /// Something in the worker itself went wrong.
    UnhandledException,
    /// The inference backend (or another collaborator) failed.
    UnhandledExceptionFromBackend,
    SystemOutOfMemory,
    GpuOutOfMemory,
    /// The dispatch source could not be reached.
    NetworkIssue,
    /// A stage did not stop or finish in time.
    SafeguardTimeout,
}

impl WorkerErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnhandledException => "unhandled_exception",
            Self::UnhandledExceptionFromBackend => "unhandled_exception_from_backend",
            Self::SystemOutOfMemory => "system_out_of_memory",
            Self::GpuOutOfMemory => "gpu_out_of_memory",
            Self::NetworkIssue => "network_issue",
            Self::SafeguardTimeout => "safeguard_timeout",
        }
    }
}

impl fmt::Display for WorkerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure returned by one of the pipeline collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CollaboratorError {
    pub kind: WorkerErrorKind,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(kind: WorkerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure raised by the backend a collaborator wraps.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(WorkerErrorKind::UnhandledExceptionFromBackend, message)
    }

    pub fn gpu_oom(message: impl Into<String>) -> Self {
        Self::new(WorkerErrorKind::GpuOutOfMemory, message)
    }

    pub fn system_oom(message: impl Into<String>) -> Self {
        Self::new(WorkerErrorKind::SystemOutOfMemory, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(WorkerErrorKind::SafeguardTimeout, message)
    }
}

/// A transition the table does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {job_id}: illegal state transition {current} -> {attempted}")]
    IllegalStateTransition {
        job_id: JobId,
        current: JobState,
        attempted: JobState,
    },
}

/// Errors from talking to the dispatch source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Transport or server trouble. Worth another try.
    #[error("dispatch source unreachable: {0}")]
    Network(String),

    /// The dispatch source answered and said no.
    #[error("dispatch source rejected the request: {0}")]
    Rejected(String),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Network(_))
    }
}

/// A job descriptor that cannot be run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobDescriptorError {
    #[error("job {0} has no generations")]
    EmptyBatch(JobId),

    #[error("batch size mismatch: expected {expected} generations, got {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },
}
