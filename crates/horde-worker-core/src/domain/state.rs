//! Job progress states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a popped job currently is in its lifecycle.
///
/// Happy path:
/// - NOT_STARTED -> PRELOADING -> PRELOADING_COMPLETE -> GENERATING
///   -> POST_PROCESSING -> SAFETY_CHECKING -> PENDING_SUBMIT -> SUBMITTING
///   -> SUBMIT_COMPLETE -> COMPLETE
///
/// Failure paths:
/// - any non-terminal -> ERROR -> ABORTED -> REPORTED_FAILED
/// - ABORTED / SUBMITTING -> ABANDONED (the dispatch source could not be told)
/// - active -> USER_REQUESTED_ABORT -> USER_ABORT_COMPLETE | ABANDONED
///
/// The full edge set lives in [`super::transitions::StateTransitionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    NotStarted,
    /// Models are being loaded into RAM/VRAM.
    Preloading,
    PreloadingComplete,
    Generating,
    PendingPostProcessing,
    PostProcessing,
    PendingSafetyCheck,
    SafetyChecking,
    PendingSubmit,
    Submitting,
    SubmitComplete,
    Complete,

    /// A stage failed. Only ever followed by ABORTED.
    Error,
    /// The job has given up; the dispatch source is about to be told.
    Aborted,
    /// The dispatch source acknowledged the failure.
    ReportedFailed,
    /// The job was dropped without the dispatch source being told.
    Abandoned,
    /// The submitting user asked for the job to stop.
    UserRequestedAbort,
    UserAbortComplete,
}

impl JobState {
    pub const ALL: [JobState; 18] = [
        JobState::NotStarted,
        JobState::Preloading,
        JobState::PreloadingComplete,
        JobState::Generating,
        JobState::PendingPostProcessing,
        JobState::PostProcessing,
        JobState::PendingSafetyCheck,
        JobState::SafetyChecking,
        JobState::PendingSubmit,
        JobState::Submitting,
        JobState::SubmitComplete,
        JobState::Complete,
        JobState::Error,
        JobState::Aborted,
        JobState::ReportedFailed,
        JobState::Abandoned,
        JobState::UserRequestedAbort,
        JobState::UserAbortComplete,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Complete
                | JobState::ReportedFailed
                | JobState::Abandoned
                | JobState::UserAbortComplete
        )
    }

    /// Can an external cancellation still interrupt a job in this state?
    ///
    /// Every non-terminal state except the two failure-handling entry points.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
            && !matches!(self, JobState::Error | JobState::UserRequestedAbort)
    }

    /// Is the job on its way to (or already at) an unsuccessful end?
    pub fn is_failing(self) -> bool {
        matches!(
            self,
            JobState::Error
                | JobState::Aborted
                | JobState::ReportedFailed
                | JobState::UserRequestedAbort
                | JobState::Abandoned
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::NotStarted => "NOT_STARTED",
            JobState::Preloading => "PRELOADING",
            JobState::PreloadingComplete => "PRELOADING_COMPLETE",
            JobState::Generating => "GENERATING",
            JobState::PendingPostProcessing => "PENDING_POST_PROCESSING",
            JobState::PostProcessing => "POST_PROCESSING",
            JobState::PendingSafetyCheck => "PENDING_SAFETY_CHECK",
            JobState::SafetyChecking => "SAFETY_CHECKING",
            JobState::PendingSubmit => "PENDING_SUBMIT",
            JobState::Submitting => "SUBMITTING",
            JobState::SubmitComplete => "SUBMIT_COMPLETE",
            JobState::Complete => "COMPLETE",
            JobState::Error => "ERROR",
            JobState::Aborted => "ABORTED",
            JobState::ReportedFailed => "REPORTED_FAILED",
            JobState::Abandoned => "ABANDONED",
            JobState::UserRequestedAbort => "USER_REQUESTED_ABORT",
            JobState::UserAbortComplete => "USER_ABORT_COMPLETE",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work the worker hands to a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preload,
    Generate,
    PostProcess,
    SafetyCheck,
    Submit,
    ReportFailure,
    Cancel,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Preload => "preload",
            Stage::Generate => "generate",
            Stage::PostProcess => "post_process",
            Stage::SafetyCheck => "safety_check",
            Stage::Submit => "submit",
            Stage::ReportFailure => "report_failure",
            Stage::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
