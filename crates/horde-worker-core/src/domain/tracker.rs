//! JobProgressTracker - 1ジョブの状態遷移を管理
//!
//! The tracker owns one job's current state and its transition history.
//! Every transition is checked against the job kind's
//! [`StateTransitionTable`]; an illegal one is returned as an error and
//! leaves the tracker untouched.
//!
//! A tracker has exactly one owner (the task driving the job), so it needs
//! no interior locking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{TransitionError, WorkerErrorKind};
use super::job::JobDescriptor;
use super::state::JobState;
use super::transitions::StateTransitionTable;

/// One entry of a job's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub state: JobState,
    pub at: DateTime<Utc>,
}

/// Why and where a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The state the job was in when the failure was detected.
    pub state: JobState,
    pub kind: WorkerErrorKind,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// How a transition to the current state is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    /// Re-entering the current state is an illegal transition.
    #[default]
    Strict,
    /// Re-entering the current state is a no-op.
    Lenient,
}

#[derive(Debug)]
pub struct JobProgressTracker {
    descriptor: Arc<JobDescriptor>,
    table: &'static StateTransitionTable,
    state: JobState,
    history: Vec<Transition>,
    failures: Vec<FailureRecord>,
    mode: TransitionMode,
    extra_logging: bool,
}

impl JobProgressTracker {
    /// Start tracking `descriptor` in NOT_STARTED.
    ///
    /// The table is picked from the job kind.
    pub fn new(descriptor: impl Into<Arc<JobDescriptor>>, at: DateTime<Utc>) -> Self {
        let descriptor = descriptor.into();
        let table = StateTransitionTable::for_kind(descriptor.kind());
        Self::with_table(descriptor, table, at)
    }

    /// Start tracking `descriptor` against an explicit table.
    pub fn with_table(
        descriptor: impl Into<Arc<JobDescriptor>>,
        table: &'static StateTransitionTable,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            descriptor: descriptor.into(),
            table,
            state: JobState::NotStarted,
            history: vec![Transition {
                state: JobState::NotStarted,
                at,
            }],
            failures: Vec::new(),
            mode: TransitionMode::Strict,
            extra_logging: false,
        }
    }

    pub fn with_mode(mut self, mode: TransitionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Log transitions at `debug` instead of `trace`.
    pub fn with_extra_logging(mut self, enabled: bool) -> Self {
        self.extra_logging = enabled;
        self
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    pub fn current_state(&self) -> JobState {
        self.state
    }

    /// A copy of the history, oldest first.
    pub fn history(&self) -> Vec<Transition> {
        self.history.clone()
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        self.table.is_legal_transition(self.state, next)
    }

    /// Move to `next`, returning the new state.
    pub fn transition(
        &mut self,
        next: JobState,
        at: DateTime<Utc>,
    ) -> Result<JobState, TransitionError> {
        if next == self.state && self.mode == TransitionMode::Lenient {
            return Ok(self.state);
        }

        if !self.table.is_legal_transition(self.state, next) {
            return Err(TransitionError::IllegalStateTransition {
                job_id: self.descriptor.job_id().clone(),
                current: self.state,
                attempted: next,
            });
        }

        let previous = self.state;
        self.state = next;
        self.history.push(Transition { state: next, at });

        if self.extra_logging {
            tracing::debug!(job_id = %self.descriptor.job_id(), from = %previous, to = %next, "state transition");
        } else {
            tracing::trace!(job_id = %self.descriptor.job_id(), from = %previous, to = %next, "state transition");
        }

        Ok(next)
    }

    /// Record a failure without changing state.
    pub fn record_failure(
        &mut self,
        kind: WorkerErrorKind,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.failures.push(FailureRecord {
            state: self.state,
            kind,
            reason: reason.into(),
            at,
        });
    }

    /// Record a failure and move to ERROR.
    ///
    /// The failure is recorded even if the move is illegal, so the reason is
    /// not lost when the caller escalates.
    pub fn fail(
        &mut self,
        kind: WorkerErrorKind,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<JobState, TransitionError> {
        self.record_failure(kind, reason, at);
        self.transition(JobState::Error, at)
    }

    /// The most recent failure, if any.
    pub fn last_failure(&self) -> Option<&FailureRecord> {
        self.failures.last()
    }
}
