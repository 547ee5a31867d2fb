//! Status - ワーカーの状態スナップショット

use serde::{Deserialize, Serialize};

use crate::domain::state::JobState;

/// Counts of in-flight jobs and of jobs per terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub in_flight: usize,
    pub completed: usize,
    pub reported_failed: usize,
    pub abandoned: usize,
    pub user_aborted: usize,
}

impl WorkerStatus {
    /// Count one finished job.
    pub(crate) fn record(&mut self, final_state: JobState) {
        match final_state {
            JobState::Complete => self.completed += 1,
            JobState::ReportedFailed => self.reported_failed += 1,
            JobState::UserAbortComplete => self.user_aborted += 1,
            // a run that somehow stopped short of a terminal state was not delivered
            _ => self.abandoned += 1,
        }
    }

    pub fn finished(&self) -> usize {
        self.completed + self.reported_failed + self.abandoned + self.user_aborted
    }
}
