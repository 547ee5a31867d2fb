//! Static table of legal job state transitions.
//!
//! Forward edges are listed explicitly. The two wildcard edges are derived
//! from [`JobState::ALL`] when a table is built:
//! - every non-terminal state except ERROR may move to ERROR
//! - every active state may move to USER_REQUESTED_ABORT
//!
//! Tables are built once per process and shared read-only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::job::JobKind;
use super::state::JobState;

use JobState::*;

const FORWARD_EDGES: &[(JobState, &[JobState])] = &[
    (
        NotStarted,
        &[Preloading, Generating, PendingPostProcessing, PostProcessing],
    ),
    (Preloading, &[PreloadingComplete]),
    (
        PreloadingComplete,
        &[Generating, PendingPostProcessing, PostProcessing],
    ),
    (
        Generating,
        &[
            PendingPostProcessing,
            PostProcessing,
            PendingSafetyCheck,
            SafetyChecking,
        ],
    ),
    (PendingPostProcessing, &[PostProcessing]),
    (PostProcessing, &[PendingSafetyCheck, SafetyChecking]),
    (PendingSafetyCheck, &[SafetyChecking]),
    (SafetyChecking, &[PendingSubmit]),
    (PendingSubmit, &[Submitting]),
    (Submitting, &[SubmitComplete, Aborted, Abandoned]),
    (SubmitComplete, &[Complete]),
    (Error, &[Aborted]),
    (Aborted, &[ReportedFailed, Abandoned]),
    (UserRequestedAbort, &[UserAbortComplete, Abandoned]),
];

/// Kinds without a safety check skip straight from work to submission.
const NO_SAFETY_OVERRIDES: &[(JobState, &[JobState])] = &[
    (
        Generating,
        &[PendingPostProcessing, PostProcessing, PendingSubmit],
    ),
    (PostProcessing, &[PendingSubmit]),
];

static STANDARD: LazyLock<StateTransitionTable> =
    LazyLock::new(|| StateTransitionTable::build(FORWARD_EDGES, &[]));

static WITHOUT_SAFETY_CHECK: LazyLock<StateTransitionTable> =
    LazyLock::new(|| StateTransitionTable::build(FORWARD_EDGES, NO_SAFETY_OVERRIDES));

static NO_SUCCESSORS: BTreeSet<JobState> = BTreeSet::new();

/// Mapping from a state to the set of states it may move to.
#[derive(Debug)]
pub struct StateTransitionTable {
    edges: BTreeMap<JobState, BTreeSet<JobState>>,
}

impl StateTransitionTable {
    /// The table for jobs that go through a safety check.
    pub fn standard() -> &'static StateTransitionTable {
        &STANDARD
    }

    /// The table for jobs that submit without a safety check.
    pub fn without_safety_check() -> &'static StateTransitionTable {
        &WITHOUT_SAFETY_CHECK
    }

    pub fn for_kind(kind: JobKind) -> &'static StateTransitionTable {
        if kind.requires_safety_check() {
            Self::standard()
        } else {
            Self::without_safety_check()
        }
    }

    fn build(
        forward: &[(JobState, &[JobState])],
        overrides: &[(JobState, &[JobState])],
    ) -> Self {
        let mut edges: BTreeMap<JobState, BTreeSet<JobState>> = JobState::ALL
            .into_iter()
            .map(|state| (state, BTreeSet::new()))
            .collect();

        for &(from, targets) in forward {
            edges.entry(from).or_default().extend(targets.iter().copied());
        }
        for &(from, targets) in overrides {
            edges.insert(from, targets.iter().copied().collect());
        }

        for state in JobState::ALL {
            let successors = edges.entry(state).or_default();
            if !state.is_terminal() && state != Error {
                successors.insert(Error);
            }
            if state.is_active() {
                successors.insert(UserRequestedAbort);
            }
        }

        Self { edges }
    }

    /// Permitted successors of `current`. Empty for terminal states.
    pub fn allowed_next_states(&self, current: JobState) -> &BTreeSet<JobState> {
        self.edges.get(&current).unwrap_or(&NO_SUCCESSORS)
    }

    pub fn is_legal_transition(&self, current: JobState, next: JobState) -> bool {
        self.allowed_next_states(current).contains(&next)
    }

    /// Every `(from, to)` edge in the table, in state order.
    pub fn edges(&self) -> impl Iterator<Item = (JobState, JobState)> + '_ {
        self.edges
            .iter()
            .flat_map(|(&from, targets)| targets.iter().map(move |&to| (from, to)))
    }
}
