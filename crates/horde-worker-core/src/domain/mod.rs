//! Domain model (IDs, states, transition table, tracker, outcomes, ...).
//!
//! ここには I/O を持たない型だけを置く。

pub mod errors;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod state;
pub mod tracker;
pub mod transitions;

pub use errors::{
    CollaboratorError, DispatchError, JobDescriptorError, TransitionError, WorkerErrorKind,
};
pub use ids::{GenerationId, JobId};
pub use job::{DispatchOrigin, JobDescriptor, JobDescriptorBuilder, JobKind, SourceMetadata};
pub use outcome::{
    Artifact, FailureReport, GenerationOutput, GenerationResult, JobReport, SafetyVerdict,
    SubmitAck, Submission,
};
pub use state::{JobState, Stage};
pub use tracker::{FailureRecord, JobProgressTracker, Transition, TransitionMode};
pub use transitions::StateTransitionTable;
