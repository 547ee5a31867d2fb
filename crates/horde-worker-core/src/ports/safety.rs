//! SafetyChecker port - NSFW / CSAM 判定

use async_trait::async_trait;

use crate::domain::errors::CollaboratorError;
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::{GenerationOutput, SafetyVerdict};
use crate::ports::CancelSignal;

/// Classifies generated output.
///
/// Censoring is decided by the worker loop from the verdict and the job's
/// source metadata; the checker only reports what it saw.
#[async_trait]
pub trait SafetyChecker: Send + Sync {
    async fn check(
        &self,
        job: &JobDescriptor,
        output: &GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<SafetyVerdict, CollaboratorError>;
}
