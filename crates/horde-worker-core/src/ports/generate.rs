//! Generator port - 推論の実行

use async_trait::async_trait;

use crate::domain::errors::CollaboratorError;
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::GenerationOutput;
use crate::ports::CancelSignal;

/// Runs inference for every generation in the job's batch.
///
/// The output must hold one result per generation id, in batch order.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        job: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError>;
}
