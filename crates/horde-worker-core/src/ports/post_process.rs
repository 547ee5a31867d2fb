//! PostProcessor port - 生成結果の後処理 (upscale, face fix, ...)

use async_trait::async_trait;

use crate::domain::errors::CollaboratorError;
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::GenerationOutput;
use crate::ports::CancelSignal;

#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn post_process(
        &self,
        job: &JobDescriptor,
        output: GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError>;
}
