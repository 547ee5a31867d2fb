//! No-op collaborators for pipelines that do not need every stage.

use async_trait::async_trait;

use crate::domain::errors::CollaboratorError;
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::GenerationOutput;
use crate::ports::{CancelSignal, PostProcessor, Preloader};

/// Preloader for backends that load models lazily.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreloader;

#[async_trait]
impl Preloader for NoopPreloader {
    async fn preload(&self, _: &JobDescriptor, _: &CancelSignal) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Hands generation output through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughPostProcessor;

#[async_trait]
impl PostProcessor for PassthroughPostProcessor {
    async fn post_process(
        &self,
        _: &JobDescriptor,
        output: GenerationOutput,
        _: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        Ok(output)
    }
}
