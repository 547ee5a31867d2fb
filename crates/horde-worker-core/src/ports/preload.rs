//! Preloader port - モデル等のロード

use async_trait::async_trait;

use crate::domain::errors::CollaboratorError;
use crate::domain::job::JobDescriptor;
use crate::ports::CancelSignal;

/// Loads what a job needs (models, LoRAs, ...) before generation.
///
/// Resource caching across jobs is the implementation's business.
#[async_trait]
pub trait Preloader: Send + Sync {
    async fn preload(
        &self,
        job: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<(), CollaboratorError>;
}
