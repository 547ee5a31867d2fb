//! Blocking collaborators.
//!
//! Backends that only offer a synchronous API implement the `Blocking*`
//! traits and are wrapped in [`Blocking`] to plug into the async worker loop.
//! Calls run on tokio's blocking pool so they never stall the scheduler.
//! A blocking collaborator can poll [`CancelSignal::is_cancelled`] between
//! steps to stop early.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinError;

use crate::domain::errors::{CollaboratorError, WorkerErrorKind};
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::{GenerationOutput, SafetyVerdict};
use crate::ports::{CancelSignal, Generator, PostProcessor, Preloader, SafetyChecker};

pub trait BlockingPreloader: Send + Sync + 'static {
    fn preload(&self, job: &JobDescriptor, cancel: &CancelSignal) -> Result<(), CollaboratorError>;
}

pub trait BlockingGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        job: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError>;
}

pub trait BlockingPostProcessor: Send + Sync + 'static {
    fn post_process(
        &self,
        job: &JobDescriptor,
        output: GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError>;
}

pub trait BlockingSafetyChecker: Send + Sync + 'static {
    fn check(
        &self,
        job: &JobDescriptor,
        output: &GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<SafetyVerdict, CollaboratorError>;
}

/// Adapter from a `Blocking*` collaborator to its async port.
pub struct Blocking<T>(Arc<T>);

impl<T> Blocking<T> {
    pub fn new(inner: T) -> Self {
        Self(Arc::new(inner))
    }
}

impl<T> Clone for Blocking<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

fn join_failure(err: JoinError) -> CollaboratorError {
    CollaboratorError::new(
        WorkerErrorKind::UnhandledException,
        format!("blocking collaborator did not finish: {err}"),
    )
}

#[async_trait]
impl<T: BlockingPreloader> Preloader for Blocking<T> {
    async fn preload(
        &self,
        job: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<(), CollaboratorError> {
        let (inner, job, cancel) = (Arc::clone(&self.0), job.clone(), cancel.clone());
        tokio::task::spawn_blocking(move || inner.preload(&job, &cancel))
            .await
            .map_err(join_failure)?
    }
}

#[async_trait]
impl<T: BlockingGenerator> Generator for Blocking<T> {
    async fn generate(
        &self,
        job: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        let (inner, job, cancel) = (Arc::clone(&self.0), job.clone(), cancel.clone());
        tokio::task::spawn_blocking(move || inner.generate(&job, &cancel))
            .await
            .map_err(join_failure)?
    }
}

#[async_trait]
impl<T: BlockingPostProcessor> PostProcessor for Blocking<T> {
    async fn post_process(
        &self,
        job: &JobDescriptor,
        output: GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        let (inner, job, cancel) = (Arc::clone(&self.0), job.clone(), cancel.clone());
        tokio::task::spawn_blocking(move || inner.post_process(&job, output, &cancel))
            .await
            .map_err(join_failure)?
    }
}

#[async_trait]
impl<T: BlockingSafetyChecker> SafetyChecker for Blocking<T> {
    async fn check(
        &self,
        job: &JobDescriptor,
        output: &GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<SafetyVerdict, CollaboratorError> {
        let (inner, job, output, cancel) = (
            Arc::clone(&self.0),
            job.clone(),
            output.clone(),
            cancel.clone(),
        );
        tokio::task::spawn_blocking(move || inner.check(&job, &output, &cancel))
            .await
            .map_err(join_failure)?
    }
}
