//! Scripted collaborators for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::app::builder::WorkerLoopBuilder;
use crate::app::config::WorkerConfig;
use crate::domain::errors::CollaboratorError;
use crate::domain::ids::{GenerationId, JobId};
use crate::domain::job::{JobDescriptor, JobKind};
use crate::domain::outcome::{Artifact, GenerationOutput, GenerationResult, SafetyVerdict};
use crate::impls::InMemoryDispatch;
use crate::ports::{
    BlockingGenerator, CancelSignal, Generator, PostProcessor, Preloader, SafetyChecker,
    SystemClock, UlidGenerator,
};

/// What a scripted collaborator does when called.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Succeed,
    /// Fail the first `n` calls, then succeed.
    FailTimes(usize, CollaboratorError),
    Fail(CollaboratorError),
    /// Run until cancelled, then stop with an error.
    WaitForCancel,
    /// Keep running for the given time no matter what.
    IgnoreCancel(Duration),
    Panic,
}

#[derive(Debug)]
pub(crate) struct Script {
    behavior: Behavior,
    calls: AtomicUsize,
    /// Notified on every call.
    pub entered: Notify,
}

impl Script {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn play(&self, cancel: &CancelSignal) -> Result<(), CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::FailTimes(n, err) if call < *n => Err(err.clone()),
            Behavior::FailTimes(..) => Ok(()),
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::WaitForCancel => {
                cancel.cancelled().await;
                Err(CollaboratorError::backend("stopped on request"))
            }
            Behavior::IgnoreCancel(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
            Behavior::Panic => panic!("scripted collaborator panicked"),
        }
    }
}

/// One text artifact per generation id.
pub(crate) fn echo(job: &JobDescriptor) -> GenerationOutput {
    GenerationOutput::new(
        job.generation_ids()
            .iter()
            .map(|id| GenerationResult {
                generation_id: id.clone(),
                artifact: Artifact::Text(format!("output for {id}")),
            })
            .collect(),
    )
}

pub(crate) struct ScriptedPreloader(pub Script);

impl ScriptedPreloader {
    pub fn new(behavior: Behavior) -> Self {
        Self(Script::new(behavior))
    }
}

#[async_trait]
impl Preloader for ScriptedPreloader {
    async fn preload(
        &self,
        _: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<(), CollaboratorError> {
        self.0.play(cancel).await
    }
}

/// Echoes one text artifact per generation id.
pub(crate) struct ScriptedGenerator {
    pub script: Script,
    /// Drop this many results from the end of the batch.
    short_by: usize,
}

impl ScriptedGenerator {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            script: Script::new(behavior),
            short_by: 0,
        }
    }

    pub fn ok() -> Self {
        Self::new(Behavior::Succeed)
    }

    pub fn short_by(mut self, n: usize) -> Self {
        self.short_by = n;
        self
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        job: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        self.script.play(cancel).await?;
        let mut output = echo(job);
        let keep = output.results.len().saturating_sub(self.short_by);
        output.results.truncate(keep);
        Ok(output)
    }
}

pub(crate) struct ScriptedPostProcessor(pub Script);

impl ScriptedPostProcessor {
    pub fn new(behavior: Behavior) -> Self {
        Self(Script::new(behavior))
    }
}

#[async_trait]
impl PostProcessor for ScriptedPostProcessor {
    async fn post_process(
        &self,
        _: &JobDescriptor,
        output: GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        self.0.play(cancel).await?;
        Ok(output)
    }
}

pub(crate) struct ScriptedSafetyChecker {
    pub script: Script,
    verdict: SafetyVerdict,
}

impl ScriptedSafetyChecker {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            script: Script::new(behavior),
            verdict: SafetyVerdict::Pass,
        }
    }

    pub fn pass() -> Self {
        Self::new(Behavior::Succeed)
    }

    pub fn flagged(nsfw: bool, csam: bool) -> Self {
        Self {
            script: Script::new(Behavior::Succeed),
            verdict: SafetyVerdict::Flagged { nsfw, csam },
        }
    }
}

#[async_trait]
impl SafetyChecker for ScriptedSafetyChecker {
    async fn check(
        &self,
        _: &JobDescriptor,
        _: &GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<SafetyVerdict, CollaboratorError> {
        self.script.play(cancel).await?;
        Ok(self.verdict)
    }
}

pub(crate) struct BlockingEchoGenerator;

impl BlockingGenerator for BlockingEchoGenerator {
    fn generate(
        &self,
        job: &JobDescriptor,
        _: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        Ok(echo(job))
    }
}

/// A job of `kind` with a batch of `batch` generations.
pub(crate) fn job(id: &str, kind: JobKind, batch: usize) -> JobDescriptor {
    JobDescriptor::builder(JobId::new(id), kind)
        .generation_ids((0..batch).map(|i| GenerationId::new(format!("{id}-g{i}"))))
        .requires_post_processing(true)
        .build(&UlidGenerator::new(SystemClock))
        .expect("valid test job")
}

/// Config with tiny delays so retry paths run fast.
pub(crate) fn fast_config() -> WorkerConfig {
    WorkerConfig {
        pop_interval_ms: 5,
        stage_retry_delay_ms: 1,
        job_submit_retry_delay_ms: 1,
        cancel_grace_period_ms: 100,
        ..WorkerConfig::default()
    }
}

/// Collaborators for one worker; every field can be swapped before `build`.
pub(crate) struct Rig {
    pub config: WorkerConfig,
    pub dispatch: Arc<InMemoryDispatch>,
    pub preloader: Arc<ScriptedPreloader>,
    pub generator: Arc<ScriptedGenerator>,
    pub post_processor: Arc<ScriptedPostProcessor>,
    pub safety_checker: Arc<ScriptedSafetyChecker>,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            config: fast_config(),
            dispatch: Arc::new(InMemoryDispatch::new()),
            preloader: Arc::new(ScriptedPreloader::new(Behavior::Succeed)),
            generator: Arc::new(ScriptedGenerator::ok()),
            post_processor: Arc::new(ScriptedPostProcessor::new(Behavior::Succeed)),
            safety_checker: Arc::new(ScriptedSafetyChecker::pass()),
        }
    }

    pub fn builder(&self) -> WorkerLoopBuilder {
        WorkerLoopBuilder::new(self.config.clone())
            .dispatch(self.dispatch.clone())
            .preloader(self.preloader.clone())
            .generator(self.generator.clone())
            .post_processor(self.post_processor.clone())
            .safety_checker(self.safety_checker.clone())
    }
}
