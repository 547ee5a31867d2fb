use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use horde_worker_core::app::{WorkerConfig, WorkerLoopBuilder};
use horde_worker_core::domain::{
    Artifact, CollaboratorError, GenerationOutput, GenerationResult, JobDescriptor, JobKind,
    JobState, SafetyVerdict, StateTransitionTable,
};
use horde_worker_core::impls::InMemoryDispatch;
use horde_worker_core::ports::{
    CancelSignal, Generator, IdGenerator, PostProcessor, Preloader, SafetyChecker, SystemClock,
    UlidGenerator,
};

/// Runs simulated Horde jobs through the worker state machine.
#[derive(Debug, Parser)]
#[command(name = "horde-worker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Enqueue simulated jobs and run them to a terminal state.
    Run {
        /// TOML worker config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 3)]
        jobs: usize,

        #[arg(long, value_enum, default_value_t = KindArg::Image)]
        kind: KindArg,

        /// Generations per job.
        #[arg(long, default_value_t = 1)]
        batch: usize,

        /// Make every job fail at this stage.
        #[arg(long, value_enum)]
        fail_stage: Option<FailStage>,

        /// Overrides `max_concurrent_jobs` from the config.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the transition table for a job kind.
    Table {
        #[arg(long, value_enum, default_value_t = KindArg::Image)]
        kind: KindArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Image,
    Text,
    Alchemy,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Image => JobKind::Image,
            KindArg::Text => JobKind::Text,
            KindArg::Alchemy => JobKind::Alchemy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FailStage {
    Preload,
    Generate,
    PostProcess,
    SafetyCheck,
    Submit,
}

/// Stand-in for a real backend: sleeps a little per stage.
struct Simulated {
    fail_at: Option<FailStage>,
    stage_time: Duration,
}

impl Simulated {
    async fn work(&self, stage: FailStage, cancel: &CancelSignal) -> Result<(), CollaboratorError> {
        tokio::select! {
            _ = tokio::time::sleep(self.stage_time) => {}
            _ = cancel.cancelled() => return Err(CollaboratorError::backend("interrupted")),
        }
        if self.fail_at == Some(stage) {
            return Err(CollaboratorError::backend(format!("simulated {stage:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl Preloader for Simulated {
    async fn preload(
        &self,
        _: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<(), CollaboratorError> {
        self.work(FailStage::Preload, cancel).await
    }
}

#[async_trait]
impl Generator for Simulated {
    async fn generate(
        &self,
        job: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        self.work(FailStage::Generate, cancel).await?;
        let results = job
            .generation_ids()
            .iter()
            .map(|id| GenerationResult {
                generation_id: id.clone(),
                artifact: match job.kind() {
                    JobKind::Text => Artifact::Text(format!("generated text for {id}")),
                    JobKind::Image | JobKind::Alchemy => {
                        Artifact::Url(format!("https://example.invalid/{id}.webp"))
                    }
                },
            })
            .collect();
        Ok(GenerationOutput::new(results))
    }
}

#[async_trait]
impl PostProcessor for Simulated {
    async fn post_process(
        &self,
        _: &JobDescriptor,
        output: GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        self.work(FailStage::PostProcess, cancel).await?;
        Ok(output)
    }
}

#[async_trait]
impl SafetyChecker for Simulated {
    async fn check(
        &self,
        _: &JobDescriptor,
        _: &GenerationOutput,
        cancel: &CancelSignal,
    ) -> Result<SafetyVerdict, CollaboratorError> {
        self.work(FailStage::SafetyCheck, cancel).await?;
        Ok(SafetyVerdict::Pass)
    }
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    match Cli::parse().command {
        Command::Run {
            config,
            jobs,
            kind,
            batch,
            fail_stage,
            concurrency,
        } => {
            let mut config = match config {
                Some(path) => WorkerConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => WorkerConfig::default(),
            };
            if let Some(concurrency) = concurrency {
                config.max_concurrent_jobs = concurrency;
            }
            run(config, jobs, kind.into(), batch, fail_stage).await
        }
        Command::Table { kind } => {
            print_table(kind.into());
            Ok(())
        }
    }
}

async fn run(
    config: WorkerConfig,
    jobs: usize,
    kind: JobKind,
    batch: usize,
    fail_stage: Option<FailStage>,
) -> anyhow::Result<()> {
    let dispatch = Arc::new(InMemoryDispatch::new());
    dispatch.set_reward(Some(10.0));
    if fail_stage == Some(FailStage::Submit) {
        dispatch.fail_next_submits(usize::MAX);
    }

    let ids = UlidGenerator::new(SystemClock);
    for _ in 0..jobs {
        let job = JobDescriptor::builder(ids.generate_job_id(), kind)
            .batch_size(batch)
            .requires_post_processing(true)
            .parameters(serde_json::json!({ "prompt": "a lighthouse at dusk", "steps": 20 }))
            .build(&ids)?;
        dispatch.push(job);
    }

    let backend = Arc::new(Simulated {
        fail_at: fail_stage,
        stage_time: Duration::from_millis(50),
    });
    let worker = Arc::new(
        WorkerLoopBuilder::new(config)
            .dispatch(dispatch.clone())
            .preloader(backend.clone())
            .generator(backend.clone())
            .post_processor(backend.clone())
            .safety_checker(backend)
            .build()?,
    );

    info!(jobs, ?kind, "starting worker");
    let mut handle = Arc::clone(&worker).spawn();
    for _ in 0..jobs {
        let Some(report) = handle.next_report().await else {
            break;
        };
        println!("{}", serde_json::to_string(&report)?);
    }
    handle.shutdown_and_join().await;

    println!("{}", serde_json::to_string(&worker.status())?);
    Ok(())
}

fn print_table(kind: JobKind) {
    let table = StateTransitionTable::for_kind(kind);
    for state in JobState::ALL {
        let next = table.allowed_next_states(state);
        if next.is_empty() {
            println!("{:<24} (terminal)", state.as_str());
        } else {
            let next: Vec<&str> = next.iter().map(|s| s.as_str()).collect();
            println!("{:<24} -> {}", state.as_str(), next.join(", "));
        }
    }
}
