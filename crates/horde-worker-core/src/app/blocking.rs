//! BlockingWorkerLoop - 同期コードから使うための薄いラッパー
//!
//! Owns a current-thread tokio runtime and blocks on the async worker loop.
//! Blocking collaborators still run on the runtime's blocking pool (see
//! [`crate::ports::Blocking`]), so a long generation does not stop the loop
//! from noticing a cancellation.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use super::builder::WorkerLoopBuilder;
use super::status::WorkerStatus;
use super::worker_loop::WorkerLoop;
use crate::domain::errors::DispatchError;
use crate::domain::ids::JobId;
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::JobReport;
use crate::error::WorkerError;

pub struct BlockingWorkerLoop {
    runtime: Runtime,
    worker: Arc<WorkerLoop>,
}

impl BlockingWorkerLoop {
    pub fn new(worker: WorkerLoop) -> Result<Self, WorkerError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            worker: Arc::new(worker),
        })
    }

    pub fn build(builder: WorkerLoopBuilder) -> Result<Self, WorkerError> {
        Self::new(builder.build()?)
    }

    pub fn run_job(&self, job: JobDescriptor) -> JobReport {
        self.runtime.block_on(self.worker.run_job(job))
    }

    pub fn run_once(&self) -> Result<Option<JobReport>, DispatchError> {
        self.runtime.block_on(self.worker.run_once())
    }

    pub fn cancel(&self, job_id: &JobId) -> bool {
        self.worker.cancel(job_id)
    }

    pub fn status(&self) -> WorkerStatus {
        self.worker.status()
    }

    /// The shared loop, e.g. to cancel from another thread.
    pub fn worker(&self) -> Arc<WorkerLoop> {
        Arc::clone(&self.worker)
    }
}
