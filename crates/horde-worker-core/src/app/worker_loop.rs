//! WorkerLoop - ジョブ実行ループ
//!
//! # フロー
//! 1. DispatchSource::pop_job() でジョブ取得
//! 2. JobProgressTracker を NOT_STARTED で作成
//! 3. preload → generate → (post_process) → (safety_check) の順に呼び出し、
//!    各ステージの前後で状態遷移
//! 4. submit_result() で結果を返却 → COMPLETE
//!
//! 失敗時は ERROR → ABORTED → submit_failure() → REPORTED_FAILED、
//! 報告すらできなければ ABANDONED。
//!
//! # キャンセル
//! - `cancel(job_id)` はフラグを立てるだけ（協調的キャンセル）
//! - ステージ呼び出しの前と、呼び出し中（select で競合）に観測する
//! - 呼び出し中に観測した場合は grace period だけ完了を待つ
//! - SUBMITTING に入った後の cancel は拒否する（もう遅い）
//! - 同じ job id の実行が重なっても、実行ごとに別エントリで管理する

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::config::WorkerConfig;
use super::retry::RetryPolicy;
use super::status::WorkerStatus;
use crate::domain::errors::{CollaboratorError, DispatchError, TransitionError, WorkerErrorKind};
use crate::domain::ids::JobId;
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::{FailureReport, JobReport, SubmitAck, Submission};
use crate::domain::state::{JobState, Stage};
use crate::domain::tracker::{FailureRecord, JobProgressTracker, Transition};
use crate::ports::{
    CancelHandle, CancelSignal, Clock, DispatchSource, Generator, PostProcessor, Preloader,
    SafetyChecker,
};

/// Key of one `run_job` call. Job ids may repeat, run ids do not.
pub(crate) type RunId = u64;

#[derive(Debug)]
pub(crate) struct InFlightRun {
    job_id: JobId,
    cancel: CancelHandle,
    /// Set on entering SUBMITTING. `cancel` is refused from then on.
    submitting: bool,
}

/// Drives popped jobs through the pipeline.
///
/// Build one with [`super::builder::WorkerLoopBuilder`].
pub struct WorkerLoop {
    pub(crate) config: WorkerConfig,
    pub(crate) dispatch: Arc<dyn DispatchSource>,
    pub(crate) preloader: Arc<dyn Preloader>,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) post_processor: Arc<dyn PostProcessor>,
    pub(crate) safety_checker: Arc<dyn SafetyChecker>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) in_flight: Mutex<HashMap<RunId, InFlightRun>>,
    pub(crate) next_run: AtomicU64,
    pub(crate) counts: Mutex<WorkerStatus>,
}

impl WorkerLoop {
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one job from NOT_STARTED to a terminal state.
    ///
    /// Never fails: every failure ends up in the report's final state and
    /// failure list.
    pub async fn run_job(&self, job: JobDescriptor) -> JobReport {
        let job = Arc::new(job);
        let job_id = job.job_id().clone();
        let (registration, signal) = self.register(&job_id);

        let tracker = JobProgressTracker::new(Arc::clone(&job), self.clock.now())
            .with_mode(self.config.transition_mode())
            .with_extra_logging(self.config.extra_logging);
        let mut run = JobRun {
            worker: self,
            job: Arc::clone(&job),
            tracker,
            signal,
            run_id: registration.run_id,
            reward: None,
        };

        let span = info_span!("job", job_id = %job_id, kind = ?job.kind());
        run.drive().instrument(span).await;

        drop(registration);
        let report = run.into_report();
        self.counts.lock().record(report.final_state);
        report
    }

    /// Pop one job and run it. `Ok(None)` when there was no work.
    pub async fn run_once(&self) -> Result<Option<JobReport>, DispatchError> {
        match self.dispatch.pop_job().await? {
            Some(job) => Ok(Some(self.run_job(job).await)),
            None => Ok(None),
        }
    }

    fn register(&self, job_id: &JobId) -> (Registration<'_>, CancelSignal) {
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let (cancel, signal) = CancelHandle::new();
        let mut in_flight = self.in_flight.lock();
        if in_flight.values().any(|run| &run.job_id == job_id) {
            warn!(%job_id, "job id already in flight; running it again alongside");
        }
        in_flight.insert(
            run_id,
            InFlightRun {
                job_id: job_id.clone(),
                cancel,
                submitting: false,
            },
        );
        (
            Registration {
                worker: self,
                run_id,
            },
            signal,
        )
    }

    /// Ask every in-flight run of `job_id` to stop.
    ///
    /// Returns false if no run took the signal: the job is unknown, or its
    /// result is already being submitted.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let in_flight = self.in_flight.lock();
        let mut signalled = false;
        for run in in_flight
            .values()
            .filter(|run| &run.job_id == job_id && !run.submitting)
        {
            run.cancel.cancel();
            signalled = true;
        }
        if signalled {
            info!(%job_id, "cancellation requested");
        } else if in_flight.values().any(|run| &run.job_id == job_id) {
            debug!(%job_id, "cancellation refused; result already submitting");
        }
        signalled
    }

    pub fn status(&self) -> WorkerStatus {
        let mut status = self.counts.lock().clone();
        status.in_flight = self.in_flight.lock().len();
        status
    }

    /// Report for a run whose task panicked before it could report itself.
    fn panicked_report(&self, job_id: JobId, err: &JoinError) -> JobReport {
        error!(%job_id, error = %err, "job task panicked; abandoning");
        let at = self.clock.now();
        self.counts.lock().record(JobState::Abandoned);
        JobReport {
            job_id,
            final_state: JobState::Abandoned,
            history: vec![Transition {
                state: JobState::Abandoned,
                at,
            }],
            failures: vec![FailureRecord {
                state: JobState::Abandoned,
                kind: WorkerErrorKind::UnhandledException,
                reason: format!("job task panicked: {err}"),
                at,
            }],
            reward: None,
        }
    }

    /// Start popping and running jobs in the background.
    ///
    /// At most `max_concurrent_jobs` run at once. Reports of finished jobs
    /// are available from [`WorkerHandle::next_report`].
    pub fn spawn(self: Arc<Self>) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(pool_loop(self, shutdown_rx, reports_tx));
        WorkerHandle {
            shutdown_tx,
            reports: reports_rx,
            join,
        }
    }
}

/// Removes a run's in-flight entry when dropped, also when the run panics.
struct Registration<'w> {
    worker: &'w WorkerLoop,
    run_id: RunId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.worker.in_flight.lock().remove(&self.run_id);
    }
}

/// Handle to a running worker pool.
/// - `request_shutdown()` で新規 pop を止める（実行中のジョブは止めない）
/// - `shutdown_and_join()` で実行中のジョブの終了まで待つ
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    reports: mpsc::UnboundedReceiver<JobReport>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn request_shutdown(&self) {
        // the pool may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Next finished job report. `None` once the pool has stopped.
    pub async fn next_report(&mut self) -> Option<JobReport> {
        self.reports.recv().await
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            error!(error = %err, "worker pool task failed");
        }
    }
}

async fn pool_loop(
    worker: Arc<WorkerLoop>,
    mut shutdown_rx: watch::Receiver<bool>,
    reports: mpsc::UnboundedSender<JobReport>,
) {
    let slots = Arc::new(Semaphore::new(worker.config.max_concurrent_jobs));
    let mut jobs: JoinSet<()> = JoinSet::new();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // 空きスロットを待つ間も shutdown と終了済みジョブの回収を行う
        let permit = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                log_join(joined);
                continue;
            }
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        match worker.dispatch.pop_job().await {
            Ok(Some(job)) => {
                let worker = Arc::clone(&worker);
                let reports = reports.clone();
                jobs.spawn(async move {
                    let job_id = job.job_id().clone();
                    let run = tokio::spawn({
                        let worker = Arc::clone(&worker);
                        async move { worker.run_job(job).await }
                    });
                    let report = match run.await {
                        Ok(report) => report,
                        Err(err) => worker.panicked_report(job_id, &err),
                    };
                    drop(permit);
                    // nobody listening is fine
                    let _ = reports.send(report);
                });
            }
            Ok(None) => {
                drop(permit);
                if !idle(&mut shutdown_rx, worker.config.pop_interval()).await {
                    break;
                }
            }
            Err(err) => {
                drop(permit);
                warn!(error = %err, "failed to pop a job");
                if !idle(&mut shutdown_rx, worker.config.pop_interval()).await {
                    break;
                }
            }
        }
    }

    debug!(in_flight = jobs.len(), "worker pool stopping; waiting for in-flight jobs");
    while let Some(joined) = jobs.join_next().await {
        log_join(joined);
    }
}

/// Sleep for `interval` unless shutdown is requested first.
/// Returns false when the pool should stop.
async fn idle(shutdown_rx: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "job task panicked");
    }
}

/// Why the forward pipeline stopped early.
#[derive(Debug)]
enum Interrupt {
    /// A collaborator failed after its last attempt.
    Failed(CollaboratorError),
    /// A user abort was observed and USER_REQUESTED_ABORT entered.
    Cancelled { stopped_in_time: bool },
    /// The driver attempted a transition the table does not allow.
    Illegal(TransitionError),
}

/// One job's run. Owns the tracker exclusively.
struct JobRun<'w> {
    worker: &'w WorkerLoop,
    job: Arc<JobDescriptor>,
    tracker: JobProgressTracker,
    signal: CancelSignal,
    run_id: RunId,
    reward: Option<f64>,
}

impl<'w> JobRun<'w> {
    async fn drive(&mut self) {
        info!(
            batch = self.job.batch_size(),
            origin = ?self.job.source().origin,
            "job started"
        );

        match self.pipeline().await {
            Ok(()) => {}
            Err(Interrupt::Failed(err)) => self.report_failure(err).await,
            Err(Interrupt::Cancelled { stopped_in_time }) => {
                self.finish_user_abort(stopped_in_time).await
            }
            Err(Interrupt::Illegal(err)) => self.escalate(err).await,
        }

        let state = self.tracker.current_state();
        match state {
            JobState::ReportedFailed => warn!(%state, "job finished"),
            s if s.is_terminal() && !s.is_failing() => info!(%state, "job finished"),
            _ => error!(%state, "job finished without the dispatch source being told"),
        }
    }

    async fn pipeline(&mut self) -> Result<(), Interrupt> {
        let worker = self.worker;
        let job = Arc::clone(&self.job);
        let signal = self.signal.clone();

        self.step(JobState::Preloading)?;
        self.run_stage(Stage::Preload, || worker.preloader.preload(&job, &signal))
            .await?;
        self.step(JobState::PreloadingComplete)?;

        self.step(JobState::Generating)?;
        let mut output = self
            .run_stage(Stage::Generate, || worker.generator.generate(&job, &signal))
            .await?;
        if output.len() != job.batch_size() {
            return Err(Interrupt::Failed(CollaboratorError::backend(format!(
                "generator returned {} results for a batch of {}",
                output.len(),
                job.batch_size()
            ))));
        }

        if job.requires_post_processing() {
            self.step(JobState::PostProcessing)?;
            let generated = output;
            output = self
                .run_stage(Stage::PostProcess, || {
                    worker
                        .post_processor
                        .post_process(&job, generated.clone(), &signal)
                })
                .await?;
        }

        let safety = if job.requires_safety_check() {
            self.step(JobState::SafetyChecking)?;
            let verdict = self
                .run_stage(Stage::SafetyCheck, || {
                    worker.safety_checker.check(&job, &output, &signal)
                })
                .await?;
            Some(verdict)
        } else {
            None
        };

        let censored = safety.is_some_and(|v| v.requires_censorship(job.source().censor_nsfw));
        if censored {
            info!(verdict = ?safety, "output censored");
        }

        self.step(JobState::PendingSubmit)?;
        self.begin_submit()?;

        let submission = Submission {
            job_id: job.job_id().clone(),
            results: output.results,
            safety,
            censored,
        };
        self.submit(&submission).await
    }

    /// Forward transition, unless a user abort got there first.
    fn step(&mut self, next: JobState) -> Result<(), Interrupt> {
        if self.signal.is_cancelled() {
            self.enter_user_abort()?;
            return Err(Interrupt::Cancelled {
                stopped_in_time: true,
            });
        }
        self.commit(next)
    }

    /// Forward to SUBMITTING and stop accepting cancellation.
    fn begin_submit(&mut self) -> Result<(), Interrupt> {
        {
            // `cancel` takes the same lock: it either lands before this or is refused
            let mut in_flight = self.worker.in_flight.lock();
            if let Some(run) = in_flight
                .get_mut(&self.run_id)
                .filter(|_| !self.signal.is_cancelled())
            {
                run.submitting = true;
            }
        }
        self.step(JobState::Submitting)
    }

    fn commit(&mut self, next: JobState) -> Result<(), Interrupt> {
        let at = self.worker.clock.now();
        self.tracker
            .transition(next, at)
            .map(|_| ())
            .map_err(Interrupt::Illegal)
    }

    fn enter_user_abort(&mut self) -> Result<(), Interrupt> {
        info!(state = %self.tracker.current_state(), "user requested abort");
        self.commit(JobState::UserRequestedAbort)
    }

    /// Call a stage collaborator with in-place retries.
    async fn run_stage<T, F, Fut>(&mut self, stage: Stage, mut call: F) -> Result<T, Interrupt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let policy = RetryPolicy::for_stage(&self.worker.config, stage);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.race(call()).await? {
                Ok(value) => return Ok(value),
                Err(err) if policy.should_retry(attempts) => {
                    warn!(%stage, attempt = attempts, error = %err, "stage failed; retrying");
                    self.pause(policy.next_delay(attempts)).await?;
                }
                Err(err) => {
                    warn!(%stage, attempts, error = %err, "stage failed");
                    return Err(Interrupt::Failed(err));
                }
            }
        }
    }

    /// Run `call` unless the job is cancelled first.
    ///
    /// On cancellation the call gets the grace period to finish on its own.
    async fn race<R>(&mut self, call: impl Future<Output = R>) -> Result<R, Interrupt> {
        let signal = self.signal.clone();
        let mut call = std::pin::pin!(call);
        tokio::select! {
            biased;
            _ = signal.cancelled() => {}
            out = &mut call => return Ok(out),
        }

        self.enter_user_abort()?;
        let grace = self.worker.config.cancel_grace_period();
        let stopped_in_time = tokio::time::timeout(grace, call).await.is_ok();
        Err(Interrupt::Cancelled { stopped_in_time })
    }

    async fn pause(&mut self, delay: Duration) -> Result<(), Interrupt> {
        let signal = self.signal.clone();
        tokio::select! {
            biased;
            _ = signal.cancelled() => {}
            _ = tokio::time::sleep(delay) => return Ok(()),
        }
        self.enter_user_abort()?;
        Err(Interrupt::Cancelled {
            stopped_in_time: true,
        })
    }

    /// Submit the result. Cancellation is no longer observed here.
    async fn submit(&mut self, submission: &Submission) -> Result<(), Interrupt> {
        let worker = self.worker;
        let policy = RetryPolicy::for_submit(&worker.config);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match worker
                .dispatch
                .submit_result(&submission.job_id, submission)
                .await
            {
                Ok(SubmitAck::Accepted { reward }) => {
                    self.reward = reward;
                    self.commit(JobState::SubmitComplete)?;
                    info!(?reward, "result submitted");
                    return self.commit(JobState::Complete);
                }
                Ok(SubmitAck::Rejected { reason }) => {
                    warn!(stage = %Stage::Submit, %reason, "dispatch source rejected the result");
                    return self.abandon(
                        WorkerErrorKind::UnhandledException,
                        format!("submission rejected: {reason}"),
                    );
                }
                Err(err) if err.is_retryable() && policy.should_retry(attempts) => {
                    let delay = policy.next_delay(attempts);
                    warn!(
                        stage = %Stage::Submit,
                        attempt = attempts,
                        error = %err,
                        ?delay,
                        "submit failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        stage = %Stage::Submit,
                        attempts,
                        error = %err,
                        "giving up on submitting the result"
                    );
                    return self.abandon(WorkerErrorKind::NetworkIssue, err.to_string());
                }
            }
        }
    }

    fn abandon(&mut self, kind: WorkerErrorKind, reason: String) -> Result<(), Interrupt> {
        let at = self.worker.clock.now();
        self.tracker.record_failure(kind, reason, at);
        self.commit(JobState::Abandoned)
    }

    /// ERROR → ABORTED → report upstream → REPORTED_FAILED (or ABANDONED).
    async fn report_failure(&mut self, err: CollaboratorError) {
        warn!(
            state = %self.tracker.current_state(),
            kind = %err.kind,
            error = %err.message,
            "job failed"
        );

        let at = self.worker.clock.now();
        if let Err(illegal) = self.tracker.fail(err.kind, err.message.clone(), at) {
            self.force_abandon(illegal);
            return;
        }
        if let Err(Interrupt::Illegal(illegal)) = self.commit(JobState::Aborted) {
            self.force_abandon(illegal);
            return;
        }

        let report = FailureReport {
            job_id: self.job.job_id().clone(),
            kind: err.kind,
            reason: err.message,
        };
        let next = match self.deliver_failure(&report).await {
            Ok(()) => JobState::ReportedFailed,
            Err(delivery) => {
                error!(
                    stage = %Stage::ReportFailure,
                    error = %delivery,
                    "could not report the failure"
                );
                let at = self.worker.clock.now();
                self.tracker
                    .record_failure(WorkerErrorKind::NetworkIssue, delivery.to_string(), at);
                JobState::Abandoned
            }
        };
        if let Err(Interrupt::Illegal(illegal)) = self.commit(next) {
            self.force_abandon(illegal);
        }
    }

    async fn deliver_failure(&self, report: &FailureReport) -> Result<(), DispatchError> {
        let policy = RetryPolicy::for_submit(&self.worker.config);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.worker.dispatch.submit_failure(report).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && policy.should_retry(attempts) => {
                    let delay = policy.next_delay(attempts);
                    warn!(
                        stage = %Stage::ReportFailure,
                        attempt = attempts,
                        error = %err,
                        ?delay,
                        "failure report failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// USER_REQUESTED_ABORT → USER_ABORT_COMPLETE (or ABANDONED).
    async fn finish_user_abort(&mut self, stopped_in_time: bool) {
        let next = if !stopped_in_time {
            let grace = self.worker.config.cancel_grace_period();
            warn!(?grace, "in-flight work did not stop within the grace period");
            let at = self.worker.clock.now();
            self.tracker.record_failure(
                WorkerErrorKind::SafeguardTimeout,
                format!("in-flight work still running after {grace:?}"),
                at,
            );
            JobState::Abandoned
        } else {
            match self.worker.dispatch.cancel(self.job.job_id()).await {
                Ok(()) => JobState::UserAbortComplete,
                Err(err) => {
                    warn!(
                        stage = %Stage::Cancel,
                        error = %err,
                        "could not acknowledge the cancellation"
                    );
                    let at = self.worker.clock.now();
                    self.tracker
                        .record_failure(WorkerErrorKind::NetworkIssue, err.to_string(), at);
                    JobState::Abandoned
                }
            }
        };
        if let Err(Interrupt::Illegal(illegal)) = self.commit(next) {
            self.force_abandon(illegal);
        }
    }

    /// An illegal transition is a driver bug: surface it and fail the job.
    async fn escalate(&mut self, err: TransitionError) {
        error!(error = %err, "illegal state transition");
        self.report_failure(CollaboratorError::new(
            WorkerErrorKind::UnhandledException,
            err.to_string(),
        ))
        .await;
    }

    /// Last resort when failure handling itself hit an illegal transition:
    /// walk the shortest legal path to ABANDONED.
    fn force_abandon(&mut self, err: TransitionError) {
        error!(error = %err, "illegal state transition while failing the job; abandoning");
        let at = self.worker.clock.now();
        self.tracker
            .record_failure(WorkerErrorKind::UnhandledException, err.to_string(), at);

        while !self.tracker.is_terminal() {
            let Some(next) = [JobState::Abandoned, JobState::Aborted, JobState::Error]
                .into_iter()
                .find(|s| self.tracker.can_transition_to(*s))
            else {
                break;
            };
            if self.tracker.transition(next, at).is_err() {
                break;
            }
        }
    }

    fn into_report(self) -> JobReport {
        JobReport {
            job_id: self.job.job_id().clone(),
            final_state: self.tracker.current_state(),
            history: self.tracker.history(),
            failures: self.tracker.failures().to_vec(),
            reward: self.reward,
        }
    }
}

#[cfg(test)]
#[path = "worker_loop_tests.rs"]
mod tests;
