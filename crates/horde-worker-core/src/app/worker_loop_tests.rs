use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rstest::rstest;
use tokio::sync::Notify;

use super::*;
use crate::domain::job::{JobKind, SourceMetadata};
use crate::domain::outcome::{GenerationOutput, SafetyVerdict};
use crate::domain::transitions::StateTransitionTable;
use crate::impls::InMemoryDispatch;
use crate::ports::FixedClock;
use crate::testing::{
    Behavior, Rig, ScriptedGenerator, ScriptedPostProcessor, ScriptedPreloader,
    ScriptedSafetyChecker, echo, job,
};

use JobState::*;

fn states(report: &JobReport) -> Vec<JobState> {
    report.states()
}

fn gpu_oom() -> CollaboratorError {
    CollaboratorError::gpu_oom("CUDA out of memory")
}

#[tokio::test]
async fn happy_path_walks_every_stage() {
    let rig = Rig::new();
    rig.dispatch.set_reward(Some(10.5));
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 1)).await;

    assert_eq!(
        states(&report),
        vec![
            NotStarted,
            Preloading,
            PreloadingComplete,
            Generating,
            PostProcessing,
            SafetyChecking,
            PendingSubmit,
            Submitting,
            SubmitComplete,
            Complete,
        ]
    );
    assert_eq!(report.history.len(), 10);
    assert!(report.is_success());
    assert!(report.failures.is_empty());
    assert_eq!(report.reward, Some(10.5));

    let submissions = rig.dispatch.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].safety, Some(SafetyVerdict::Pass));
    assert!(!submissions[0].censored);
    assert_eq!(worker.status().completed, 1);
    assert_eq!(worker.status().in_flight, 0);
}

#[tokio::test]
async fn history_uses_the_injected_clock() {
    let rig = Rig::new();
    let at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let worker = rig
        .builder()
        .clock(Arc::new(FixedClock::new(at)))
        .build()
        .unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 1)).await;
    assert!(report.history.iter().all(|Transition { at: t, .. }| *t == at));
}

#[tokio::test]
async fn generation_failure_is_reported_once() {
    let mut rig = Rig::new();
    rig.generator = Arc::new(ScriptedGenerator::new(Behavior::Fail(gpu_oom())));
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j2", JobKind::Image, 1)).await;

    assert_eq!(
        states(&report),
        vec![
            NotStarted,
            Preloading,
            PreloadingComplete,
            Generating,
            Error,
            Aborted,
            ReportedFailed,
        ]
    );
    // default stage_attempts.generate
    assert_eq!(rig.generator.script.calls(), 3);
    assert_eq!(rig.dispatch.failure_report_calls(), 1);

    let failures = rig.dispatch.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, WorkerErrorKind::GpuOutOfMemory);
    assert_eq!(report.failures[0].state, Generating);
    assert!(rig.dispatch.submissions().is_empty());
    assert_eq!(worker.status().reported_failed, 1);
}

#[tokio::test]
async fn stage_retry_recovers_in_place() {
    let mut rig = Rig::new();
    rig.generator = Arc::new(ScriptedGenerator::new(Behavior::FailTimes(2, gpu_oom())));
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 1)).await;

    assert_eq!(report.final_state, Complete);
    assert_eq!(rig.generator.script.calls(), 3);
    // retries do not show up in the history
    assert_eq!(report.history.len(), 10);
}

#[tokio::test]
async fn preload_failure_stops_before_generation() {
    let mut rig = Rig::new();
    rig.preloader = Arc::new(ScriptedPreloader::new(Behavior::Fail(
        CollaboratorError::system_oom("not enough RAM"),
    )));
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 1)).await;

    assert_eq!(
        states(&report),
        vec![NotStarted, Preloading, Error, Aborted, ReportedFailed]
    );
    assert_eq!(rig.generator.script.calls(), 0);
}

#[tokio::test]
async fn short_batch_is_a_backend_failure() {
    let mut rig = Rig::new();
    rig.generator = Arc::new(ScriptedGenerator::ok().short_by(1));
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 3)).await;

    assert_eq!(report.final_state, ReportedFailed);
    assert_eq!(
        report.failures[0].kind,
        WorkerErrorKind::UnhandledExceptionFromBackend
    );
}

#[tokio::test]
async fn batch_results_keep_generation_order() {
    let rig = Rig::new();
    let worker = rig.builder().build().unwrap();

    worker.run_job(job("j1", JobKind::Image, 3)).await;

    let ids: Vec<_> = rig.dispatch.submissions()[0]
        .results
        .iter()
        .map(|r| r.generation_id.to_string())
        .collect();
    assert_eq!(ids, vec!["j1-g0", "j1-g1", "j1-g2"]);
}

#[rstest]
#[case::text(JobKind::Text)]
#[case::alchemy(JobKind::Alchemy)]
#[tokio::test]
async fn kinds_without_safety_check_skip_it(#[case] kind: JobKind) {
    let rig = Rig::new();
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", kind, 1)).await;

    assert_eq!(report.final_state, Complete);
    assert!(!states(&report).contains(&SafetyChecking));
    assert_eq!(rig.safety_checker.script.calls(), 0);
    assert_eq!(rig.dispatch.submissions()[0].safety, None);
}

#[tokio::test]
async fn post_processing_runs_only_when_requested() {
    let rig = Rig::new();
    let worker = rig.builder().build().unwrap();
    let plain = JobDescriptor::builder(JobId::new("j1"), JobKind::Image)
        .batch_size(1)
        .build(&crate::ports::UlidGenerator::new(crate::ports::SystemClock))
        .unwrap();

    let report = worker.run_job(plain).await;

    assert_eq!(
        states(&report),
        vec![
            NotStarted,
            Preloading,
            PreloadingComplete,
            Generating,
            SafetyChecking,
            PendingSubmit,
            Submitting,
            SubmitComplete,
            Complete,
        ]
    );
    assert_eq!(rig.post_processor.0.calls(), 0);
}

#[rstest]
#[case::nsfw_allowed(true, false, false, false)]
#[case::nsfw_censored(true, false, true, true)]
#[case::csam_always(false, true, false, true)]
#[tokio::test]
async fn flagged_output_is_censored_by_rule(
    #[case] nsfw: bool,
    #[case] csam: bool,
    #[case] censor_nsfw: bool,
    #[case] censored: bool,
) {
    let mut rig = Rig::new();
    rig.safety_checker = Arc::new(ScriptedSafetyChecker::flagged(nsfw, csam));
    let worker = rig.builder().build().unwrap();
    let job = JobDescriptor::builder(JobId::new("j1"), JobKind::Image)
        .batch_size(1)
        .source(SourceMetadata {
            censor_nsfw,
            ..SourceMetadata::default()
        })
        .build(&crate::ports::UlidGenerator::new(crate::ports::SystemClock))
        .unwrap();

    let report = worker.run_job(job).await;

    assert_eq!(report.final_state, Complete);
    let submission = &rig.dispatch.submissions()[0];
    assert_eq!(submission.censored, censored);
    assert_eq!(submission.safety, Some(SafetyVerdict::Flagged { nsfw, csam }));
}

#[tokio::test]
async fn cancel_during_post_processing_completes_the_abort() {
    let mut rig = Rig::new();
    rig.post_processor = Arc::new(ScriptedPostProcessor::new(Behavior::WaitForCancel));
    let worker = Arc::new(rig.builder().build().unwrap());

    let running = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run_job(job("j3", JobKind::Image, 1)).await }
    });
    rig.post_processor.0.entered.notified().await;
    assert_eq!(worker.status().in_flight, 1);
    assert!(worker.cancel(&JobId::new("j3")));

    let report = running.await.unwrap();

    assert_eq!(
        states(&report),
        vec![
            NotStarted,
            Preloading,
            PreloadingComplete,
            Generating,
            PostProcessing,
            UserRequestedAbort,
            UserAbortComplete,
        ]
    );
    assert_eq!(rig.dispatch.cancels(), vec![JobId::new("j3")]);
    assert_eq!(rig.safety_checker.script.calls(), 0);
    assert!(rig.dispatch.submissions().is_empty());
    assert_eq!(worker.status().user_aborted, 1);
}

#[tokio::test]
async fn work_that_outlives_the_grace_period_is_abandoned() {
    let mut rig = Rig::new();
    rig.config.cancel_grace_period_ms = 20;
    rig.post_processor = Arc::new(ScriptedPostProcessor::new(Behavior::IgnoreCancel(
        Duration::from_secs(30),
    )));
    let worker = Arc::new(rig.builder().build().unwrap());

    let running = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run_job(job("j3", JobKind::Image, 1)).await }
    });
    rig.post_processor.0.entered.notified().await;
    worker.cancel(&JobId::new("j3"));

    let report = running.await.unwrap();

    assert_eq!(
        &states(&report)[4..],
        &[PostProcessing, UserRequestedAbort, Abandoned]
    );
    assert_eq!(report.failures[0].kind, WorkerErrorKind::SafeguardTimeout);
    assert!(rig.dispatch.cancels().is_empty());
}

#[tokio::test]
async fn failed_cancel_acknowledgement_abandons_the_job() {
    let mut rig = Rig::new();
    rig.post_processor = Arc::new(ScriptedPostProcessor::new(Behavior::WaitForCancel));
    rig.dispatch.fail_cancels(true);
    let worker = Arc::new(rig.builder().build().unwrap());

    let running = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run_job(job("j3", JobKind::Image, 1)).await }
    });
    rig.post_processor.0.entered.notified().await;
    worker.cancel(&JobId::new("j3"));

    let report = running.await.unwrap();
    assert_eq!(report.final_state, Abandoned);
    assert_eq!(report.failures[0].kind, WorkerErrorKind::NetworkIssue);
}

#[tokio::test]
async fn cancel_during_retry_pause_stops_retrying() {
    let mut rig = Rig::new();
    rig.config.stage_retry_delay_ms = 60_000;
    rig.generator = Arc::new(ScriptedGenerator::new(Behavior::Fail(gpu_oom())));
    let worker = Arc::new(rig.builder().build().unwrap());

    let running = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run_job(job("j1", JobKind::Image, 1)).await }
    });
    rig.generator.script.entered.notified().await;
    worker.cancel(&JobId::new("j1"));

    let report = running.await.unwrap();
    assert_eq!(
        &states(&report)[3..],
        &[Generating, UserRequestedAbort, UserAbortComplete]
    );
    assert_eq!(rig.generator.script.calls(), 1);
    assert_eq!(rig.dispatch.failure_report_calls(), 0);
}

#[tokio::test]
async fn cancel_of_unknown_job_is_refused() {
    let rig = Rig::new();
    let worker = rig.builder().build().unwrap();
    assert!(!worker.cancel(&JobId::new("nope")));
}

#[tokio::test]
async fn submit_is_retried_with_backoff() {
    let rig = Rig::new();
    rig.dispatch.fail_next_submits(2);
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 1)).await;

    assert_eq!(report.final_state, Complete);
    assert_eq!(rig.dispatch.submit_calls(), 3);
}

#[tokio::test]
async fn submit_gives_up_after_max_attempts() {
    let rig = Rig::new();
    rig.dispatch.fail_next_submits(10);
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 1)).await;

    assert_eq!(&states(&report)[7..], &[Submitting, Abandoned]);
    assert_eq!(rig.dispatch.submit_calls(), 3);
    assert_eq!(report.failures[0].kind, WorkerErrorKind::NetworkIssue);
    assert_eq!(report.failures[0].state, Submitting);
    assert_eq!(worker.status().abandoned, 1);
}

#[tokio::test]
async fn rejected_submission_is_not_retried() {
    let rig = Rig::new();
    rig.dispatch.reject_submits("job expired");
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 1)).await;

    assert_eq!(report.final_state, Abandoned);
    assert_eq!(rig.dispatch.submit_calls(), 1);
    assert!(report.failures[0].reason.contains("job expired"));
}

#[tokio::test]
async fn undeliverable_failure_report_abandons_the_job() {
    let mut rig = Rig::new();
    rig.generator = Arc::new(ScriptedGenerator::new(Behavior::Fail(gpu_oom())));
    rig.dispatch.fail_next_failure_reports(10);
    let worker = rig.builder().build().unwrap();

    let report = worker.run_job(job("j1", JobKind::Image, 1)).await;

    assert_eq!(&states(&report)[3..], &[Generating, Error, Aborted, Abandoned]);
    assert_eq!(rig.dispatch.failure_report_calls(), 3);
    assert!(rig.dispatch.failures().is_empty());
}

#[tokio::test]
async fn run_once_pops_and_runs() {
    let rig = Rig::new();
    let worker = rig.builder().build().unwrap();
    assert!(worker.run_once().await.unwrap().is_none());

    rig.dispatch.push(job("j1", JobKind::Image, 1));
    let report = worker.run_once().await.unwrap().unwrap();
    assert_eq!(report.job_id, JobId::new("j1"));
    assert_eq!(rig.dispatch.pending(), 0);
}

#[tokio::test]
async fn run_once_surfaces_pop_errors() {
    let rig = Rig::new();
    rig.dispatch.fail_next_pops(1);
    let worker = rig.builder().build().unwrap();
    assert!(matches!(
        worker.run_once().await,
        Err(DispatchError::Network(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pool_runs_every_queued_job() {
    let mut rig = Rig::new();
    rig.config.max_concurrent_jobs = 2;
    for i in 0..4 {
        rig.dispatch.push(job(&format!("j{i}"), JobKind::Image, 1));
    }
    rig.dispatch.fail_next_pops(1);
    let worker = Arc::new(rig.builder().build().unwrap());

    let mut handle = Arc::clone(&worker).spawn();
    let mut finished = Vec::new();
    for _ in 0..4 {
        let report = tokio::time::timeout(Duration::from_secs(5), handle.next_report())
            .await
            .unwrap()
            .unwrap();
        finished.push(report.job_id.to_string());
    }
    handle.shutdown_and_join().await;

    finished.sort();
    assert_eq!(finished, vec!["j0", "j1", "j2", "j3"]);
    let status = worker.status();
    assert_eq!(status.completed, 4);
    assert_eq!(status.in_flight, 0);
}

#[tokio::test]
async fn pool_shutdown_waits_for_in_flight_jobs() {
    let mut rig = Rig::new();
    rig.post_processor = Arc::new(ScriptedPostProcessor::new(Behavior::IgnoreCancel(
        Duration::from_millis(50),
    )));
    rig.dispatch.push(job("slow", JobKind::Image, 1));
    let worker = Arc::new(rig.builder().build().unwrap());

    let handle = Arc::clone(&worker).spawn();
    rig.post_processor.0.entered.notified().await;
    handle.shutdown_and_join().await;

    assert_eq!(worker.status().completed, 1);
    assert_eq!(rig.dispatch.submissions().len(), 1);
}

/// A run outside `run_job`, for driving the tracker from a chosen state.
fn job_run(worker: &WorkerLoop, tracker: JobProgressTracker) -> (JobRun<'_>, CancelHandle) {
    let (cancel, signal) = CancelHandle::new();
    let run = JobRun {
        worker,
        job: Arc::new(tracker.descriptor().clone()),
        tracker,
        signal,
        run_id: RunId::MAX,
        reward: None,
    };
    (run, cancel)
}

fn tracker_at(id: &str, path: &[JobState]) -> JobProgressTracker {
    let mut tracker = JobProgressTracker::new(job(id, JobKind::Image, 1), Utc::now());
    for &state in path {
        tracker.transition(state, Utc::now()).unwrap();
    }
    tracker
}

#[tokio::test]
async fn illegal_step_is_reported_as_a_failure() {
    let rig = Rig::new();
    let worker = rig.builder().build().unwrap();
    // an image job held to the table without SAFETY_CHECKING
    let tracker = JobProgressTracker::with_table(
        job("j5", JobKind::Image, 1),
        StateTransitionTable::without_safety_check(),
        Utc::now(),
    );
    let (mut run, _cancel) = job_run(&worker, tracker);

    run.drive().await;
    let report = run.into_report();

    assert_eq!(
        &states(&report)[4..],
        &[PostProcessing, Error, Aborted, ReportedFailed]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, WorkerErrorKind::UnhandledException);
    assert!(report.failures[0].reason.contains("illegal state transition"));
    assert_eq!(rig.safety_checker.script.calls(), 0);
    assert_eq!(rig.dispatch.failures().len(), 1);
    assert!(rig.dispatch.submissions().is_empty());
}

#[tokio::test]
async fn illegal_step_with_undeliverable_report_is_abandoned() {
    let rig = Rig::new();
    rig.dispatch.fail_next_failure_reports(10);
    let worker = rig.builder().build().unwrap();
    let tracker = JobProgressTracker::with_table(
        job("j5", JobKind::Image, 1),
        StateTransitionTable::without_safety_check(),
        Utc::now(),
    );
    let (mut run, _cancel) = job_run(&worker, tracker);

    run.drive().await;
    let report = run.into_report();

    assert_eq!(&states(&report)[5..], &[Error, Aborted, Abandoned]);
    assert_eq!(report.failures[0].kind, WorkerErrorKind::UnhandledException);
    assert_eq!(report.failures[1].kind, WorkerErrorKind::NetworkIssue);
}

#[rstest]
#[case::error(vec![Preloading, Error])]
#[case::submitting(vec![
    Preloading,
    PreloadingComplete,
    Generating,
    SafetyChecking,
    PendingSubmit,
    Submitting,
])]
#[case::user_abort(vec![Preloading, UserRequestedAbort])]
#[case::generating(vec![Preloading, PreloadingComplete, Generating])]
fn force_abandon_ends_in_abandoned(#[case] path: Vec<JobState>) {
    let rig = Rig::new();
    let worker = rig.builder().build().unwrap();
    let tracker = tracker_at("j6", &path);
    let from = tracker.current_state();
    let (mut run, _cancel) = job_run(&worker, tracker);

    run.force_abandon(TransitionError::IllegalStateTransition {
        job_id: JobId::new("j6"),
        current: from,
        attempted: Complete,
    });
    let report = run.into_report();

    assert_eq!(report.final_state, Abandoned);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, WorkerErrorKind::UnhandledException);
    assert_eq!(report.failures[0].state, from);
}

#[tokio::test]
async fn cancel_before_submitting_wins() {
    let rig = Rig::new();
    let worker = rig.builder().build().unwrap();
    let tracker = tracker_at(
        "j7",
        &[
            Preloading,
            PreloadingComplete,
            Generating,
            SafetyChecking,
            PendingSubmit,
        ],
    );
    let (mut run, cancel) = job_run(&worker, tracker);

    cancel.cancel();
    assert!(matches!(
        run.begin_submit(),
        Err(Interrupt::Cancelled {
            stopped_in_time: true
        })
    ));
    run.finish_user_abort(true).await;
    let report = run.into_report();

    assert_eq!(
        &states(&report)[5..],
        &[PendingSubmit, UserRequestedAbort, UserAbortComplete]
    );
    assert_eq!(rig.dispatch.submit_calls(), 0);
    assert_eq!(rig.dispatch.cancels(), vec![JobId::new("j7")]);
}

/// Holds every `submit_result` until released.
struct GatedSubmit {
    inner: InMemoryDispatch,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl DispatchSource for GatedSubmit {
    async fn pop_job(&self) -> Result<Option<JobDescriptor>, DispatchError> {
        self.inner.pop_job().await
    }

    async fn submit_result(
        &self,
        job_id: &JobId,
        submission: &Submission,
    ) -> Result<SubmitAck, DispatchError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.submit_result(job_id, submission).await
    }

    async fn submit_failure(&self, report: &FailureReport) -> Result<(), DispatchError> {
        self.inner.submit_failure(report).await
    }

    async fn cancel(&self, job_id: &JobId) -> Result<(), DispatchError> {
        self.inner.cancel(job_id).await
    }
}

#[tokio::test]
async fn cancel_during_submit_is_refused() {
    let rig = Rig::new();
    let dispatch = Arc::new(GatedSubmit {
        inner: InMemoryDispatch::new(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let worker = Arc::new(rig.builder().dispatch(dispatch.clone()).build().unwrap());

    let running = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run_job(job("j8", JobKind::Image, 1)).await }
    });
    dispatch.entered.notified().await;
    assert_eq!(worker.status().in_flight, 1);
    assert!(!worker.cancel(&JobId::new("j8")));
    dispatch.release.notify_one();

    let report = running.await.unwrap();
    assert_eq!(report.final_state, Complete);
    assert!(!states(&report).contains(&UserRequestedAbort));
    assert_eq!(dispatch.inner.submissions().len(), 1);
    assert!(dispatch.inner.cancels().is_empty());
}

/// Succeeds at once, except on batches of `hold_batch`, which run until
/// cancelled.
struct HoldsOneBatchSize {
    hold_batch: usize,
    entered: Notify,
}

#[async_trait]
impl Generator for HoldsOneBatchSize {
    async fn generate(
        &self,
        job: &JobDescriptor,
        cancel: &CancelSignal,
    ) -> Result<GenerationOutput, CollaboratorError> {
        if job.batch_size() == self.hold_batch {
            self.entered.notify_one();
            cancel.cancelled().await;
            return Err(CollaboratorError::backend("stopped on request"));
        }
        Ok(echo(job))
    }
}

#[tokio::test]
async fn overlapping_runs_of_one_job_id_stay_cancellable() {
    let rig = Rig::new();
    let generator = Arc::new(HoldsOneBatchSize {
        hold_batch: 2,
        entered: Notify::new(),
    });
    let worker = Arc::new(rig.builder().generator(generator.clone()).build().unwrap());

    let held = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run_job(job("dup", JobKind::Image, 2)).await }
    });
    generator.entered.notified().await;

    let first = worker.run_job(job("dup", JobKind::Image, 1)).await;
    assert_eq!(first.final_state, Complete);
    assert_eq!(worker.status().in_flight, 1);

    assert!(worker.cancel(&JobId::new("dup")));
    let second = held.await.unwrap();
    assert_eq!(second.final_state, UserAbortComplete);
    assert_eq!(worker.status().in_flight, 0);
}

#[tokio::test]
async fn panicking_job_still_yields_a_report() {
    let mut rig = Rig::new();
    rig.generator = Arc::new(ScriptedGenerator::new(Behavior::Panic));
    rig.dispatch.push(job("boom", JobKind::Image, 1));
    let worker = Arc::new(rig.builder().build().unwrap());

    let mut handle = Arc::clone(&worker).spawn();
    let report = tokio::time::timeout(Duration::from_secs(5), handle.next_report())
        .await
        .unwrap()
        .unwrap();
    handle.shutdown_and_join().await;

    assert_eq!(report.job_id, JobId::new("boom"));
    assert_eq!(report.final_state, Abandoned);
    assert_eq!(report.failures[0].kind, WorkerErrorKind::UnhandledException);
    let status = worker.status();
    assert_eq!(status.abandoned, 1);
    assert_eq!(status.in_flight, 0);
}
