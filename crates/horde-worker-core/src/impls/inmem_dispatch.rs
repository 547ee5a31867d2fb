//! InMemoryDispatch - 開発・テスト用の DispatchSource
//!
//! # 実装詳細
//! - VecDeque<JobDescriptor> の FIFO
//! - 返却された結果・失敗報告・キャンセルをすべて記録
//! - 通信失敗や拒否を台本どおりに起こせる

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::errors::DispatchError;
use crate::domain::ids::JobId;
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::{FailureReport, SubmitAck, Submission};
use crate::ports::DispatchSource;

#[derive(Default)]
struct State {
    queue: VecDeque<JobDescriptor>,
    submissions: Vec<Submission>,
    failures: Vec<FailureReport>,
    cancels: Vec<JobId>,
    submit_calls: usize,
    failure_report_calls: usize,

    // 台本
    failing_pops: usize,
    failing_submits: usize,
    failing_failure_reports: usize,
    reject_reason: Option<String>,
    fail_cancels: bool,
    reward: Option<f64>,
}

/// # 使用例
/// ```ignore
/// let dispatch = InMemoryDispatch::new();
/// dispatch.push(job);
/// dispatch.fail_next_submits(2); // 2 回 Network エラーの後に成功
/// ```
#[derive(Default)]
pub struct InMemoryDispatch {
    state: Mutex<State>,
}

impl InMemoryDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: JobDescriptor) {
        self.state.lock().queue.push_back(job);
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Reward reported with every accepted submission.
    pub fn set_reward(&self, reward: Option<f64>) {
        self.state.lock().reward = reward;
    }

    /// The next `n` pops fail with a network error.
    pub fn fail_next_pops(&self, n: usize) {
        self.state.lock().failing_pops = n;
    }

    /// The next `n` result submissions fail with a network error.
    pub fn fail_next_submits(&self, n: usize) {
        self.state.lock().failing_submits = n;
    }

    /// Every result submission from now on is rejected.
    pub fn reject_submits(&self, reason: impl Into<String>) {
        self.state.lock().reject_reason = Some(reason.into());
    }

    /// The next `n` failure reports fail with a network error.
    pub fn fail_next_failure_reports(&self, n: usize) {
        self.state.lock().failing_failure_reports = n;
    }

    pub fn fail_cancels(&self, fail: bool) {
        self.state.lock().fail_cancels = fail;
    }

    /// Accepted (or rejected) submissions, in arrival order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    /// Delivered failure reports.
    pub fn failures(&self) -> Vec<FailureReport> {
        self.state.lock().failures.clone()
    }

    pub fn cancels(&self) -> Vec<JobId> {
        self.state.lock().cancels.clone()
    }

    /// Every `submit_result` call, failed ones included.
    pub fn submit_calls(&self) -> usize {
        self.state.lock().submit_calls
    }

    /// Every `submit_failure` call, failed ones included.
    pub fn failure_report_calls(&self) -> usize {
        self.state.lock().failure_report_calls
    }
}

#[async_trait]
impl DispatchSource for InMemoryDispatch {
    async fn pop_job(&self) -> Result<Option<JobDescriptor>, DispatchError> {
        let mut state = self.state.lock();
        if state.failing_pops > 0 {
            state.failing_pops -= 1;
            return Err(DispatchError::Network("pop: connection refused".into()));
        }
        Ok(state.queue.pop_front())
    }

    async fn submit_result(
        &self,
        job_id: &JobId,
        submission: &Submission,
    ) -> Result<SubmitAck, DispatchError> {
        let mut state = self.state.lock();
        state.submit_calls += 1;
        if state.failing_submits > 0 {
            state.failing_submits -= 1;
            return Err(DispatchError::Network(format!("submit {job_id}: timed out")));
        }
        state.submissions.push(submission.clone());
        match &state.reject_reason {
            Some(reason) => Ok(SubmitAck::Rejected {
                reason: reason.clone(),
            }),
            None => Ok(SubmitAck::Accepted {
                reward: state.reward,
            }),
        }
    }

    async fn submit_failure(&self, report: &FailureReport) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        state.failure_report_calls += 1;
        if state.failing_failure_reports > 0 {
            state.failing_failure_reports -= 1;
            return Err(DispatchError::Network(format!(
                "report {}: timed out",
                report.job_id
            )));
        }
        state.failures.push(report.clone());
        Ok(())
    }

    async fn cancel(&self, job_id: &JobId) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        if state.fail_cancels {
            return Err(DispatchError::Network(format!("cancel {job_id}: timed out")));
        }
        state.cancels.push(job_id.clone());
        Ok(())
    }
}
