//! DispatchSource port - ジョブの取得と結果の返却
//!
//! The dispatch source is the service jobs are popped from and results,
//! failures and cancellations are reported to. Transport, auth and the
//! wire format are owned by the implementation.

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::ids::JobId;
use crate::domain::job::JobDescriptor;
use crate::domain::outcome::{FailureReport, SubmitAck, Submission};

/// DispatchSource は Horde (またはその互換サービス) との窓口
///
/// # エラーの扱い
/// - `DispatchError::Network`: 再試行してよい
/// - `DispatchError::Rejected`: 再試行しても無駄
#[async_trait]
pub trait DispatchSource: Send + Sync {
    /// Pop the next job. `Ok(None)` when there is no work.
    async fn pop_job(&self) -> Result<Option<JobDescriptor>, DispatchError>;

    /// Submit a finished job.
    ///
    /// A stale or unwanted job comes back as `SubmitAck::Rejected`.
    async fn submit_result(
        &self,
        job_id: &JobId,
        submission: &Submission,
    ) -> Result<SubmitAck, DispatchError>;

    /// Tell the dispatch source a job failed.
    async fn submit_failure(&self, report: &FailureReport) -> Result<(), DispatchError>;

    /// Tell the dispatch source a job was cancelled on request.
    async fn cancel(&self, job_id: &JobId) -> Result<(), DispatchError>;
}
