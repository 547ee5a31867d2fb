//! IdGenerator port - ID 生成の抽象化
//!
//! Used when the dispatch source leaves ids out (local/custom sources) and a
//! job descriptor has to mint its own.

use crate::domain::ids::{GenerationId, JobId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は時刻でソート可能な ID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_generation_id(&self) -> GenerationId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock から timestamp 部分を取るので、FixedClock を渡せば
/// timestamp が決定的になる（ランダム部分は毎回異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from_ulid(self.next_ulid())
    }

    fn generate_generation_id(&self) -> GenerationId {
        GenerationId::from_ulid(self.next_ulid())
    }
}
