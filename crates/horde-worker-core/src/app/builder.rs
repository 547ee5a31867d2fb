//! WorkerLoopBuilder - ワーカーの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - dispatch / generator / safety_checker は必須
//! - 設定は build() 時に validate() する
//! - 不足や不正があれば BuildError を返す

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::Mutex;

use super::config::{ConfigError, WorkerConfig};
use super::status::WorkerStatus;
use super::worker_loop::WorkerLoop;
use crate::impls::{NoopPreloader, PassthroughPostProcessor};
use crate::ports::{
    Clock, DispatchSource, Generator, PostProcessor, Preloader, SafetyChecker, SystemClock,
};

/// BuildError はワーカー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing collaborators: {0:?}. These must be set before build().")]
    MissingCollaborators(Vec<&'static str>),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

/// # 使用例
/// ```ignore
/// let worker = WorkerLoopBuilder::new(config)
///     .dispatch(dispatch)
///     .generator(generator)
///     .safety_checker(checker)
///     .build()?;
/// ```
///
/// Preloader and post-processor default to no-ops; the clock defaults to
/// [`SystemClock`].
pub struct WorkerLoopBuilder {
    config: WorkerConfig,
    dispatch: Option<Arc<dyn DispatchSource>>,
    preloader: Option<Arc<dyn Preloader>>,
    generator: Option<Arc<dyn Generator>>,
    post_processor: Option<Arc<dyn PostProcessor>>,
    safety_checker: Option<Arc<dyn SafetyChecker>>,
    clock: Option<Arc<dyn Clock>>,
}

impl WorkerLoopBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            dispatch: None,
            preloader: None,
            generator: None,
            post_processor: None,
            safety_checker: None,
            clock: None,
        }
    }

    pub fn dispatch(mut self, dispatch: Arc<dyn DispatchSource>) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn preloader(mut self, preloader: Arc<dyn Preloader>) -> Self {
        self.preloader = Some(preloader);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    pub fn safety_checker(mut self, safety_checker: Arc<dyn SafetyChecker>) -> Self {
        self.safety_checker = Some(safety_checker);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<WorkerLoop, BuildError> {
        let mut missing = Vec::new();
        if self.dispatch.is_none() {
            missing.push("dispatch");
        }
        if self.generator.is_none() {
            missing.push("generator");
        }
        if self.safety_checker.is_none() {
            missing.push("safety_checker");
        }

        let (Some(dispatch), Some(generator), Some(safety_checker)) =
            (self.dispatch, self.generator, self.safety_checker)
        else {
            return Err(BuildError::MissingCollaborators(missing));
        };

        self.config.validate()?;

        Ok(WorkerLoop {
            config: self.config,
            dispatch,
            preloader: self.preloader.unwrap_or_else(|| Arc::new(NoopPreloader)),
            generator,
            post_processor: self
                .post_processor
                .unwrap_or_else(|| Arc::new(PassthroughPostProcessor)),
            safety_checker,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            in_flight: Mutex::new(HashMap::new()),
            next_run: AtomicU64::new(0),
            counts: Mutex::new(WorkerStatus::default()),
        })
    }
}
