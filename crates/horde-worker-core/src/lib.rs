//! horde-worker-core
//!
//! Job lifecycle for a Horde worker: a job popped from the dispatch source is
//! driven through preload, generation, post-processing, safety check and
//! submission, with every state change checked against a static transition
//! table.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, transitions, job, outcome, errors, tracker）
//! - **ports**: 抽象化レイヤー（DispatchSource, 各ステージの trait, cancel, clock など）
//! - **app**: アプリケーションロジック（config, builder, worker_loop, blocking, status）
//! - **impls**: 実装（InMemoryDispatch など開発用）

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;

pub use error::WorkerError;
