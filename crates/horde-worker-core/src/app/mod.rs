//! App - アプリケーション層
//!
//! ports を組み合わせてワーカーを組み立てる。
//!
//! # 主要コンポーネント
//! - **WorkerConfig**: 設定（TOML）
//! - **WorkerLoopBuilder**: ワーカーの構築とワイヤリング
//! - **WorkerLoop**: ジョブ実行ループ（pop→preload→generate→…→submit）
//! - **BlockingWorkerLoop**: 同期 API
//! - **RetryPolicy**: ステージ・submit の再試行
//! - **WorkerStatus**: 状態のスナップショット

pub mod blocking;
pub mod builder;
pub mod config;
pub mod retry;
pub mod status;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::blocking::BlockingWorkerLoop;
pub use self::builder::{BuildError, WorkerLoopBuilder};
pub use self::config::{ConfigError, StageAttempts, WorkerConfig};
pub use self::retry::RetryPolicy;
pub use self::status::WorkerStatus;
pub use self::worker_loop::{WorkerHandle, WorkerLoop};
