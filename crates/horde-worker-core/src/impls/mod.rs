//! Impls - 実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryDispatch**: 開発用の DispatchSource
//! - **NoopPreloader / PassthroughPostProcessor**: 何もしないステージ
//!
//! 本番用の DispatchSource（Horde の REST API）は別クレートに置く想定。

pub mod inmem_dispatch;
pub mod passthrough;

// 主要な型を再エクスポート
pub use self::inmem_dispatch::InMemoryDispatch;
pub use self::passthrough::{NoopPreloader, PassthroughPostProcessor};
