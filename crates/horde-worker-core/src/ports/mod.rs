//! Ports - 抽象化レイヤー
//!
//! ワーカーが外部とやり取りする境界をここに集める。
//! - dispatch: ジョブの取得・結果/失敗/キャンセルの報告
//! - preload / generate / post_process / safety: パイプラインの各ステージ
//! - cancel: 協調的キャンセル
//! - clock / id_generator: テストで差し替えるためのもの
//! - blocking: 同期 API しか持たないバックエンド用のアダプタ

pub mod blocking;
pub mod cancel;
pub mod clock;
pub mod dispatch;
pub mod generate;
pub mod id_generator;
pub mod post_process;
pub mod preload;
pub mod safety;

// 主要な trait を再エクスポート
pub use self::blocking::{
    Blocking, BlockingGenerator, BlockingPostProcessor, BlockingPreloader, BlockingSafetyChecker,
};
pub use self::cancel::{CancelHandle, CancelSignal};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dispatch::DispatchSource;
pub use self::generate::Generator;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::post_process::PostProcessor;
pub use self::preload::Preloader;
pub use self::safety::SafetyChecker;
