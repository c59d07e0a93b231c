//! Task trait - 型付きタスクの定義
//!
//! 1 つの Rust 型 = 1 つの task identity。
//! descriptor の parameters (スカラー map) はこの型に serde で decode されます。

use serde::de::DeserializeOwned;

/// A task kind.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct PopulateScheduler {
///     source: String,
/// }
///
/// impl Task for PopulateScheduler {
///     const IDENTITY: &'static str = "PopulateSchedulerTask";
/// }
/// ```
pub trait Task: DeserializeOwned + Send + Sync + 'static {
    /// Registry key. Must be unique within one registry.
    const IDENTITY: &'static str;
}
