//! Reporter port - 実行結果の観測用 sink
//!
//! 同期・infallible。スケジューリングには一切影響しない（失敗しても engine は気にしない）。

use crate::domain::ExecutionReport;

pub trait Reporter: Send + Sync {
    fn report(&self, report: &ExecutionReport);
}
