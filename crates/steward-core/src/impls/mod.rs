//! Port implementations.
//!
//! - **InMemoryRunStore**: テスト・開発用
//! - **SqliteRunStore**: sqlx による永続化
//! - **reporters**: tracing / metrics / recording / noop / fanout

pub mod memory_store;
pub mod reporters;
pub mod sqlite_store;

pub use memory_store::InMemoryRunStore;
pub use reporters::{FanoutReporter, MetricsReporter, NoopReporter, RecordingReporter, TracingReporter};
pub use sqlite_store::SqliteRunStore;
