//! Typed task API
//!
//! - **Task**: 型 = identity
//! - **Handler / DynHandler / TypedHandler**: 型付き実行と type erasure
//! - **TaskRegistry / RegistryBuilder**: 閉じた identity → handler + label 表

pub mod builder;
pub mod handler;
pub mod registry;
pub mod task;

pub use builder::{BuildError, RegistryBuilder};
pub use handler::{DynHandler, Handler, TypedHandler};
pub use registry::{RegistryError, TaskRegistry};
pub use task::Task;
