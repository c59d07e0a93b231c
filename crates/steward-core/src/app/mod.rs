//! Application layer
//!
//! - **executor**: TaskExecutor（timeout / panic / 分類）
//! - **engine**: SchedulerEngine の 1 tick
//! - **worker_loop**: EngineGroup（N worker, trigger, shutdown）
//! - **scheduler**: Scheduler facade と builder
//! - **status**: RunCounts

pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod status;
pub mod worker_loop;

pub use engine::{SchedulerEngine, TickSummary};
pub use executor::TaskExecutor;
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use status::RunCounts;
pub use worker_loop::EngineGroup;
