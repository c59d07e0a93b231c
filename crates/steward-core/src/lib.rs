//! steward-core
//!
//! Durable background task scheduler: a closed registry of typed tasks, store-backed
//! leases (single-flight per task identity), retry with capped exponential backoff,
//! and recurring / one-off schedules.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, descriptor, record, state, outcome, decision, report）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, RunStore, Reporter）
//! - **typed**: 型付き Task API（Task, Handler, TaskRegistry, RegistryBuilder）
//! - **app**: executor, engine, worker group, Scheduler facade
//! - **impls**: InMemoryRunStore, SqliteRunStore, reporter sinks
//! - **config**: SchedulerConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{EngineGroup, RunCounts, Scheduler, SchedulerEngine, TickSummary};
pub use config::{ConfigError, SchedulerConfig};
pub use error::SchedulerError;
