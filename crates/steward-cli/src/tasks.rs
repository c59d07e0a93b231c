//! このバイナリが登録する task 一覧。
//!
//! registry は起動時に一度だけ組み立てる。実行時の追加はしない。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use steward_core::domain::TaskError;
use steward_core::typed::{Handler, RegistryBuilder, Task, TaskRegistry};
use tracing::info;

/// プログラムデータから会期スケジュールを組み立てる。
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopulateScheduler {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_source() -> String {
    "program".to_string()
}

impl Task for PopulateScheduler {
    const IDENTITY: &'static str = "PopulateSchedulerTask";
}

/// 生存確認用。定期実行で worker が回っていることをログに残す。
#[derive(Debug, Deserialize)]
pub struct Heartbeat {}

impl Task for Heartbeat {
    const IDENTITY: &'static str = "Heartbeat";
}

/// Program data collaborator. Returns how many sessions were scheduled.
#[async_trait]
pub trait ProgramSource: Send + Sync {
    async fn populate(&self, source: &str, dry_run: bool) -> Result<usize, TaskError>;
}

/// Stand-in source that only logs.
pub struct LoggingProgramSource;

#[async_trait]
impl ProgramSource for LoggingProgramSource {
    async fn populate(&self, source: &str, dry_run: bool) -> Result<usize, TaskError> {
        info!(source, dry_run, "populating schedule from program data");
        Ok(0)
    }
}

pub struct PopulateSchedulerHandler {
    source: Arc<dyn ProgramSource>,
}

impl PopulateSchedulerHandler {
    pub fn new(source: Arc<dyn ProgramSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Handler<PopulateScheduler> for PopulateSchedulerHandler {
    async fn handle(&self, task: PopulateScheduler) -> Result<(), TaskError> {
        let source = task.source.trim();
        if source.is_empty() {
            return Err(TaskError::terminal("source must not be empty"));
        }
        let scheduled = self.source.populate(source, task.dry_run).await?;
        info!(source, scheduled, dry_run = task.dry_run, "schedule populated");
        Ok(())
    }
}

pub struct HeartbeatHandler;

#[async_trait]
impl Handler<Heartbeat> for HeartbeatHandler {
    async fn handle(&self, _task: Heartbeat) -> Result<(), TaskError> {
        info!("heartbeat");
        Ok(())
    }
}

pub fn registry(source: Arc<dyn ProgramSource>) -> anyhow::Result<TaskRegistry> {
    let registry = RegistryBuilder::new()
        .register::<PopulateScheduler, _>(PopulateSchedulerHandler::new(source))?
        .register::<Heartbeat, _>(HeartbeatHandler)?
        .labels(&[
            (PopulateScheduler::IDENTITY, "Populate the convention schedule from program data"),
            (Heartbeat::IDENTITY, "Log that engine workers are alive"),
        ])
        .build()?;
    Ok(registry)
}
