#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use steward_core::domain::{InstanceId, LeaseToken, RunStatus, Settlement, TaskError, TaskRun};
use steward_core::impls::{InMemoryRunStore, RecordingReporter, SqliteRunStore};
use steward_core::ports::{ManualClock, RunStore, StoreError};
use steward_core::typed::{Handler, RegistryBuilder, Task, TaskRegistry};
use steward_core::{Scheduler, SchedulerConfig};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

/// Always fails retryably.
#[derive(Debug, Deserialize)]
pub struct Populate {}

impl Task for Populate {
    const IDENTITY: &'static str = "PopulateSchedulerTask";
}

/// Succeeds; optionally sleeps first so concurrent ticks overlap.
#[derive(Debug, Deserialize)]
pub struct Refresh {
    #[serde(default)]
    pub sleep_ms: u64,
}

impl Task for Refresh {
    const IDENTITY: &'static str = "RefreshDisplays";
}

#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FailingPopulate(pub Calls);

#[async_trait]
impl Handler<Populate> for FailingPopulate {
    async fn handle(&self, _task: Populate) -> Result<(), TaskError> {
        self.0.bump();
        Err(TaskError::retryable("upstream program feed unavailable"))
    }
}

/// Rejects every booking; never worth retrying.
#[derive(Debug, Deserialize)]
pub struct Reject {}

impl Task for Reject {
    const IDENTITY: &'static str = "RejectBooking";
}

pub struct RejectHandler;

#[async_trait]
impl Handler<Reject> for RejectHandler {
    async fn handle(&self, _task: Reject) -> Result<(), TaskError> {
        Err(TaskError::terminal("room capacity exceeded"))
    }
}

pub struct RefreshHandler(pub Calls);

#[async_trait]
impl Handler<Refresh> for RefreshHandler {
    async fn handle(&self, task: Refresh) -> Result<(), TaskError> {
        self.0.bump();
        if task.sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(task.sleep_ms)).await;
        }
        Ok(())
    }
}

pub struct Fixture {
    pub scheduler: Scheduler,
    pub clock: Arc<ManualClock>,
    pub reporter: Arc<RecordingReporter>,
    pub populate_calls: Calls,
    pub refresh_calls: Calls,
}

pub fn registry(populate: Calls, refresh: Calls) -> TaskRegistry {
    RegistryBuilder::new()
        .register::<Populate, _>(FailingPopulate(populate))
        .unwrap()
        .register::<Refresh, _>(RefreshHandler(refresh))
        .unwrap()
        .register::<Reject, _>(RejectHandler)
        .unwrap()
        .labels(&[
            ("PopulateSchedulerTask", "Populate schedule from program data"),
            ("RefreshDisplays", "Refresh lobby displays"),
            ("RejectBooking", "Reject a room booking"),
        ])
        .build()
        .unwrap()
}

pub fn config() -> SchedulerConfig {
    SchedulerConfig {
        tick_interval: Duration::from_millis(20),
        task_timeout: Duration::from_secs(5),
        lease_duration: Duration::from_secs(30),
        max_attempts: 3,
        backoff_base: Duration::from_secs(1),
        backoff_cap: Duration::from_secs(8),
        batch_size: 16,
        workers: 2,
        retention: Duration::from_secs(3600),
    }
}

pub fn fixture(store: Arc<dyn RunStore>) -> Fixture {
    fixture_with(store, config())
}

pub fn fixture_with(store: Arc<dyn RunStore>, config: SchedulerConfig) -> Fixture {
    let clock = Arc::new(ManualClock::new(t0()));
    let reporter = Arc::new(RecordingReporter::new());
    let populate_calls = Calls::default();
    let refresh_calls = Calls::default();

    let scheduler = Scheduler::builder(registry(populate_calls.clone(), refresh_calls.clone()))
        .store(store)
        .clock(clock.clone())
        .reporter(reporter.clone())
        .config(config)
        .build()
        .unwrap();

    Fixture {
        scheduler,
        clock,
        reporter,
        populate_calls,
        refresh_calls,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Memory,
    Sqlite,
}

/// Keeps the temp dir alive for as long as the store is in use.
pub struct Opened {
    pub store: Arc<dyn RunStore>,
    _dir: Option<tempfile::TempDir>,
}

pub async fn open(backend: Backend) -> Opened {
    match backend {
        Backend::Memory => Opened {
            store: Arc::new(InMemoryRunStore::new()),
            _dir: None,
        },
        Backend::Sqlite => {
            let dir = tempfile::tempdir().unwrap();
            let url = format!("sqlite://{}", dir.path().join("steward.db").display());
            Opened {
                store: Arc::new(SqliteRunStore::connect(&url).await.unwrap()),
                _dir: Some(dir),
            }
        }
    }
}

/// Records every instance a lease was granted on.
pub struct AcquireSpy {
    inner: Arc<dyn RunStore>,
    granted: Mutex<Vec<InstanceId>>,
}

impl AcquireSpy {
    pub fn new(inner: Arc<dyn RunStore>) -> Self {
        Self {
            inner,
            granted: Mutex::new(Vec::new()),
        }
    }

    pub fn granted(&self) -> Vec<InstanceId> {
        self.granted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunStore for AcquireSpy {
    async fn insert(&self, run: TaskRun) -> Result<(), StoreError> {
        self.inner.insert(run).await
    }

    async fn get(&self, instance_id: InstanceId) -> Result<Option<TaskRun>, StoreError> {
        self.inner.get(instance_id).await
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TaskRun>, StoreError> {
        self.inner.due(now, limit).await
    }

    async fn expired_leases(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskRun>, StoreError> {
        self.inner.expired_leases(now, limit).await
    }

    async fn try_acquire(
        &self,
        instance_id: InstanceId,
        token: LeaseToken,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<TaskRun>, StoreError> {
        let leased = self.inner.try_acquire(instance_id, token, now, expires_at).await?;
        if leased.is_some() {
            self.granted.lock().unwrap().push(instance_id);
        }
        Ok(leased)
    }

    async fn settle(
        &self,
        instance_id: InstanceId,
        token: LeaseToken,
        settlement: Settlement,
    ) -> Result<bool, StoreError> {
        self.inner.settle(instance_id, token, settlement).await
    }

    async fn abandon(
        &self,
        instance_id: InstanceId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.abandon(instance_id, reason, now).await
    }

    async fn list(&self, status: Option<RunStatus>) -> Result<Vec<TaskRun>, StoreError> {
        self.inner.list(status).await
    }

    async fn count(&self, status: RunStatus) -> Result<usize, StoreError> {
        self.inner.count(status).await
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.prune(cutoff).await
    }
}

/// Counts ERROR-level events on the thread it is installed on.
#[derive(Clone, Default)]
pub struct ErrorCounter(Arc<AtomicUsize>);

impl ErrorCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl tracing::Subscriber for ErrorCounter {
    fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _span: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }

    fn record(&self, _span: &tracing::span::Id, _values: &tracing::span::Record<'_>) {}

    fn record_follows_from(&self, _span: &tracing::span::Id, _follows: &tracing::span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn enter(&self, _span: &tracing::span::Id) {}

    fn exit(&self, _span: &tracing::span::Id) {}
}
