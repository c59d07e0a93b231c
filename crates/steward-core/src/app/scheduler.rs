//! Scheduler - ワイヤリングと公開 API
//!
//! ```ignore
//! let scheduler = Scheduler::builder(registry)
//!     .store(Arc::new(SqliteRunStore::connect(url).await?))
//!     .config(config)
//!     .build()?;
//!
//! scheduler.submit(TaskDescriptor::recurring("PopulateSchedulerTask", 60)).await?;
//! let group = scheduler.spawn();
//! ```
//!
//! in-process の singleton 状態は持ちません。lease / attempt / next due はすべて store の行です。

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::engine::{SchedulerEngine, TickSummary};
use super::status::RunCounts;
use super::worker_loop::EngineGroup;
use crate::config::SchedulerConfig;
use crate::domain::backoff::as_chrono;
use crate::domain::{Decider, DefaultDecider, InstanceId, RunStatus, TaskDescriptor, TaskRun};
use crate::error::SchedulerError;
use crate::impls::{InMemoryRunStore, TracingReporter};
use crate::ports::{Clock, IdGenerator, Reporter, RunStore, SystemClock, UlidGenerator};
use crate::typed::TaskRegistry;

/// Everything an engine needs, shared by all engines of one scheduler.
pub(crate) struct Components {
    pub(crate) registry: TaskRegistry,
    pub(crate) store: Arc<dyn RunStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) reporter: Arc<dyn Reporter>,
    pub(crate) decider: Arc<dyn Decider>,
    pub(crate) config: SchedulerConfig,
}

pub struct SchedulerBuilder {
    registry: TaskRegistry,
    store: Option<Arc<dyn RunStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    reporter: Option<Arc<dyn Reporter>>,
    decider: Option<Arc<dyn Decider>>,
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to ULIDs stamped with the scheduler's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Defaults to [`TracingReporter`].
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Defaults to [`DefaultDecider`] built from the config's attempt budget and backoff.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let decider = self.decider.unwrap_or_else(|| {
            Arc::new(DefaultDecider::new(
                self.config.max_attempts,
                self.config.backoff(),
            ))
        });

        Ok(Scheduler {
            parts: Arc::new(Components {
                registry: self.registry,
                store: self.store.unwrap_or_else(|| Arc::new(InMemoryRunStore::new())),
                clock,
                ids,
                reporter: self.reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
                decider,
                config: self.config,
            }),
        })
    }
}

/// Library facade: submission, out-of-band ticks, engine workers, status.
#[derive(Clone)]
pub struct Scheduler {
    parts: Arc<Components>,
}

impl Scheduler {
    pub fn builder(registry: TaskRegistry) -> SchedulerBuilder {
        SchedulerBuilder {
            registry,
            store: None,
            clock: None,
            ids: None,
            reporter: None,
            decider: None,
            config: SchedulerConfig::default(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.parts.registry
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.parts.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.parts.config
    }

    /// Register a descriptor as a fresh `Pending` run.
    ///
    /// Unknown identities are rejected here as well as at dispatch time.
    pub async fn submit(&self, descriptor: TaskDescriptor) -> Result<InstanceId, SchedulerError> {
        descriptor.validate()?;
        if !self.parts.registry.contains(&descriptor.identity) {
            return Err(SchedulerError::UnknownTask(descriptor.identity));
        }

        let now = self.parts.clock.now();
        let instance_id = self.parts.ids.generate_instance_id();
        let due_at = descriptor.schedule.first_due_at(now);
        let identity = descriptor.identity.clone();

        self.parts
            .store
            .insert(TaskRun::pending(instance_id, descriptor, due_at, now))
            .await?;

        info!(%instance_id, %identity, %due_at, "task submitted");
        Ok(instance_id)
    }

    /// A named engine worker sharing this scheduler's components.
    pub fn engine(&self, worker: impl Into<String>) -> SchedulerEngine {
        SchedulerEngine::new(Arc::clone(&self.parts), worker.into())
    }

    /// Run one tick right now, outside any worker group.
    pub async fn trigger(&self) -> Result<TickSummary, SchedulerError> {
        self.engine("trigger").tick().await
    }

    /// Spawn `config.workers` engine workers ticking every `config.tick_interval`.
    pub fn spawn(&self) -> EngineGroup {
        self.spawn_workers(self.parts.config.workers)
    }

    pub fn spawn_workers(&self, workers: usize) -> EngineGroup {
        let engines = (0..workers)
            .map(|n| self.engine(format!("worker-{n}")))
            .collect();
        EngineGroup::spawn(engines, self.parts.config.tick_interval)
    }

    pub async fn runs(&self, status: Option<RunStatus>) -> Result<Vec<TaskRun>, SchedulerError> {
        Ok(self.parts.store.list(status).await?)
    }

    pub async fn counts(&self) -> Result<RunCounts, SchedulerError> {
        let mut counts = RunCounts::default();
        for status in RunStatus::ALL {
            counts.set(status, self.parts.store.count(status).await?);
        }
        Ok(counts)
    }

    /// Delete finished rows completed more than `older_than` ago.
    pub async fn prune(&self, older_than: Duration) -> Result<u64, SchedulerError> {
        let cutoff = self.parts.clock.now() - as_chrono(older_than);
        let deleted = self.parts.store.prune(cutoff).await?;
        info!(deleted, %cutoff, "pruned finished runs");
        Ok(deleted)
    }
}
