use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use steward_core::Scheduler;
use steward_core::domain::{RunStatus, Scalar, TaskDescriptor};
use steward_core::impls::{FanoutReporter, MetricsReporter, SqliteRunStore, TracingReporter};
use tracing::info;

use crate::config::AppConfig;
use crate::tasks::{self, LoggingProgramSource};

async fn scheduler(app: &AppConfig) -> Result<Scheduler> {
    let store = SqliteRunStore::connect(&app.store.database_url)
        .await
        .with_context(|| format!("failed to open store at {}", app.store.database_url))?;

    let reporter = FanoutReporter::default()
        .with(Arc::new(TracingReporter))
        .with(Arc::new(MetricsReporter::new()));
    let scheduler = Scheduler::builder(tasks::registry(Arc::new(LoggingProgramSource))?)
        .store(Arc::new(store))
        .reporter(Arc::new(reporter))
        .config(app.scheduler.clone())
        .build()?;
    Ok(scheduler)
}

pub fn tasks() -> Result<()> {
    let registry = tasks::registry(Arc::new(LoggingProgramSource))?;
    for (identity, label) in registry.entries() {
        println!("{:<28} {label}", identity.as_str());
    }
    Ok(())
}

pub async fn submit(
    app: &AppConfig,
    identity: String,
    params: Vec<(String, Scalar)>,
    every: Option<u32>,
    at: Option<DateTime<Utc>>,
) -> Result<()> {
    let descriptor = match (every, at) {
        (Some(_), Some(_)) => bail!("--every and --at cannot be combined"),
        (Some(secs), None) => TaskDescriptor::recurring(identity, secs),
        (None, Some(at)) => TaskDescriptor::once(identity, at),
        (None, None) => TaskDescriptor::once(identity, Utc::now()),
    }
    .with_parameters(params.into_iter().collect());

    let scheduler = scheduler(app).await?;
    let instance_id = scheduler.submit(descriptor).await?;
    println!("{instance_id}");
    Ok(())
}

pub async fn tick(app: &AppConfig) -> Result<()> {
    let scheduler = scheduler(app).await?;
    let summary = scheduler.trigger().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub async fn run(app: &AppConfig, workers: Option<usize>) -> Result<()> {
    let scheduler = scheduler(app).await?;
    let workers = workers.unwrap_or(scheduler.config().workers);
    if workers == 0 {
        bail!("--workers must be at least 1");
    }

    let group = scheduler.spawn_workers(workers);
    info!(workers, "scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down; waiting for in-flight tasks");
    group.shutdown_and_join().await;
    Ok(())
}

pub async fn status(app: &AppConfig, filter: Option<RunStatus>) -> Result<()> {
    let scheduler = scheduler(app).await?;

    for run in scheduler.runs(filter).await? {
        println!(
            "{}  {:<10} {:<28} attempt={} due={} {}",
            run.instance_id,
            run.status.as_str(),
            run.identity().as_str(),
            run.attempt,
            run.next_due_at.to_rfc3339(),
            run.last_error.as_deref().unwrap_or(""),
        );
    }

    let counts = scheduler.counts().await?;
    println!("{}", serde_json::to_string(&counts)?);
    Ok(())
}

pub async fn prune(app: &AppConfig, older_than: Option<u64>) -> Result<()> {
    let scheduler = scheduler(app).await?;
    let window = older_than
        .map(Duration::from_secs)
        .unwrap_or(scheduler.config().retention);
    let deleted = scheduler.prune(window).await?;
    println!("{deleted}");
    Ok(())
}
