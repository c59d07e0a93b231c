mod common;

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use ulid::Ulid;

use common::{fixture, t0};
use steward_core::domain::{
    InstanceId, LeaseToken, ReportedOutcome, RunStatus, Scalar, TaskDescriptor, TaskRun,
};
use steward_core::impls::SqliteRunStore;
use steward_core::ports::{RunStore, StoreError};

fn db_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("steward.db").display())
}

#[tokio::test]
async fn rows_keep_every_field() {
    let store = SqliteRunStore::in_memory().await.unwrap();

    let id = InstanceId::from_ulid(Ulid::new());
    let descriptor = TaskDescriptor::once("PopulateSchedulerTask", t0() + ChronoDuration::milliseconds(1234))
        .with_parameter("source", "program.xlsx")
        .with_parameter("dry_run", true)
        .with_parameter("limit", 25)
        .with_parameter("ratio", 0.5)
        .with_parameter("note", Scalar::Null);
    let mut run = TaskRun::pending(id, descriptor.clone(), descriptor.schedule.first_due_at(t0()), t0());
    run.attempt = 2;
    run.last_error = Some("timed out after 300s".into());
    store.insert(run.clone()).await.unwrap();

    assert_eq!(store.get(id).await.unwrap(), Some(run));

    let recurring = TaskRun::pending(
        InstanceId::from_ulid(Ulid::new()),
        TaskDescriptor::recurring("RefreshDisplays", 900),
        t0(),
        t0(),
    );
    store.insert(recurring.clone()).await.unwrap();
    assert_eq!(store.get(recurring.instance_id).await.unwrap(), Some(recurring));

    assert_eq!(store.get(InstanceId::from_ulid(Ulid::new())).await.unwrap(), None);
}

#[tokio::test]
async fn duplicate_instance_id_is_rejected() {
    let store = SqliteRunStore::in_memory().await.unwrap();
    let run = TaskRun::pending(
        InstanceId::from_ulid(Ulid::new()),
        TaskDescriptor::once("A", t0()),
        t0(),
        t0(),
    );

    store.insert(run.clone()).await.unwrap();
    let err = store.insert(run.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(id) if id == run.instance_id));
}

#[tokio::test]
async fn list_filters_by_status() {
    let store = SqliteRunStore::in_memory().await.unwrap();
    let a = TaskRun::pending(InstanceId::from_ulid(Ulid::new()), TaskDescriptor::once("A", t0()), t0(), t0());
    let b = TaskRun::pending(InstanceId::from_ulid(Ulid::new()), TaskDescriptor::once("B", t0()), t0(), t0());
    store.insert(a.clone()).await.unwrap();
    store.insert(b.clone()).await.unwrap();

    store
        .try_acquire(a.instance_id, LeaseToken::from_ulid(Ulid::new()), t0(), t0() + ChronoDuration::seconds(30))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(store.list(None).await.unwrap().len(), 2);
    let leased = store.list(Some(RunStatus::Leased)).await.unwrap();
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].instance_id, a.instance_id);
    let pending = store.list(Some(RunStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].instance_id, b.instance_id);
}

#[tokio::test]
async fn schedule_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let store = SqliteRunStore::connect(&db_url(&dir)).await.unwrap();
        let f = fixture(std::sync::Arc::new(store));
        f.scheduler
            .submit(TaskDescriptor::recurring("RefreshDisplays", 60))
            .await
            .unwrap()
    };

    let store = SqliteRunStore::connect(&db_url(&dir)).await.unwrap();
    let run = store.get(id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(run.next_due_at, t0());

    let f = fixture(std::sync::Arc::new(store));
    assert_eq!(f.scheduler.trigger().await.unwrap().succeeded, 1);
    assert_eq!(f.scheduler.counts().await.unwrap().pending, 1);
}

#[tokio::test]
async fn lease_held_by_a_crashed_process_is_reclaimed_after_expiry() {
    let dir = tempfile::tempdir().unwrap();

    // 1 つ目のプロセス: lease を取ったまま落ちる
    let id = {
        let store = SqliteRunStore::connect(&db_url(&dir)).await.unwrap();
        let f = fixture(std::sync::Arc::new(store.clone()));
        let id = f
            .scheduler
            .submit(TaskDescriptor::once("RefreshDisplays", t0()))
            .await
            .unwrap();
        store
            .try_acquire(id, LeaseToken::from_ulid(Ulid::new()), t0(), t0() + ChronoDuration::seconds(30))
            .await
            .unwrap()
            .unwrap();
        id
    };

    let store = SqliteRunStore::connect(&db_url(&dir)).await.unwrap();
    let f = fixture(std::sync::Arc::new(store));

    assert!(f.scheduler.trigger().await.unwrap().is_idle());
    assert_eq!(f.refresh_calls.get(), 0);

    f.clock.advance(Duration::from_secs(30));
    let summary = f.scheduler.trigger().await.unwrap();
    assert_eq!(summary.reclaimed, 1);
    assert_eq!(f.reporter.reports()[0].outcome, ReportedOutcome::LeaseExpired);

    let row = f.scheduler.store().get(id).await.unwrap().unwrap();
    assert_eq!(row.status, RunStatus::Pending);
    assert_eq!(row.attempt, 1);

    f.clock.set(row.next_due_at);
    assert_eq!(f.scheduler.trigger().await.unwrap().succeeded, 1);
    assert_eq!(f.refresh_calls.get(), 1);
}
