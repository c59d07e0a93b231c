//! SQLite RunStore (sqlx).
//!
//! 時刻は UTC の epoch millis (INTEGER)、descriptor の parameters / schedule は JSON (TEXT) で保存。
//! lease の取得は 1 本の条件付き UPDATE で行い、同一 identity の single-flight 判定も
//! 同じ文の `NOT EXISTS` に含めます。SQLite は書き込みを直列化するので、これで原子的になります。

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::domain::{
    InstanceId, LeaseToken, RunStatus, Schedule, Settlement, TaskDescriptor, TaskIdentity, TaskRun,
};
use crate::ports::{RunStore, StoreError};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS task_runs (
        instance_id      TEXT PRIMARY KEY NOT NULL,
        identity         TEXT NOT NULL,
        parameters       TEXT NOT NULL,
        schedule         TEXT NOT NULL,
        status           TEXT NOT NULL,
        next_due_at      INTEGER NOT NULL,
        attempt          INTEGER NOT NULL DEFAULT 0,
        lease_owner      TEXT,
        lease_expires_at INTEGER,
        last_error       TEXT,
        created_at       INTEGER NOT NULL,
        updated_at       INTEGER NOT NULL,
        completed_at     INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS task_runs_due ON task_runs (status, next_due_at, instance_id)",
    "CREATE INDEX IF NOT EXISTS task_runs_identity ON task_runs (identity, status)",
];

const ACQUIRE: &str = r#"
    UPDATE task_runs
       SET status = 'leased', lease_owner = ?1, lease_expires_at = ?2, updated_at = ?3
     WHERE instance_id = ?4
       AND ((status = 'pending' AND next_due_at <= ?3)
            OR (status = 'leased' AND (lease_expires_at IS NULL OR lease_expires_at <= ?3)))
       AND NOT EXISTS (
            SELECT 1 FROM task_runs AS other
             WHERE other.identity = task_runs.identity
               AND other.instance_id <> task_runs.instance_id
               AND other.status = 'leased'
               AND other.lease_expires_at > ?3)
    RETURNING *
"#;

const SETTLE: &str = r#"
    UPDATE task_runs
       SET status = ?1, attempt = ?2, next_due_at = COALESCE(?3, next_due_at), last_error = ?4,
           lease_owner = NULL, lease_expires_at = NULL, updated_at = ?5, completed_at = ?6
     WHERE instance_id = ?7 AND status = 'leased' AND lease_owner = ?8
"#;

const INSERT: &str = r#"
    INSERT INTO task_runs (
        instance_id, identity, parameters, schedule, status, next_due_at, attempt,
        lease_owner, lease_expires_at, last_error, created_at, updated_at, completed_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
"#;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

#[derive(Clone)]
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Connect (creating the file if needed) and make sure the schema exists.
    ///
    /// `sqlite::memory:` URLs get a single shared connection; see [`SqliteRunStore::in_memory`].
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if database_url.contains(":memory:") {
            return Self::in_memory().await;
        }
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database. Each SQLite connection would see its own database,
    /// so the pool is pinned to one connection that is never recycled.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("task_runs schema ready");
        Ok(())
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

async fn insert_row<'e, E: SqliteExecutor<'e>>(executor: E, run: &TaskRun) -> Result<(), StoreError> {
    let parameters = serde_json::to_string(&run.descriptor.parameters)
        .map_err(|e| StoreError::corrupt(run.instance_id.to_string(), e))?;
    let schedule = serde_json::to_string(&run.descriptor.schedule)
        .map_err(|e| StoreError::corrupt(run.instance_id.to_string(), e))?;

    sqlx::query(INSERT)
        .bind(run.instance_id.to_string())
        .bind(run.identity().as_str())
        .bind(parameters)
        .bind(schedule)
        .bind(run.status.as_str())
        .bind(millis(run.next_due_at))
        .bind(i64::from(run.attempt))
        .bind(run.lease_owner.map(|t| t.to_string()))
        .bind(run.lease_expires_at.map(millis))
        .bind(run.last_error.as_deref())
        .bind(millis(run.created_at))
        .bind(millis(run.updated_at))
        .bind(run.completed_at.map(millis))
        .execute(executor)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e
                && db.is_unique_violation()
            {
                return StoreError::Duplicate(run.instance_id);
            }
            e.into()
        })?;
    Ok(())
}

fn decode_row(row: &SqliteRow) -> Result<TaskRun, StoreError> {
    let raw_id: String = row.try_get("instance_id")?;
    let corrupt = |reason: String| StoreError::corrupt(raw_id.clone(), reason);
    let timestamp = |column: &str, ms: i64| {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| corrupt(format!("{column} out of range: {ms}")))
    };

    let instance_id = InstanceId::from_str(&raw_id).map_err(|e| corrupt(e.to_string()))?;
    let identity: String = row.try_get("identity")?;
    let parameters: String = row.try_get("parameters")?;
    let schedule: String = row.try_get("schedule")?;
    let status: String = row.try_get("status")?;
    let attempt: i64 = row.try_get("attempt")?;
    let lease_owner: Option<String> = row.try_get("lease_owner")?;
    let lease_expires_at: Option<i64> = row.try_get("lease_expires_at")?;
    let completed_at: Option<i64> = row.try_get("completed_at")?;

    let descriptor = TaskDescriptor {
        identity: TaskIdentity::new(identity),
        parameters: serde_json::from_str(&parameters).map_err(|e| corrupt(e.to_string()))?,
        schedule: serde_json::from_str::<Schedule>(&schedule).map_err(|e| corrupt(e.to_string()))?,
    };

    Ok(TaskRun {
        instance_id,
        descriptor,
        status: RunStatus::from_str(&status).map_err(|e| corrupt(e.to_string()))?,
        next_due_at: timestamp("next_due_at", row.try_get("next_due_at")?)?,
        attempt: u32::try_from(attempt).map_err(|e| corrupt(format!("attempt: {e}")))?,
        lease_owner: lease_owner
            .map(|t| LeaseToken::from_str(&t))
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?,
        lease_expires_at: lease_expires_at
            .map(|ms| timestamp("lease_expires_at", ms))
            .transpose()?,
        last_error: row.try_get("last_error")?,
        created_at: timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: timestamp("updated_at", row.try_get("updated_at")?)?,
        completed_at: completed_at.map(|ms| timestamp("completed_at", ms)).transpose()?,
    })
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn insert(&self, run: TaskRun) -> Result<(), StoreError> {
        insert_row(&self.pool, &run).await
    }

    async fn get(&self, instance_id: InstanceId) -> Result<Option<TaskRun>, StoreError> {
        let row = sqlx::query("SELECT * FROM task_runs WHERE instance_id = ?1")
            .bind(instance_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn due(&self, now: DateTime<Utc>, n: usize) -> Result<Vec<TaskRun>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM task_runs WHERE status = 'pending' AND next_due_at <= ?1 \
             ORDER BY next_due_at, instance_id LIMIT ?2",
        )
        .bind(millis(now))
        .bind(limit(n))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn expired_leases(&self, now: DateTime<Utc>, n: usize) -> Result<Vec<TaskRun>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM task_runs WHERE status = 'leased' \
             AND (lease_expires_at IS NULL OR lease_expires_at <= ?1) \
             ORDER BY lease_expires_at, instance_id LIMIT ?2",
        )
        .bind(millis(now))
        .bind(limit(n))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn try_acquire(
        &self,
        instance_id: InstanceId,
        token: LeaseToken,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<TaskRun>, StoreError> {
        let row = sqlx::query(ACQUIRE)
            .bind(token.to_string())
            .bind(millis(expires_at))
            .bind(millis(now))
            .bind(instance_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn settle(
        &self,
        instance_id: InstanceId,
        token: LeaseToken,
        settlement: Settlement,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let completed_at = settlement
            .status
            .is_terminal()
            .then_some(millis(settlement.settled_at));
        let updated = sqlx::query(SETTLE)
            .bind(settlement.status.as_str())
            .bind(i64::from(settlement.attempt))
            .bind(settlement.next_due_at.map(millis))
            .bind(settlement.last_error.as_deref())
            .bind(millis(settlement.settled_at))
            .bind(completed_at)
            .bind(instance_id.to_string())
            .bind(token.to_string())
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(successor) = &settlement.successor {
            insert_row(&mut *tx, successor).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn abandon(
        &self,
        instance_id: InstanceId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            "UPDATE task_runs SET status = 'abandoned', last_error = ?1, updated_at = ?2, \
             completed_at = ?2 WHERE instance_id = ?3 AND status = 'pending'",
        )
        .bind(reason)
        .bind(millis(now))
        .bind(instance_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn list(&self, status: Option<RunStatus>) -> Result<Vec<TaskRun>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM task_runs WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY next_due_at, instance_id",
        )
        .bind(status.map(RunStatus::as_str))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(&self, status: RunStatus) -> Result<usize, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_runs WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let deleted = sqlx::query(
            "DELETE FROM task_runs WHERE status IN ('succeeded', 'failed', 'abandoned') \
             AND completed_at IS NOT NULL AND completed_at < ?1",
        )
        .bind(millis(cutoff))
        .execute(&self.pool)
        .await?;
        if deleted.rows_affected() > 0 {
            debug!(deleted = deleted.rows_affected(), %cutoff, "pruned finished runs");
        }
        Ok(deleted.rows_affected())
    }
}
