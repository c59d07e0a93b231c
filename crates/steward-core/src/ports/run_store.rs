//! RunStore port - TaskRun の永続化
//!
//! store がスケジューラ唯一の真実であり、唯一の同期手段です。
//! engine 同士はここ以外で協調しません。
//!
//! # 原子性の要件
//! - `try_acquire`: 「行が取得可能」かつ「同じ identity に生きた lease が他にない」の判定と
//!   lease の付与を 1 つの原子操作で行う
//! - `settle`: lease token が一致する場合だけ書き込み、後継行の insert も同じ操作に含める
//! - `abandon`: Pending の場合だけ Abandoned にする
//!
//! 終端状態の行は `prune` で消すまで残ります。recurring task は 1 回ごとに 1 行増えます。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{InstanceId, LeaseToken, RunStatus, Settlement, TaskRun};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("instance {0} already exists")]
    Duplicate(InstanceId),

    #[error("corrupt row {instance_id}: {reason}")]
    Corrupt { instance_id: String, reason: String },

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn corrupt(instance_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            instance_id: instance_id.into(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert(&self, run: TaskRun) -> Result<(), StoreError>;

    async fn get(&self, instance_id: InstanceId) -> Result<Option<TaskRun>, StoreError>;

    /// `Pending` rows with `next_due_at <= now`, ordered by `(next_due_at, instance_id)`.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TaskRun>, StoreError>;

    /// `Leased` rows whose lease ran out at or before `now`, oldest expiry first.
    async fn expired_leases(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskRun>, StoreError>;

    /// Take a lease on the row. Returns the leased row, or `None` if the row is no longer
    /// acquirable or another row of the same identity holds a live lease.
    /// An expired lease on a sibling does not block; that row stays `Leased` beside the new
    /// holder until it is reclaimed.
    async fn try_acquire(
        &self,
        instance_id: InstanceId,
        token: LeaseToken,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<TaskRun>, StoreError>;

    /// Apply the settlement if the row is still leased by `token`. Returns `false` when the
    /// lease was lost; nothing is written in that case.
    async fn settle(
        &self,
        instance_id: InstanceId,
        token: LeaseToken,
        settlement: Settlement,
    ) -> Result<bool, StoreError>;

    /// Abandon a row that never got leased. Returns `false` if it is no longer `Pending`.
    async fn abandon(
        &self,
        instance_id: InstanceId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// All rows, optionally filtered by status, ordered by `(next_due_at, instance_id)`.
    async fn list(&self, status: Option<RunStatus>) -> Result<Vec<TaskRun>, StoreError>;

    /// Number of rows in `status`.
    async fn count(&self, status: RunStatus) -> Result<usize, StoreError>;

    /// Delete terminal rows whose `completed_at` is before `cutoff`. Returns how many went.
    /// `Pending` / `Leased` rows are never touched.
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
