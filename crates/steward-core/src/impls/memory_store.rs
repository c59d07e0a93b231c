//! In-memory RunStore.
//!
//! すべての操作は 1 つの Mutex の中で完結するので、判定と書き込みは自動的に原子的です。
//! テストと単一プロセスでの開発用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{InstanceId, LeaseToken, RunStatus, Settlement, TaskRun};
use crate::ports::{RunStore, StoreError};

#[derive(Default)]
struct MemoryState {
    runs: HashMap<InstanceId, TaskRun>,
}

impl MemoryState {
    fn sorted<'a>(runs: impl Iterator<Item = &'a TaskRun>) -> Vec<TaskRun> {
        let mut out: Vec<TaskRun> = runs.cloned().collect();
        out.sort_by_key(|run| (run.next_due_at, run.instance_id));
        out
    }

    /// 同じ identity の別の行が生きた lease を持っているか
    fn identity_busy(&self, run: &TaskRun, now: DateTime<Utc>) -> bool {
        self.runs.values().any(|other| {
            other.instance_id != run.instance_id
                && other.identity() == run.identity()
                && other.has_live_lease(now)
        })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert(&self, run: TaskRun) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.runs.contains_key(&run.instance_id) {
            return Err(StoreError::Duplicate(run.instance_id));
        }
        state.runs.insert(run.instance_id, run);
        Ok(())
    }

    async fn get(&self, instance_id: InstanceId) -> Result<Option<TaskRun>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.runs.get(&instance_id).cloned())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TaskRun>, StoreError> {
        let state = self.state.lock().await;
        let mut due = MemoryState::sorted(state.runs.values().filter(|run| run.is_due(now)));
        due.truncate(limit);
        Ok(due)
    }

    async fn expired_leases(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskRun>, StoreError> {
        let state = self.state.lock().await;
        let mut expired: Vec<TaskRun> = state
            .runs
            .values()
            .filter(|run| run.lease_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|run| (run.lease_expires_at, run.instance_id));
        expired.truncate(limit);
        Ok(expired)
    }

    async fn try_acquire(
        &self,
        instance_id: InstanceId,
        token: LeaseToken,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<TaskRun>, StoreError> {
        let mut state = self.state.lock().await;

        let acquirable = match state.runs.get(&instance_id) {
            Some(run) => run.is_acquirable(now) && !state.identity_busy(run, now),
            None => false,
        };
        if !acquirable {
            return Ok(None);
        }

        let Some(run) = state.runs.get_mut(&instance_id) else {
            return Ok(None);
        };
        run.grant_lease(token, expires_at, now);
        Ok(Some(run.clone()))
    }

    async fn settle(
        &self,
        instance_id: InstanceId,
        token: LeaseToken,
        mut settlement: Settlement,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;

        if let Some(successor) = &settlement.successor
            && state.runs.contains_key(&successor.instance_id)
        {
            return Err(StoreError::Duplicate(successor.instance_id));
        }

        let Some(run) = state.runs.get_mut(&instance_id) else {
            return Ok(false);
        };
        if run.status != RunStatus::Leased || run.lease_owner != Some(token) {
            return Ok(false);
        }
        run.settle(&settlement);

        if let Some(successor) = settlement.successor.take() {
            state.runs.insert(successor.instance_id, successor);
        }
        Ok(true)
    }

    async fn abandon(
        &self,
        instance_id: InstanceId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.runs.get_mut(&instance_id) {
            Some(run) if run.status == RunStatus::Pending => {
                run.abandon(reason, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, status: Option<RunStatus>) -> Result<Vec<TaskRun>, StoreError> {
        let state = self.state.lock().await;
        Ok(MemoryState::sorted(
            state
                .runs
                .values()
                .filter(|run| status.is_none_or(|s| run.status == s)),
        ))
    }

    async fn count(&self, status: RunStatus) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state.runs.values().filter(|run| run.status == status).count())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.runs.len();
        state.runs.retain(|_, run| {
            !(run.status.is_terminal() && run.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - state.runs.len()) as u64)
    }
}
