//! TaskRun: the persisted row for one execution instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::Settlement;
use super::descriptor::TaskDescriptor;
use super::ids::{InstanceId, LeaseToken};
use super::state::RunStatus;
use super::task::TaskIdentity;

/// One execution instance of a [`TaskDescriptor`].
///
/// 行は in-memory / SQLite どちらの store でも同じ形で扱います。
/// lease_owner / lease_expires_at は `Leased` のときだけ `Some`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub instance_id: InstanceId,
    pub descriptor: TaskDescriptor,
    pub status: RunStatus,
    pub next_due_at: DateTime<Utc>,
    /// Failed attempts so far. Never decreases.
    pub attempt: u32,
    pub lease_owner: Option<LeaseToken>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    pub fn pending(
        instance_id: InstanceId,
        descriptor: TaskDescriptor,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id,
            descriptor,
            status: RunStatus::Pending,
            next_due_at: due_at,
            attempt: 0,
            lease_owner: None,
            lease_expires_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.descriptor.identity
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Pending && self.next_due_at <= now
    }

    /// Leased and the lease has not run out yet.
    pub fn has_live_lease(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Leased && self.lease_expires_at.is_some_and(|at| at > now)
    }

    /// Leased but the holder is presumed dead. Expiry is inclusive: at `expires_at` the lease is gone.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Leased && self.lease_expires_at.is_none_or(|at| at <= now)
    }

    /// Whether a new lease may be taken on this row (ignoring other rows of the same identity).
    pub fn is_acquirable(&self, now: DateTime<Utc>) -> bool {
        self.is_due(now) || self.lease_expired(now)
    }

    pub fn grant_lease(&mut self, token: LeaseToken, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = RunStatus::Leased;
        self.lease_owner = Some(token);
        self.lease_expires_at = Some(expires_at);
        self.updated_at = now;
    }

    /// Apply a settlement. The caller has already checked the lease token.
    pub fn settle(&mut self, settlement: &Settlement) {
        self.status = settlement.status;
        self.attempt = settlement.attempt;
        if let Some(due) = settlement.next_due_at {
            self.next_due_at = due;
        }
        self.last_error = settlement.last_error.clone();
        self.lease_owner = None;
        self.lease_expires_at = None;
        self.updated_at = settlement.settled_at;
        if settlement.status.is_terminal() {
            self.completed_at = Some(settlement.settled_at);
        }
    }

    pub fn abandon(&mut self, reason: &str, now: DateTime<Utc>) {
        self.status = RunStatus::Abandoned;
        self.last_error = Some(reason.to_string());
        self.lease_owner = None;
        self.lease_expires_at = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}
