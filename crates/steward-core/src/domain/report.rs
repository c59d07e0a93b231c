//! Per-attempt execution report handed to Reporter sinks.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::decision::Settlement;
use super::ids::InstanceId;
use super::outcome::Outcome;
use super::state::RunStatus;
use super::task::TaskIdentity;

/// What happened to the attempt, including the engine-level outcomes a task never sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedOutcome {
    Success,
    RetryableFailure(String),
    TerminalFailure(String),
    /// The previous holder's lease ran out before it settled.
    LeaseExpired,
    /// The identity is not in the registry. Nothing was executed.
    UnknownTask,
}

impl ReportedOutcome {
    /// Stable label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetryableFailure(_) => "retryable_failure",
            Self::TerminalFailure(_) => "terminal_failure",
            Self::LeaseExpired => "lease_expired",
            Self::UnknownTask => "unknown_task",
        }
    }
}

impl From<&Outcome> for ReportedOutcome {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success => Self::Success,
            Outcome::RetryableFailure(r) => Self::RetryableFailure(r.clone()),
            Outcome::TerminalFailure(r) => Self::TerminalFailure(r.clone()),
        }
    }
}

/// What the engine did with the row afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    Succeeded { next_run_at: Option<DateTime<Utc>> },
    RetryScheduled { at: DateTime<Utc> },
    Failed { next_run_at: Option<DateTime<Utc>> },
    Abandoned,
    /// The settle was discarded because another engine reclaimed the lease first.
    LeaseLost,
}

impl Disposition {
    pub fn from_settlement(settlement: &Settlement) -> Self {
        let next_run_at = settlement.successor.as_ref().map(|s| s.next_due_at);
        match settlement.status {
            RunStatus::Succeeded => Self::Succeeded { next_run_at },
            RunStatus::Failed => Self::Failed { next_run_at },
            RunStatus::Abandoned => Self::Abandoned,
            RunStatus::Pending | RunStatus::Leased => Self::RetryScheduled {
                at: settlement.next_due_at.unwrap_or(settlement.settled_at),
            },
        }
    }
}

/// One report per execution attempt (and per unknown-task / lease-expired settlement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub instance_id: InstanceId,
    pub identity: TaskIdentity,
    /// 1-based ordinal of this attempt within the run. For `UnknownTask` it is the
    /// stored attempt count, since nothing ran.
    pub attempt: u32,
    pub outcome: ReportedOutcome,
    pub duration_ms: u64,
    pub disposition: Disposition,
    pub reported_at: DateTime<Utc>,
}
