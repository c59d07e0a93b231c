//! Decision model: what happens to a run after an attempt.
//!
//! Decider は純粋関数 (current row + outcome + now → Decision)。
//! 実際の書き込み (Settlement) は engine が store に対して行います。

use chrono::{DateTime, Utc};

use super::backoff::{BackoffPolicy, as_chrono};
use super::ids::InstanceId;
use super::outcome::Outcome;
use super::record::TaskRun;
use super::state::RunStatus;

/// The next action for a run whose attempt just finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Mark `Succeeded`. Recurring runs get a successor at `reschedule_at`.
    Complete {
        reschedule_at: Option<DateTime<Utc>>,
    },

    /// Back to `Pending` with a backed-off due time.
    Retry {
        attempt: u32,
        next_due_at: DateTime<Utc>,
        reason: String,
    },

    /// No retries left (or the failure was terminal).
    /// One-off runs are abandoned; recurring runs are kept as `Failed` and rescheduled fresh.
    GiveUp {
        attempt: u32,
        reason: String,
        reschedule_at: Option<DateTime<Utc>>,
    },
}

impl Decision {
    /// Status the finished row ends up in.
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Complete { .. } => RunStatus::Succeeded,
            Self::Retry { .. } => RunStatus::Pending,
            Self::GiveUp {
                reschedule_at: Some(_),
                ..
            } => RunStatus::Failed,
            Self::GiveUp { .. } => RunStatus::Abandoned,
        }
    }

    pub fn reschedule_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Complete { reschedule_at } | Self::GiveUp { reschedule_at, .. } => *reschedule_at,
            Self::Retry { .. } => None,
        }
    }
}

/// Decides the next action from the row and the attempt's outcome.
///
/// Implementations must not perform side effects.
pub trait Decider: Send + Sync {
    fn decide(&self, run: &TaskRun, outcome: &Outcome, now: DateTime<Utc>) -> Decision;
}

/// Attempt-budget decider with capped exponential backoff.
///
/// - `RetryableFailure`: attempt += 1, retry while `attempt < max_attempts`
/// - `TerminalFailure`: attempt += 1, give up immediately
/// - recurring runs always get a successor at `now + interval`, success or not
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl DefaultDecider {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, run: &TaskRun, outcome: &Outcome, now: DateTime<Utc>) -> Decision {
        let reschedule_at = run.descriptor.schedule.interval().map(|every| now + every);

        match outcome {
            Outcome::Success => Decision::Complete { reschedule_at },
            Outcome::RetryableFailure(reason) => {
                let attempt = run.attempt.saturating_add(1);
                if attempt < self.max_attempts {
                    Decision::Retry {
                        attempt,
                        next_due_at: now + as_chrono(self.backoff.delay(attempt)),
                        reason: reason.clone(),
                    }
                } else {
                    Decision::GiveUp {
                        attempt,
                        reason: format!("{reason} (gave up after {attempt}/{} attempts)", self.max_attempts),
                        reschedule_at,
                    }
                }
            }
            Outcome::TerminalFailure(reason) => Decision::GiveUp {
                attempt: run.attempt.saturating_add(1),
                reason: reason.clone(),
                reschedule_at,
            },
        }
    }
}

/// The write the engine asks the store to apply, conditional on the lease token.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub status: RunStatus,
    pub attempt: u32,
    /// Only set on retry; otherwise the row keeps its due time.
    pub next_due_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub settled_at: DateTime<Utc>,
    /// Fresh `Pending` row for the next recurrence, inserted in the same atomic step.
    pub successor: Option<TaskRun>,
}

impl Settlement {
    pub fn from_decision(
        decision: &Decision,
        run: &TaskRun,
        now: DateTime<Utc>,
        next_id: impl FnOnce() -> InstanceId,
    ) -> Self {
        let successor = decision
            .reschedule_at()
            .map(|due| TaskRun::pending(next_id(), run.descriptor.clone(), due, now));

        match decision {
            Decision::Complete { .. } => Self {
                status: RunStatus::Succeeded,
                attempt: run.attempt,
                next_due_at: None,
                last_error: None,
                settled_at: now,
                successor,
            },
            Decision::Retry {
                attempt,
                next_due_at,
                reason,
            } => Self {
                status: RunStatus::Pending,
                attempt: *attempt,
                next_due_at: Some(*next_due_at),
                last_error: Some(reason.clone()),
                settled_at: now,
                successor,
            },
            Decision::GiveUp {
                attempt, reason, ..
            } => Self {
                status: decision.status(),
                attempt: *attempt,
                next_due_at: None,
                last_error: Some(reason.clone()),
                settled_at: now,
                successor,
            },
        }
    }
}
