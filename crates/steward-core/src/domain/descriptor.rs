//! TaskDescriptor: what to run, with which parameters, on which schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::{Parameters, Scalar, TaskIdentity};

/// When a task should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Run a single time at (or after) `at`.
    RunOnce { at: DateTime<Utc> },
    /// Run every `interval_seconds`, measured from the completion of the previous run.
    Recurring { interval_seconds: u32 },
}

impl Schedule {
    pub fn interval(&self) -> Option<chrono::Duration> {
        match self {
            Self::RunOnce { .. } => None,
            Self::Recurring { interval_seconds } => {
                Some(chrono::Duration::seconds(i64::from(*interval_seconds)))
            }
        }
    }

    /// 最初の実行時刻。Recurring は登録した瞬間に due になる
    pub fn first_due_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::RunOnce { at } => *at,
            Self::Recurring { .. } => now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("task identity must not be empty")]
    EmptyIdentity,

    #[error("recurring interval must be at least one second")]
    ZeroInterval,
}

/// Immutable description of a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub identity: TaskIdentity,
    #[serde(default)]
    pub parameters: Parameters,
    pub schedule: Schedule,
}

impl TaskDescriptor {
    pub fn once(identity: impl Into<TaskIdentity>, at: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            parameters: Parameters::new(),
            schedule: Schedule::RunOnce { at },
        }
    }

    pub fn recurring(identity: impl Into<TaskIdentity>, interval_seconds: u32) -> Self {
        Self {
            identity: identity.into(),
            parameters: Parameters::new(),
            schedule: Schedule::Recurring { interval_seconds },
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.identity.as_str().trim().is_empty() {
            return Err(DescriptorError::EmptyIdentity);
        }
        if let Schedule::Recurring { interval_seconds: 0 } = self.schedule {
            return Err(DescriptorError::ZeroInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn recurring_is_due_immediately() {
        let d = TaskDescriptor::recurring("PopulateSchedulerTask", 60);
        assert_eq!(d.schedule.first_due_at(t0()), t0());
        assert_eq!(d.schedule.interval(), Some(chrono::Duration::seconds(60)));
    }

    #[test]
    fn run_once_is_due_at_its_instant() {
        let at = t0() + chrono::Duration::minutes(5);
        let d = TaskDescriptor::once("Cleanup", at);
        assert_eq!(d.schedule.first_due_at(t0()), at);
        assert!(d.schedule.interval().is_none());
    }

    #[test]
    fn validate_rejects_zero_interval_and_blank_identity() {
        assert_eq!(
            TaskDescriptor::recurring("X", 0).validate(),
            Err(DescriptorError::ZeroInterval)
        );
        assert_eq!(
            TaskDescriptor::once("  ", t0()).validate(),
            Err(DescriptorError::EmptyIdentity)
        );
        assert!(TaskDescriptor::recurring("X", 1).validate().is_ok());
    }

    #[test]
    fn schedule_json_shape() {
        let json = serde_json::to_value(Schedule::Recurring { interval_seconds: 60 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "recurring", "interval_seconds": 60}));
    }
}
