//! Scheduler configuration.
//!
//! ファイルでは duration を整数秒で書きます（`tick_interval = 5`）。
//! テストでは構造体を直接組み立てて ms 単位の値も使えます。

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::BackoffPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid scheduler config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Pause between ticks of one engine worker.
    #[serde(with = "duration_secs")]
    pub tick_interval: Duration,
    /// Wall-clock limit for one invocation.
    #[serde(with = "duration_secs")]
    pub task_timeout: Duration,
    /// How long an acquired lease is valid. Must outlive `task_timeout`.
    #[serde(with = "duration_secs")]
    pub lease_duration: Duration,
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub backoff_base: Duration,
    #[serde(with = "duration_secs")]
    pub backoff_cap: Duration,
    /// Upper bound on due rows fetched per tick.
    pub batch_size: usize,
    pub workers: usize,
    /// Finished rows older than this are removed by `Scheduler::prune`.
    #[serde(with = "duration_secs")]
    pub retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            task_timeout: Duration::from_secs(300),
            lease_duration: Duration::from_secs(600),
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(300),
            batch_size: 32,
            workers: 1,
            retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("tick_interval", self.tick_interval),
            ("task_timeout", self.task_timeout),
            ("lease_duration", self.lease_duration),
            ("retention", self.retention),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.backoff_cap < self.backoff_base {
            return Err(ConfigError::invalid(
                "backoff_cap",
                format!("({:?}) must be >= backoff_base ({:?})", self.backoff_cap, self.backoff_base),
            ));
        }
        if self.lease_duration <= self.task_timeout {
            return Err(ConfigError::invalid(
                "lease_duration",
                format!(
                    "({:?}) must be longer than task_timeout ({:?})",
                    self.lease_duration, self.task_timeout
                ),
            ));
        }
        Ok(())
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.backoff_base, self.backoff_cap)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
