//! Outcome of running a task once, and the error type task code returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result of one execution attempt as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    /// Transient problem; the attempt may be repeated after a backoff.
    RetryableFailure(String),
    /// Re-running cannot help (bad input, unknown target, ...).
    TerminalFailure(String),
}

impl Outcome {
    pub fn success() -> Self {
        Self::Success
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::RetryableFailure(reason.into())
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Self::TerminalFailure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::RetryableFailure(r) | Self::TerminalFailure(r) => Some(r),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::RetryableFailure(r) => write!(f, "retryable failure: {r}"),
            Self::TerminalFailure(r) => write!(f, "terminal failure: {r}"),
        }
    }
}

/// Error returned by task handlers.
///
/// handler 側は「もう一度やれば直るかどうか」だけを選ぶ。
/// 何回目で諦めるかは Decider の仕事。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Terminal(String),
}

impl TaskError {
    pub fn retryable(reason: impl fmt::Display) -> Self {
        Self::Retryable(reason.to_string())
    }

    pub fn terminal(reason: impl fmt::Display) -> Self {
        Self::Terminal(reason.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

// Errors bubbling up from task code with `?` default to retryable.
impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        Self::Retryable(err.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Retryable(err.to_string())
    }
}

impl From<TaskError> for Outcome {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Retryable(r) => Outcome::RetryableFailure(r),
            TaskError::Terminal(r) => Outcome::TerminalFailure(r),
        }
    }
}

impl From<Result<(), TaskError>> for Outcome {
    fn from(result: Result<(), TaskError>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(err) => err.into(),
        }
    }
}
