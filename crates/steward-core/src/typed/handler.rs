//! Handler trait - Task を実行する Handler の定義
//!
//! - `Handler<T>`: 型付き。`T` しか受け取れない
//! - `DynHandler`: object-safe。parameters map を受け取って Outcome を返す
//! - `TypedHandler<T, H>`: 前者を後者に変換する type erasure wrapper

use async_trait::async_trait;
use std::marker::PhantomData;

use super::task::Task;
use crate::domain::{Outcome, Parameters, TaskError};

/// Runs one task kind.
///
/// Implementations must be idempotent: a retry re-runs with the same parameters.
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T) -> Result<(), TaskError>;
}

/// Object-safe form stored in the registry.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn run(&self, parameters: &Parameters) -> Outcome;

    fn identity(&self) -> &'static str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn run(&self, parameters: &Parameters) -> Outcome {
        // decode できない parameters は何度やっても decode できない → terminal
        let task: T = match serde_json::to_value(parameters).and_then(serde_json::from_value) {
            Ok(task) => task,
            Err(e) => return Outcome::terminal(format!("invalid parameters for {}: {e}", T::IDENTITY)),
        };
        self.handler.handle(task).await.into()
    }

    fn identity(&self) -> &'static str {
        T::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Scalar;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Resize {
        width: i64,
        #[serde(default)]
        fail: Option<String>,
    }

    impl Task for Resize {
        const IDENTITY: &'static str = "Resize";
    }

    struct ResizeHandler;

    #[async_trait]
    impl Handler<Resize> for ResizeHandler {
        async fn handle(&self, task: Resize) -> Result<(), TaskError> {
            match task.fail.as_deref() {
                Some("retry") => Err(TaskError::retryable("upstream busy")),
                Some("stop") => Err(TaskError::terminal(format!("width {} unsupported", task.width))),
                _ => Ok(()),
            }
        }
    }

    fn params(pairs: &[(&str, Scalar)]) -> Parameters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn decodes_and_runs() {
        let handler = TypedHandler::<Resize, _>::new(ResizeHandler);
        let outcome = handler.run(&params(&[("width", Scalar::Int(640))])).await;
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(handler.identity(), "Resize");
    }

    #[tokio::test]
    async fn handler_errors_keep_their_class() {
        let handler = TypedHandler::<Resize, _>::new(ResizeHandler);

        let retry = handler
            .run(&params(&[("width", Scalar::Int(1)), ("fail", "retry".into())]))
            .await;
        assert_eq!(retry, Outcome::retryable("upstream busy"));

        let stop = handler
            .run(&params(&[("width", Scalar::Int(1)), ("fail", "stop".into())]))
            .await;
        assert!(matches!(stop, Outcome::TerminalFailure(_)));
    }

    #[tokio::test]
    async fn undecodable_parameters_are_terminal() {
        let handler = TypedHandler::<Resize, _>::new(ResizeHandler);

        let missing = handler.run(&Parameters::new()).await;
        let wrong_type = handler.run(&params(&[("width", "wide".into())])).await;

        for outcome in [missing, wrong_type] {
            match outcome {
                Outcome::TerminalFailure(reason) => assert!(reason.contains("invalid parameters")),
                other => panic!("expected terminal failure, got {other:?}"),
            }
        }
    }
}
