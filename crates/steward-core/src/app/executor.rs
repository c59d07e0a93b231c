//! TaskExecutor - 1 回の実行を timeout 付きで走らせ、結果を分類する
//!
//! handler は別 task として spawn するので、panic しても engine は落ちません。
//! timeout したら JoinHandle を abort して RetryableFailure を返します。

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::domain::{Outcome, Parameters};
use crate::typed::DynHandler;

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskExecutor;

impl TaskExecutor {
    pub async fn execute(
        &self,
        handler: Arc<dyn DynHandler>,
        parameters: Parameters,
        timeout: Duration,
    ) -> Outcome {
        let identity = handler.identity();
        let mut join = tokio::spawn(async move { handler.run(&parameters).await });

        match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                warn!(identity, %message, "task panicked");
                Outcome::retryable(format!("task panicked: {message}"))
            }
            Ok(Err(e)) => Outcome::retryable(format!("task was cancelled: {e}")),
            Err(_) => {
                join.abort();
                warn!(identity, ?timeout, "task timed out; invocation cancelled");
                Outcome::retryable(format!("timed out after {timeout:?}"))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskError;
    use crate::typed::{Handler, Task, TypedHandler};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Deserialize)]
    struct Job {
        mode: String,
    }

    impl Task for Job {
        const IDENTITY: &'static str = "Job";
    }

    #[derive(Default)]
    struct JobHandler {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Handler<Job> for JobHandler {
        async fn handle(&self, job: Job) -> Result<(), TaskError> {
            match job.mode.as_str() {
                "sleep" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    self.finished.store(true, Ordering::SeqCst);
                    Ok(())
                }
                "panic" => panic!("kaboom"),
                "stop" => Err(TaskError::terminal("malformed")),
                _ => Ok(()),
            }
        }
    }

    fn run_with(mode: &str) -> Parameters {
        let mut p = Parameters::new();
        p.insert("mode".into(), mode.into());
        p
    }

    fn handler(finished: Arc<AtomicBool>) -> Arc<dyn DynHandler> {
        Arc::new(TypedHandler::<Job, _>::new(JobHandler { finished }))
    }

    #[tokio::test]
    async fn passes_through_handler_outcome() {
        let h = handler(Arc::default());
        let ok = TaskExecutor.execute(h.clone(), run_with("ok"), Duration::from_secs(1)).await;
        let stop = TaskExecutor.execute(h, run_with("stop"), Duration::from_secs(1)).await;

        assert_eq!(ok, Outcome::Success);
        assert_eq!(stop, Outcome::terminal("malformed"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_retryable_and_cancels() {
        let finished = Arc::new(AtomicBool::new(false));
        let outcome = TaskExecutor
            .execute(handler(finished.clone()), run_with("sleep"), Duration::from_millis(50))
            .await;

        assert!(matches!(outcome, Outcome::RetryableFailure(ref r) if r.starts_with("timed out")));

        // abort 済みなので、sleep が明けても完了フラグは立たない
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panic_is_captured_as_retryable() {
        let outcome = TaskExecutor
            .execute(handler(Arc::default()), run_with("panic"), Duration::from_secs(1))
            .await;

        match outcome {
            Outcome::RetryableFailure(reason) => assert!(reason.contains("kaboom"), "{reason}"),
            other => panic!("expected retryable failure, got {other:?}"),
        }
    }
}
