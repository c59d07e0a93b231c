use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use super::engine::SchedulerEngine;

/// Engine worker group handle.
/// - 各 worker は `tick_interval` ごとに tick する
/// - `trigger()` で全 worker を即時 tick させる
/// - `request_shutdown()` は新しい tick を止めるだけで、実行中の task は最後まで走る
/// - `shutdown_and_join()` で全 worker の終了を待てる
pub struct EngineGroup {
    shutdown_tx: watch::Sender<bool>,
    triggers: Vec<Arc<Notify>>,
    joins: Vec<JoinHandle<()>>,
}

impl EngineGroup {
    pub fn spawn(engines: Vec<SchedulerEngine>, tick_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut triggers = Vec::with_capacity(engines.len());
        let mut joins = Vec::with_capacity(engines.len());
        for engine in engines {
            let trigger = Arc::new(Notify::new());
            let mut rx = shutdown_rx.clone();
            let wake = Arc::clone(&trigger);

            let join = tokio::spawn(async move {
                worker_loop(engine, tick_interval, wake, &mut rx).await;
            });
            triggers.push(trigger);
            joins.push(join);
        }

        Self {
            shutdown_tx,
            triggers,
            joins,
        }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Wake every worker for an immediate tick. A worker busy mid-tick ticks again right after.
    pub fn trigger(&self) {
        for trigger in &self.triggers {
            // notify_one は permit を保存するので、待っていない worker にも届く
            trigger.notify_one();
        }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                error!(error = %e, "engine worker terminated abnormally");
            }
        }
    }
}

async fn worker_loop(
    engine: SchedulerEngine,
    tick_interval: Duration,
    trigger: Arc<Notify>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    info!(worker = engine.worker(), ?tick_interval, "engine worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match engine.tick_until(shutdown_rx).await {
            Ok(summary) if summary.is_idle() => trace!(worker = engine.worker(), "idle tick"),
            Ok(summary) => debug!(worker = engine.worker(), ?summary, "tick complete"),
            // store 障害はこの tick だけ諦めて、次の tick で再試行
            Err(e) => error!(worker = engine.worker(), error = %e, "tick aborted"),
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = trigger.notified() => {}
            _ = tokio::time::sleep(tick_interval) => {}
        }
    }

    info!(worker = engine.worker(), "engine worker stopped");
}
