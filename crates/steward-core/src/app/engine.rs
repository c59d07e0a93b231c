//! SchedulerEngine - 1 tick 分の制御ループ
//!
//! # 1 tick の流れ
//! 1. lease が切れた行を回収し、LeaseExpired（= 暗黙の RetryableFailure）として確定
//! 2. due な Pending 行を `(next_due_at, instance_id)` 順に取得（batch_size 件まで）
//! 3. 行ごとに: registry で解決 → lease 取得 → 実行 → Decider → token 条件付きで確定 → report
//!
//! 未登録の identity は lease を取る前に弾き、Pending から直接 Abandoned にします。
//! store のエラーはその tick を中断しますが、worker は止めません（呼び出し側で log）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::executor::TaskExecutor;
use super::scheduler::Components;
use crate::domain::backoff::as_chrono;
use crate::domain::{
    Decision, Disposition, ExecutionReport, LeaseToken, Outcome, ReportedOutcome, RunStatus,
    Settlement, TaskRun,
};
use crate::error::SchedulerError;
use crate::typed::RegistryError;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Expired leases this engine won back.
    pub reclaimed: usize,
    pub executed: usize,
    pub succeeded: usize,
    pub retried: usize,
    /// Recurring runs that ran out of attempts (kept as `Failed`, successor scheduled).
    pub failed: usize,
    pub abandoned: usize,
    /// Due rows another engine got to first.
    pub skipped: usize,
    /// Settles discarded because the lease had been reclaimed in the meantime.
    pub lost: usize,
}

impl TickSummary {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    fn record(&mut self, status: RunStatus) {
        match status {
            RunStatus::Succeeded => self.succeeded += 1,
            RunStatus::Pending => self.retried += 1,
            RunStatus::Failed => self.failed += 1,
            RunStatus::Abandoned => self.abandoned += 1,
            RunStatus::Leased => {}
        }
    }
}

fn stopping(shutdown: Option<&watch::Receiver<bool>>) -> bool {
    shutdown.is_some_and(|rx| *rx.borrow())
}

/// One engine worker. Cheap to clone; every clone shares the same store and registry.
#[derive(Clone)]
pub struct SchedulerEngine {
    parts: Arc<Components>,
    worker: String,
}

impl SchedulerEngine {
    pub(crate) fn new(parts: Arc<Components>, worker: String) -> Self {
        Self { parts, worker }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub async fn tick(&self) -> Result<TickSummary, SchedulerError> {
        self.run_tick(None).await
    }

    /// `tick` that stops taking new leases once `shutdown` turns true.
    /// The invocation already in flight runs to completion and is settled.
    pub async fn tick_until(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<TickSummary, SchedulerError> {
        self.run_tick(Some(shutdown)).await
    }

    async fn run_tick(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<TickSummary, SchedulerError> {
        let mut summary = TickSummary::default();

        self.reclaim_expired(shutdown, &mut summary).await?;

        let now = self.parts.clock.now();
        let due = self
            .parts
            .store
            .due(now, self.parts.config.batch_size)
            .await?;
        for run in due {
            if stopping(shutdown) {
                debug!(worker = %self.worker, "shutdown requested; leaving remaining due rows");
                break;
            }
            self.dispatch(run, &mut summary).await?;
        }

        if !summary.is_idle() {
            debug!(worker = %self.worker, ?summary, "tick finished");
        }
        Ok(summary)
    }

    fn lease_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + as_chrono(self.parts.config.lease_duration)
    }

    async fn reclaim_expired(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
        summary: &mut TickSummary,
    ) -> Result<(), SchedulerError> {
        let now = self.parts.clock.now();
        let stale = self
            .parts
            .store
            .expired_leases(now, self.parts.config.batch_size)
            .await?;

        for run in stale {
            if stopping(shutdown) {
                break;
            }
            let token = self.parts.ids.generate_lease_token();
            let Some(leased) = self
                .parts
                .store
                .try_acquire(run.instance_id, token, now, self.lease_until(now))
                .await?
            else {
                debug!(instance_id = %run.instance_id, "expired lease already reclaimed elsewhere");
                continue;
            };

            summary.reclaimed += 1;
            warn!(
                worker = %self.worker,
                instance_id = %leased.instance_id,
                identity = %leased.identity(),
                previous_owner = ?run.lease_owner,
                expired_at = ?run.lease_expires_at,
                "reclaiming expired lease"
            );
            let outcome = Outcome::retryable(match run.lease_expires_at {
                Some(at) => format!("lease expired at {at}"),
                None => "lease expired".to_string(),
            });
            self.settle(
                &leased,
                token,
                &outcome,
                ReportedOutcome::LeaseExpired,
                Duration::ZERO,
                summary,
            )
            .await?;
        }
        Ok(())
    }

    async fn dispatch(&self, run: TaskRun, summary: &mut TickSummary) -> Result<(), SchedulerError> {
        let handler = match self.parts.registry.resolve(run.identity()) {
            Ok(handler) => handler,
            Err(err) => return self.abandon_unknown(&run, &err, summary).await,
        };

        let now = self.parts.clock.now();
        let token = self.parts.ids.generate_lease_token();
        let Some(leased) = self
            .parts
            .store
            .try_acquire(run.instance_id, token, now, self.lease_until(now))
            .await?
        else {
            summary.skipped += 1;
            debug!(
                worker = %self.worker,
                instance_id = %run.instance_id,
                identity = %run.identity(),
                "not acquirable (lease held elsewhere); skipping"
            );
            return Ok(());
        };

        debug!(
            worker = %self.worker,
            instance_id = %leased.instance_id,
            identity = %leased.identity(),
            attempt = leased.attempt + 1,
            "lease acquired; dispatching"
        );

        let started = Instant::now();
        let outcome = TaskExecutor
            .execute(
                handler,
                leased.descriptor.parameters.clone(),
                self.parts.config.task_timeout,
            )
            .await;
        let elapsed = started.elapsed();
        summary.executed += 1;

        self.settle(
            &leased,
            token,
            &outcome,
            ReportedOutcome::from(&outcome),
            elapsed,
            summary,
        )
        .await
    }

    async fn abandon_unknown(
        &self,
        run: &TaskRun,
        err: &RegistryError,
        summary: &mut TickSummary,
    ) -> Result<(), SchedulerError> {
        let now = self.parts.clock.now();
        let reason = err.to_string();
        if !self.parts.store.abandon(run.instance_id, &reason, now).await? {
            // 他の engine が先に abandon した
            summary.skipped += 1;
            return Ok(());
        }

        summary.abandoned += 1;
        error!(
            instance_id = %run.instance_id,
            identity = %run.identity(),
            "unknown task identity; run abandoned without being leased"
        );
        self.parts.reporter.report(&ExecutionReport {
            instance_id: run.instance_id,
            identity: run.identity().clone(),
            attempt: run.attempt,
            outcome: ReportedOutcome::UnknownTask,
            duration_ms: 0,
            disposition: Disposition::Abandoned,
            reported_at: now,
        });
        Ok(())
    }

    async fn settle(
        &self,
        run: &TaskRun,
        token: LeaseToken,
        outcome: &Outcome,
        reported: ReportedOutcome,
        elapsed: Duration,
        summary: &mut TickSummary,
    ) -> Result<(), SchedulerError> {
        let now = self.parts.clock.now();
        let decision = self.parts.decider.decide(run, outcome, now);
        let settlement =
            Settlement::from_decision(&decision, run, now, || self.parts.ids.generate_instance_id());
        let disposition = Disposition::from_settlement(&settlement);
        let status = settlement.status;

        let applied = self
            .parts
            .store
            .settle(run.instance_id, token, settlement)
            .await?;

        let disposition = if applied {
            summary.record(status);
            self.log_decision(run, &decision);
            disposition
        } else {
            summary.lost += 1;
            warn!(
                worker = %self.worker,
                instance_id = %run.instance_id,
                identity = %run.identity(),
                "lease lost before settle; result discarded"
            );
            Disposition::LeaseLost
        };

        self.parts.reporter.report(&ExecutionReport {
            instance_id: run.instance_id,
            identity: run.identity().clone(),
            attempt: run.attempt.saturating_add(1),
            outcome: reported,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            disposition,
            reported_at: now,
        });
        Ok(())
    }

    fn log_decision(&self, run: &TaskRun, decision: &Decision) {
        match decision {
            Decision::Complete { reschedule_at } => info!(
                instance_id = %run.instance_id,
                identity = %run.identity(),
                next_run_at = ?reschedule_at,
                "run succeeded"
            ),
            Decision::Retry {
                attempt,
                next_due_at,
                reason,
            } => warn!(
                instance_id = %run.instance_id,
                identity = %run.identity(),
                attempt,
                %next_due_at,
                %reason,
                "attempt failed; retry scheduled"
            ),
            Decision::GiveUp {
                attempt,
                reason,
                reschedule_at,
            } => warn!(
                instance_id = %run.instance_id,
                identity = %run.identity(),
                attempt,
                status = %decision.status(),
                next_run_at = ?reschedule_at,
                %reason,
                "giving up on run"
            ),
        }
    }
}
