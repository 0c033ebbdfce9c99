// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The queue orchestrator.
//!
//! Dequeues stage entries, dispatches them to handlers, and centralizes the
//! failure semantics: every handler error passes through the classifier.
//! Retryable categories go back to the queue with exponential backoff;
//! permanent categories (and exhausted retries) mark the job failed and
//! enqueue exactly one terminal failure notification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use echocal_core::payload::{NotifyOutcome, NotifyPayload, StagePayload};
use echocal_core::types::{JobId, JobState, Stage};
use echocal_core::EchocalError;
use echocal_storage::models::{QueueEntry, QueueStatus};
use echocal_storage::queries::{jobs, queue};

use crate::classify::classify_error;
use crate::handlers::{PipelineContext, StageHandler, StageOutcome, all_handlers};

/// Retry and pause settings applied by the orchestrator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base for the exponential backoff, in seconds.
    pub backoff_base_secs: u64,
    /// Fixed redelivery delay while a stage is paused for testing.
    pub pause_retry_delay_secs: u64,
}

impl RetryPolicy {
    /// Backoff before the next attempt: `base * 2^attempts` with ±20% jitter.
    pub fn backoff_secs(&self, attempts: i32) -> i64 {
        let base = self.backoff_base_secs.saturating_mul(1u64 << attempts.clamp(0, 16)) as f64;
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        (base * jitter).round().max(1.0) as i64
    }
}

/// Every stage payload carries the job id; this is the minimal view the
/// failure path needs to update the job row.
#[derive(Deserialize)]
struct JobRef {
    job_id: JobId,
}

pub struct Orchestrator {
    ctx: Arc<PipelineContext>,
    handlers: HashMap<Stage, Box<dyn StageHandler>>,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(ctx: Arc<PipelineContext>, policy: RetryPolicy) -> Self {
        let handlers = all_handlers(ctx.clone())
            .into_iter()
            .map(|h| (h.stage(), h))
            .collect();
        Self {
            ctx,
            handlers,
            policy,
        }
    }

    /// Dequeue and execute at most one entry. Returns whether one was found.
    ///
    /// Errors are bookkeeping failures only (the storage layer refusing an
    /// ack or a retry update); handler errors are consumed by the retry
    /// policy and never surface here.
    pub async fn tick(&self) -> Result<bool, EchocalError> {
        let Some(entry) = queue::dequeue(&self.ctx.db).await? else {
            return Ok(false);
        };
        self.execute(&entry).await?;
        Ok(true)
    }

    /// Execute entries until the queue has nothing due. Returns the count.
    pub async fn drain(&self) -> Result<usize, EchocalError> {
        let mut executed = 0;
        while self.tick().await? {
            executed += 1;
        }
        Ok(executed)
    }

    async fn execute(&self, entry: &QueueEntry) -> Result<(), EchocalError> {
        let Some(handler) = self.handlers.get(&entry.stage) else {
            error!(id = entry.id, stage = %entry.stage, "no handler for stage");
            queue::fail_permanent(&self.ctx.db, entry.id).await?;
            return Ok(());
        };

        debug!(id = entry.id, stage = %entry.stage, attempts = entry.attempts, "executing stage entry");
        match handler.run(&entry.payload).await {
            Ok(StageOutcome::Done) => queue::ack(&self.ctx.db, entry.id).await,
            Ok(StageOutcome::Paused) => {
                queue::reschedule(
                    &self.ctx.db,
                    entry.id,
                    self.policy.pause_retry_delay_secs as i64,
                )
                .await
            }
            Err(e) => self.handle_failure(entry, e).await,
        }
    }

    async fn handle_failure(
        &self,
        entry: &QueueEntry,
        err: EchocalError,
    ) -> Result<(), EchocalError> {
        let verdict = classify_error(&err);
        let job_id = serde_json::from_str::<JobRef>(&entry.payload)
            .ok()
            .map(|r| r.job_id);

        if let Some(job_id) = &job_id {
            jobs::record_stage_error(&self.ctx.db, job_id, entry.stage, &verdict.internal_message)
                .await?;
        }

        if !verdict.is_retryable {
            error!(
                id = entry.id,
                stage = %entry.stage,
                category = %verdict.category,
                error = %verdict.internal_message,
                "permanent stage failure"
            );
            queue::fail_permanent(&self.ctx.db, entry.id).await?;
            if let Some(job_id) = job_id {
                self.terminal_failure(&job_id, entry.stage, verdict.user_facing_message)
                    .await?;
            }
            return Ok(());
        }

        let backoff = self.policy.backoff_secs(entry.attempts);
        match queue::fail(&self.ctx.db, entry.id, backoff).await? {
            QueueStatus::Pending => {
                warn!(
                    id = entry.id,
                    stage = %entry.stage,
                    category = %verdict.category,
                    attempts = entry.attempts + 1,
                    backoff_secs = backoff,
                    error = %verdict.internal_message,
                    "stage failed, retry scheduled"
                );
            }
            _ => {
                error!(
                    id = entry.id,
                    stage = %entry.stage,
                    category = %verdict.category,
                    error = %verdict.internal_message,
                    "stage failed, retries exhausted"
                );
                if let Some(job_id) = job_id {
                    self.terminal_failure(&job_id, entry.stage, verdict.user_facing_message)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Mark the job failed and make sure the user hears about it.
    ///
    /// Skipped when the notification stage itself is the one failing; the
    /// user is unreachable and a retry loop would never terminate.
    async fn terminal_failure(
        &self,
        job_id: &JobId,
        stage: Stage,
        user_message: String,
    ) -> Result<(), EchocalError> {
        jobs::update_state(&self.ctx.db, job_id, JobState::Failed).await?;
        if stage == Stage::SendNotification {
            return Ok(());
        }
        let payload = NotifyPayload {
            job_id: job_id.clone(),
            outcome: NotifyOutcome::Failure { user_message },
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| EchocalError::Internal(e.to_string()))?;
        queue::enqueue(
            &self.ctx.db,
            NotifyPayload::STAGE,
            &body,
            &payload.dedup_key(),
            self.ctx.queue_max_attempts,
            0,
        )
        .await?;
        info!(%job_id, %stage, "terminal failure, notification enqueued");
        Ok(())
    }
}

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Run the worker loop until cancelled.
///
/// Drains due entries back-to-back, sleeps for `poll_interval` when idle,
/// and runs queue maintenance (stale-lock release, completed-entry pruning)
/// about once a minute.
pub async fn run_worker(
    orchestrator: Arc<Orchestrator>,
    poll_interval: Duration,
    prune_completed_after_secs: i64,
    cancel: CancellationToken,
) {
    info!("pipeline worker started");
    let mut last_maintenance: Option<Instant> = None;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let due = last_maintenance
            .map(|t| t.elapsed() >= MAINTENANCE_INTERVAL)
            .unwrap_or(true);
        if due {
            last_maintenance = Some(Instant::now());
            match queue::release_stale(&orchestrator.ctx.db).await {
                Ok(0) => {}
                Ok(released) => warn!(released, "released stale queue locks"),
                Err(e) => error!(error = %e, "stale-lock release failed"),
            }
            if let Err(e) =
                queue::prune_completed(&orchestrator.ctx.db, prune_completed_after_secs).await
            {
                error!(error = %e, "completed-entry pruning failed");
            }
        }

        match orchestrator.tick().await {
            Ok(true) => continue,
            Ok(false) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                error!(error = %e, "queue tick failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
    info!("pipeline worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy {
            backoff_base_secs: 2,
            pause_retry_delay_secs: 5,
        };
        for attempts in 0..4 {
            let expected = 2u64 << attempts;
            for _ in 0..50 {
                let backoff = policy.backoff_secs(attempts);
                let low = (expected as f64 * 0.8).floor() as i64;
                let high = (expected as f64 * 1.2).ceil() as i64;
                assert!(
                    (low..=high).contains(&backoff),
                    "attempt {attempts}: {backoff} outside [{low}, {high}]"
                );
            }
        }
    }

    #[test]
    fn backoff_never_goes_below_one_second() {
        let policy = RetryPolicy {
            backoff_base_secs: 1,
            pause_retry_delay_secs: 5,
        };
        for _ in 0..50 {
            assert!(policy.backoff_secs(0) >= 1);
        }
    }
}
