// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stage handlers.
//!
//! Each handler consumes one typed payload, performs one stage's work, and
//! enqueues the next transition. Delivery is at-least-once, so every handler
//! starts with an idempotence check on the job's lifecycle state: a duplicate
//! delivery of an already-advanced stage is acknowledged without side
//! effects.
//!
//! The test-pause check runs after the idempotence check. A paused handler
//! performs no work at all; the orchestrator reschedules the entry without
//! counting an attempt until the flag is cleared.

pub mod analyze;
pub mod create_event;
pub mod download;
pub mod notify;
pub mod process;
pub mod transcribe;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use echocal_clarify::ClarifyEngine;
use echocal_core::payload::StagePayload;
use echocal_core::types::{JobId, JobState, Stage};
use echocal_core::{
    CalendarProvider, ChannelAdapter, EchocalError, IntentExtractor, Transcriber,
};
use echocal_resolve::ResolutionPipeline;
use echocal_storage::Database;
use echocal_storage::models::VoiceJob;
use echocal_storage::queries::{jobs, queue};

pub use analyze::AnalyzeHandler;
pub use create_event::CreateEventHandler;
pub use download::DownloadHandler;
pub use notify::NotifyHandler;
pub use process::ProcessHandler;
pub use transcribe::TranscribeHandler;

/// Shared collaborators and settings for all stage handlers.
pub struct PipelineContext {
    pub db: Database,
    pub channel: Arc<dyn ChannelAdapter>,
    pub transcriber: Arc<dyn Transcriber>,
    pub extractor: Arc<dyn IntentExtractor>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub resolution: ResolutionPipeline,
    pub clarify: Arc<ClarifyEngine>,
    /// Attempt limit stamped on every enqueued transition.
    pub queue_max_attempts: i32,
    /// Directory for audio spooled between download and transcription.
    pub spool_dir: PathBuf,
}

/// How a stage execution ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Work complete (or recognized as a duplicate); acknowledge the entry.
    Done,
    /// Test pause hit before any work; reschedule without counting an attempt.
    Paused,
}

/// One pipeline stage's executor.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    async fn run(&self, payload: &str) -> Result<StageOutcome, EchocalError>;
}

/// Deserialize a stage payload, rejecting malformed JSON at the boundary.
pub(crate) fn parse_payload<P: StagePayload>(payload: &str) -> Result<P, EchocalError> {
    serde_json::from_str(payload).map_err(|e| {
        EchocalError::Internal(format!("malformed {} payload: {e}", P::STAGE))
    })
}

pub(crate) async fn load_job(db: &Database, job_id: &JobId) -> Result<VoiceJob, EchocalError> {
    jobs::get_job(db, job_id)
        .await?
        .ok_or_else(|| EchocalError::Internal(format!("no job {job_id}")))
}

/// The idempotence gate shared by all handlers.
///
/// `allowed` lists the states a fresh or redelivered execution of this stage
/// may observe (the preceding stage's state, this stage's own active state
/// after a crash mid-stage, and this stage's pause state). Anything else
/// means the job already advanced past this stage.
pub(crate) fn is_duplicate(job: &VoiceJob, stage: Stage, allowed: &[JobState]) -> bool {
    let duplicate = !allowed.contains(&job.state);
    if duplicate {
        debug!(
            job_id = %job.id,
            %stage,
            state = %job.state,
            "duplicate stage delivery, acknowledged without effect"
        );
    }
    duplicate
}

/// The test-pause gate.
///
/// When the job's pause flag names this stage, the job is parked in the
/// paused state and the handler returns before any work. The entry
/// redelivers on a fixed delay until a test clears the flag.
pub(crate) async fn check_pause(
    db: &Database,
    job: &VoiceJob,
    stage: Stage,
) -> Result<bool, EchocalError> {
    if job.test_pause_before != Some(stage) {
        return Ok(false);
    }
    if job.state != JobState::PausedForTest(stage) {
        jobs::update_state(db, &job.id, JobState::PausedForTest(stage)).await?;
        info!(job_id = %job.id, %stage, "pipeline paused before stage");
    }
    Ok(true)
}

/// Enqueue the next stage transition with the payload's own dedup key.
pub(crate) async fn enqueue_next<P: StagePayload>(
    ctx: &PipelineContext,
    payload: &P,
) -> Result<(), EchocalError> {
    let body = serde_json::to_string(payload)
        .map_err(|e| EchocalError::Internal(e.to_string()))?;
    queue::enqueue(
        &ctx.db,
        P::STAGE,
        &body,
        &payload.dedup_key(),
        ctx.queue_max_attempts,
        0,
    )
    .await?;
    Ok(())
}

/// The full handler set, one per stage.
pub fn all_handlers(ctx: Arc<PipelineContext>) -> Vec<Box<dyn StageHandler>> {
    vec![
        Box::new(DownloadHandler::new(ctx.clone())),
        Box::new(TranscribeHandler::new(ctx.clone())),
        Box::new(AnalyzeHandler::new(ctx.clone())),
        Box::new(ProcessHandler::new(ctx.clone())),
        Box::new(CreateEventHandler::new(ctx.clone())),
        Box::new(NotifyHandler::new(ctx)),
    ]
}
