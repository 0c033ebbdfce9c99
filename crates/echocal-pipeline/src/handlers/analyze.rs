// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! analyze-intent: extract a structured snapshot from the transcript.
//!
//! Every prompt/response/context payload exchanged with the extraction model
//! is appended to the audit table. Audit writes are best-effort: a failed
//! append is logged and the stage continues.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use echocal_core::payload::{AnalyzePayload, ProcessPayload};
use echocal_core::types::{Extraction, JobState, Stage};
use echocal_core::{EchocalError, ExtractionContext};
use echocal_storage::queries::{jobs, payloads};

use crate::handlers::{
    PipelineContext, StageHandler, StageOutcome, check_pause, enqueue_next, is_duplicate,
    load_job, parse_payload,
};
use crate::timing::with_timing;

pub struct AnalyzeHandler {
    ctx: Arc<PipelineContext>,
}

impl AnalyzeHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageHandler for AnalyzeHandler {
    fn stage(&self) -> Stage {
        Stage::AnalyzeIntent
    }

    async fn run(&self, payload: &str) -> Result<StageOutcome, EchocalError> {
        let payload: AnalyzePayload = parse_payload(payload)?;
        let job = load_job(&self.ctx.db, &payload.job_id).await?;

        let allowed = [
            JobState::Transcribing,
            JobState::Analyzing,
            JobState::PausedForTest(Stage::AnalyzeIntent),
        ];
        if is_duplicate(&job, Stage::AnalyzeIntent, &allowed) {
            return Ok(StageOutcome::Done);
        }
        if check_pause(&self.ctx.db, &job, Stage::AnalyzeIntent).await? {
            return Ok(StageOutcome::Paused);
        }

        jobs::update_state(&self.ctx.db, &job.id, JobState::Analyzing).await?;

        let text = job
            .transcribed_text
            .clone()
            .ok_or_else(|| EchocalError::Internal(format!("no transcript for job {}", job.id)))?;

        let extraction = with_timing(
            &self.ctx.db,
            &job.id,
            Stage::AnalyzeIntent,
            |r: &Result<Extraction, EchocalError>| match r {
                Ok(e) => Some(serde_json::json!({
                    "action": e.snapshot.action.to_string(),
                    "confidence": e.snapshot.confidence,
                })),
                Err(e) => Some(serde_json::json!({"error": e.to_string()})),
            },
            async {
                let context = ExtractionContext {
                    user_id: job.user_id.clone(),
                    today: chrono::Utc::now().format("%Y-%m-%d").to_string(),
                };
                let extraction = self.ctx.extractor.extract(&text, &context).await?;

                // The correlation id minted here survives clarification rounds
                // (the column is write-once).
                let intent_job_id = job
                    .intent_job_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                jobs::store_intent(&self.ctx.db, &job.id, &extraction.snapshot, &intent_job_id)
                    .await?;
                Ok(extraction)
            },
        )
        .await?;

        for record in &extraction.audit {
            if let Err(e) = payloads::append(
                &self.ctx.db,
                &job.id,
                record.payload_type,
                &record.provider,
                &record.content,
            )
            .await
            {
                warn!(job_id = %job.id, error = %e, "payload audit append failed");
            }
        }

        enqueue_next(
            &self.ctx,
            &ProcessPayload {
                job_id: job.id.clone(),
            },
        )
        .await?;

        info!(
            job_id = %job.id,
            action = %extraction.snapshot.action,
            "intent extracted"
        );
        Ok(StageOutcome::Done)
    }
}
