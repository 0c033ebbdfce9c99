// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! transcribe-audio: run speech-to-text over the spooled bytes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use echocal_core::EchocalError;
use echocal_core::payload::{AnalyzePayload, TranscribePayload};
use echocal_core::types::{JobState, Stage};
use echocal_storage::queries::jobs;

use crate::handlers::{
    PipelineContext, StageHandler, StageOutcome, check_pause, enqueue_next, is_duplicate,
    load_job, parse_payload,
};
use crate::timing::with_timing;

pub struct TranscribeHandler {
    ctx: Arc<PipelineContext>,
}

impl TranscribeHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageHandler for TranscribeHandler {
    fn stage(&self) -> Stage {
        Stage::TranscribeAudio
    }

    async fn run(&self, payload: &str) -> Result<StageOutcome, EchocalError> {
        let payload: TranscribePayload = parse_payload(payload)?;
        let job = load_job(&self.ctx.db, &payload.job_id).await?;

        let allowed = [
            JobState::Downloading,
            JobState::Transcribing,
            JobState::PausedForTest(Stage::TranscribeAudio),
        ];
        if is_duplicate(&job, Stage::TranscribeAudio, &allowed) {
            return Ok(StageOutcome::Done);
        }
        if check_pause(&self.ctx.db, &job, Stage::TranscribeAudio).await? {
            return Ok(StageOutcome::Paused);
        }

        jobs::update_state(&self.ctx.db, &job.id, JobState::Transcribing).await?;

        let transcription = with_timing(
            &self.ctx.db,
            &job.id,
            Stage::TranscribeAudio,
            |r: &Result<echocal_core::types::Transcription, EchocalError>| match r {
                Ok(t) => Some(serde_json::json!({
                    "chars": t.text.len(),
                    "language": t.language,
                })),
                Err(e) => Some(serde_json::json!({"error": e.to_string()})),
            },
            async {
                let audio = tokio::fs::read(&payload.audio_path)
                    .await
                    .map_err(|e| EchocalError::Internal(format!("spool read: {e}")))?;
                let transcription = self
                    .ctx
                    .transcriber
                    .transcribe(&audio, &payload.mime_type)
                    .await?;
                jobs::store_transcript(&self.ctx.db, &job.id, &transcription.text).await?;
                Ok(transcription)
            },
        )
        .await?;

        // The spool file is consumed; a leak here is harmless.
        if let Err(e) = tokio::fs::remove_file(&payload.audio_path).await {
            warn!(job_id = %job.id, path = %payload.audio_path, error = %e, "spool cleanup failed");
        }

        enqueue_next(
            &self.ctx,
            &AnalyzePayload {
                job_id: job.id.clone(),
            },
        )
        .await?;

        info!(
            job_id = %job.id,
            chars = transcription.text.len(),
            "audio transcribed"
        );
        Ok(StageOutcome::Done)
    }
}
