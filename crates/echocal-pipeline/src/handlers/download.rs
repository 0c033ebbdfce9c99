// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! download-audio: fetch the voice note bytes and spool them to disk.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use echocal_core::EchocalError;
use echocal_core::payload::{DownloadPayload, TranscribePayload};
use echocal_core::types::{JobState, Stage};
use echocal_storage::queries::jobs;

use crate::handlers::{
    PipelineContext, StageHandler, StageOutcome, check_pause, enqueue_next, is_duplicate,
    load_job, parse_payload,
};
use crate::timing::with_timing;

pub struct DownloadHandler {
    ctx: Arc<PipelineContext>,
}

impl DownloadHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageHandler for DownloadHandler {
    fn stage(&self) -> Stage {
        Stage::DownloadAudio
    }

    async fn run(&self, payload: &str) -> Result<StageOutcome, EchocalError> {
        let payload: DownloadPayload = parse_payload(payload)?;
        let job = load_job(&self.ctx.db, &payload.job_id).await?;

        let allowed = [
            JobState::Received,
            JobState::Downloading,
            JobState::PausedForTest(Stage::DownloadAudio),
        ];
        if is_duplicate(&job, Stage::DownloadAudio, &allowed) {
            return Ok(StageOutcome::Done);
        }
        if check_pause(&self.ctx.db, &job, Stage::DownloadAudio).await? {
            return Ok(StageOutcome::Paused);
        }

        jobs::update_state(&self.ctx.db, &job.id, JobState::Downloading).await?;

        let spool_path = self.ctx.spool_dir.join(format!("{}.audio", job.id));
        let spool_display = spool_path.display().to_string();
        let byte_count = with_timing(
            &self.ctx.db,
            &job.id,
            Stage::DownloadAudio,
            |r: &Result<usize, EchocalError>| match r {
                Ok(bytes) => Some(serde_json::json!({"bytes": bytes})),
                Err(e) => Some(serde_json::json!({"error": e.to_string()})),
            },
            async {
                let bytes = self.ctx.channel.fetch_media(&job.media_id).await?;
                tokio::fs::create_dir_all(&self.ctx.spool_dir)
                    .await
                    .map_err(|e| EchocalError::Internal(format!("spool dir: {e}")))?;
                tokio::fs::write(&spool_path, &bytes)
                    .await
                    .map_err(|e| EchocalError::Internal(format!("spool write: {e}")))?;
                Ok(bytes.len())
            },
        )
        .await?;

        enqueue_next(
            &self.ctx,
            &TranscribePayload {
                job_id: job.id.clone(),
                audio_path: spool_display,
                mime_type: job.mime_type.clone(),
            },
        )
        .await?;

        info!(job_id = %job.id, bytes = byte_count, "audio downloaded and spooled");
        Ok(StageOutcome::Done)
    }
}
