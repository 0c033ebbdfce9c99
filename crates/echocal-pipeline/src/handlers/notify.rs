// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! send-notification: deliver the outcome message and finish the job.
//!
//! The terminal stage for both success and failure paths. A failure outcome
//! leaves the job failed; everything else completes it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use echocal_core::EchocalError;
use echocal_core::payload::{NotifyOutcome, NotifyPayload};
use echocal_core::types::{JobState, Stage};
use echocal_storage::queries::jobs;

use crate::handlers::{
    PipelineContext, StageHandler, StageOutcome, check_pause, is_duplicate, load_job,
    parse_payload,
};
use crate::timing::with_timing;

pub struct NotifyHandler {
    ctx: Arc<PipelineContext>,
}

impl NotifyHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageHandler for NotifyHandler {
    fn stage(&self) -> Stage {
        Stage::SendNotification
    }

    async fn run(&self, payload: &str) -> Result<StageOutcome, EchocalError> {
        let payload: NotifyPayload = parse_payload(payload)?;
        let job = load_job(&self.ctx.db, &payload.job_id).await?;

        // Failed is allowed: the failure-notification path runs after the
        // job was already marked failed by the orchestrator.
        let allowed = [
            JobState::Processing,
            JobState::Failed,
            JobState::PausedForTest(Stage::SendNotification),
        ];
        if is_duplicate(&job, Stage::SendNotification, &allowed) {
            return Ok(StageOutcome::Done);
        }
        if check_pause(&self.ctx.db, &job, Stage::SendNotification).await? {
            return Ok(StageOutcome::Paused);
        }

        let text = render_outcome(&payload.outcome);
        with_timing(
            &self.ctx.db,
            &job.id,
            Stage::SendNotification,
            |r: &Result<(), EchocalError>| match r {
                Ok(()) => Some(serde_json::json!({"chars": text.len()})),
                Err(e) => Some(serde_json::json!({"error": e.to_string()})),
            },
            async {
                self.ctx
                    .channel
                    .send_text(&job.sender_address, &text)
                    .await?;
                Ok(())
            },
        )
        .await?;

        let terminal = match payload.outcome {
            NotifyOutcome::Failure { .. } => JobState::Failed,
            _ => JobState::Completed,
        };
        jobs::update_state(&self.ctx.db, &job.id, terminal).await?;

        info!(job_id = %job.id, state = %terminal, "notification sent, job finished");
        Ok(StageOutcome::Done)
    }
}

/// Render the user-facing message for an outcome.
pub fn render_outcome(outcome: &NotifyOutcome) -> String {
    match outcome {
        NotifyOutcome::EventCreated { title, start, link } => {
            let mut text = format!("Created \"{title}\" for {start}.");
            if let Some(link) = link {
                text.push('\n');
                text.push_str(link);
            }
            text
        }
        NotifyOutcome::EventUpdated { title } => format!("Updated \"{title}\"."),
        NotifyOutcome::EventDeleted { title } => format!("Deleted \"{title}\"."),
        NotifyOutcome::QueryResults { date, events } => {
            let scope = match date {
                Some(date) => format!(" on {date}"),
                None => String::new(),
            };
            if events.is_empty() {
                return format!("I didn't find any events{scope}.");
            }
            let mut text = format!("Here's what I found{scope}:");
            for event in events {
                text.push_str(&format!("\n- {} at {}", event.title, event.start));
            }
            text
        }
        NotifyOutcome::Failure { user_message } => user_message.clone(),
    }
}
