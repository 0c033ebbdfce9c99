// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! create-event: execute the calendar command decided by process-intent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use echocal_core::EchocalError;
use echocal_core::payload::{CalendarCommand, CreateEventPayload, NotifyOutcome, NotifyPayload};
use echocal_core::types::{JobState, Stage};

use crate::handlers::{
    PipelineContext, StageHandler, StageOutcome, check_pause, enqueue_next, is_duplicate,
    load_job, parse_payload,
};
use crate::timing::with_timing;

pub struct CreateEventHandler {
    ctx: Arc<PipelineContext>,
}

impl CreateEventHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageHandler for CreateEventHandler {
    fn stage(&self) -> Stage {
        Stage::CreateEvent
    }

    async fn run(&self, payload: &str) -> Result<StageOutcome, EchocalError> {
        let payload: CreateEventPayload = parse_payload(payload)?;
        let job = load_job(&self.ctx.db, &payload.job_id).await?;

        let allowed = [
            JobState::Processing,
            JobState::PausedForTest(Stage::CreateEvent),
        ];
        if is_duplicate(&job, Stage::CreateEvent, &allowed) {
            return Ok(StageOutcome::Done);
        }
        if check_pause(&self.ctx.db, &job, Stage::CreateEvent).await? {
            return Ok(StageOutcome::Paused);
        }

        let kind = command_kind(&payload.command);
        let outcome = with_timing(
            &self.ctx.db,
            &job.id,
            Stage::CreateEvent,
            |r: &Result<NotifyOutcome, EchocalError>| match r {
                Ok(_) => Some(serde_json::json!({"command": kind})),
                Err(e) => Some(serde_json::json!({"command": kind, "error": e.to_string()})),
            },
            async {
                match &payload.command {
                    CalendarCommand::Create { draft } => {
                        let created =
                            self.ctx.calendar.create_event(&job.user_id, draft).await?;
                        Ok(NotifyOutcome::EventCreated {
                            title: draft.title.clone(),
                            start: start_of(draft),
                            link: created.link,
                        })
                    }
                    CalendarCommand::Update { event_id, draft } => {
                        self.ctx
                            .calendar
                            .update_event(&job.user_id, event_id, draft)
                            .await?;
                        Ok(NotifyOutcome::EventUpdated {
                            title: draft.title.clone(),
                        })
                    }
                    CalendarCommand::Delete { event_id, title } => {
                        self.ctx.calendar.delete_event(&job.user_id, event_id).await?;
                        Ok(NotifyOutcome::EventDeleted {
                            title: title.clone(),
                        })
                    }
                    CalendarCommand::Query { query } => {
                        let events =
                            self.ctx.calendar.search_events(&job.user_id, query).await?;
                        Ok(NotifyOutcome::QueryResults {
                            date: query.date.clone(),
                            events,
                        })
                    }
                }
            },
        )
        .await?;

        enqueue_next(
            &self.ctx,
            &NotifyPayload {
                job_id: job.id.clone(),
                outcome,
            },
        )
        .await?;

        info!(job_id = %job.id, command = kind, "calendar command executed");
        Ok(StageOutcome::Done)
    }
}

fn command_kind(command: &CalendarCommand) -> &'static str {
    match command {
        CalendarCommand::Create { .. } => "create",
        CalendarCommand::Update { .. } => "update",
        CalendarCommand::Delete { .. } => "delete",
        CalendarCommand::Query { .. } => "query",
    }
}

fn start_of(draft: &echocal_core::types::EventDraft) -> String {
    match &draft.start_time {
        Some(time) => format!("{} {}", draft.start_date, time),
        None => draft.start_date.clone(),
    }
}
