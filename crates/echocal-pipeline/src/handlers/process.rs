// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! process-intent: run the resolution pipeline and decide what happens next.
//!
//! Three exits: open (or reopen) a clarification round when gaps remain,
//! enqueue a calendar command when the snapshot is actionable, or enqueue a
//! failure notification when an update/delete reference matches nothing.
//!
//! On re-entry after clarification the resolved pending intent's snapshot
//! (which carries the merged answers) takes precedence over the job row, and
//! the full resolution pass runs again; answers can surface new gaps, which
//! start another round on the same pending-intent row.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use echocal_core::EchocalError;
use echocal_core::payload::{CalendarCommand, CreateEventPayload, NotifyOutcome, NotifyPayload, ProcessPayload};
use echocal_core::types::{
    ClarificationEntry, EventDraft, EventQuery, IntentAction, IntentSnapshot, JobState, Stage,
};
use echocal_resolve::ResolutionContext;
use echocal_storage::queries::{jobs, pending_intents};

use crate::handlers::{
    PipelineContext, StageHandler, StageOutcome, check_pause, enqueue_next, is_duplicate,
    load_job, parse_payload,
};
use crate::timing::with_timing;

pub struct ProcessHandler {
    ctx: Arc<PipelineContext>,
}

enum Decision {
    Clarify {
        snapshot: IntentSnapshot,
        questions: Vec<ClarificationEntry>,
    },
    Execute {
        command: CalendarCommand,
    },
    NoMatch {
        user_message: String,
    },
}

impl ProcessHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Turn a complete snapshot into the concrete calendar command.
    ///
    /// Update and delete locate their target here; when several events match
    /// the reference, the first (earliest) match is taken.
    async fn build_command(
        &self,
        user_id: &str,
        snapshot: &IntentSnapshot,
    ) -> Result<Decision, EchocalError> {
        match snapshot.action {
            IntentAction::Create => Ok(Decision::Execute {
                command: CalendarCommand::Create {
                    draft: draft_from_snapshot(snapshot)?,
                },
            }),
            IntentAction::Update | IntentAction::Delete => {
                let query = EventQuery {
                    text: snapshot.title.clone(),
                    date: snapshot.start_date.clone(),
                };
                let matches = self.ctx.calendar.search_events(user_id, &query).await?;
                let Some(target) = matches.first() else {
                    let reference = snapshot
                        .title
                        .clone()
                        .or_else(|| snapshot.start_date.clone())
                        .unwrap_or_else(|| "that event".to_string());
                    return Ok(Decision::NoMatch {
                        user_message: format!(
                            "I couldn't find an event matching \"{reference}\" on your calendar."
                        ),
                    });
                };
                let command = if snapshot.action == IntentAction::Update {
                    // Fields the user didn't mention keep the target's values.
                    let mut patched = snapshot.clone();
                    if patched.title.is_none() {
                        patched.title = Some(target.title.clone());
                    }
                    if patched.start_date.is_none() {
                        patched.start_date = Some(date_of(&target.start));
                    }
                    CalendarCommand::Update {
                        event_id: target.event_id.clone(),
                        draft: draft_from_snapshot(&patched)?,
                    }
                } else {
                    CalendarCommand::Delete {
                        event_id: target.event_id.clone(),
                        title: target.title.clone(),
                    }
                };
                Ok(Decision::Execute { command })
            }
            IntentAction::Query => Ok(Decision::Execute {
                command: CalendarCommand::Query {
                    query: EventQuery {
                        text: snapshot.title.clone(),
                        // An undated query means "today".
                        date: snapshot.start_date.clone().or_else(|| {
                            Some(chrono::Utc::now().format("%Y-%m-%d").to_string())
                        }),
                    },
                },
            }),
        }
    }
}

#[async_trait]
impl StageHandler for ProcessHandler {
    fn stage(&self) -> Stage {
        Stage::ProcessIntent
    }

    async fn run(&self, payload: &str) -> Result<StageOutcome, EchocalError> {
        let payload: ProcessPayload = parse_payload(payload)?;
        let job = load_job(&self.ctx.db, &payload.job_id).await?;

        let allowed = [
            JobState::Analyzing,
            JobState::Processing,
            JobState::AwaitingClarification,
            JobState::PausedForTest(Stage::ProcessIntent),
        ];
        if is_duplicate(&job, Stage::ProcessIntent, &allowed) {
            return Ok(StageOutcome::Done);
        }
        if check_pause(&self.ctx.db, &job, Stage::ProcessIntent).await? {
            return Ok(StageOutcome::Paused);
        }

        jobs::update_state(&self.ctx.db, &job.id, JobState::Processing).await?;

        // After a clarification round the pending intent carries the merged
        // answers; a first pass reads the snapshot the analyze stage stored.
        let pending = pending_intents::get_by_job(&self.ctx.db, &job.id).await?;
        let snapshot = match pending {
            Some(intent) if intent.status == echocal_core::PendingIntentStatus::Resolved => {
                intent.intent_snapshot
            }
            _ => job.intent_snapshot.clone().ok_or_else(|| {
                EchocalError::Internal(format!("no intent snapshot for job {}", job.id))
            })?,
        };

        let decision = with_timing(
            &self.ctx.db,
            &job.id,
            Stage::ProcessIntent,
            |r: &Result<Decision, EchocalError>| match r {
                Ok(Decision::Clarify { questions, .. }) => Some(serde_json::json!({
                    "outcome": "clarify",
                    "outstanding": questions.len(),
                })),
                Ok(Decision::Execute { .. }) => Some(serde_json::json!({"outcome": "execute"})),
                Ok(Decision::NoMatch { .. }) => Some(serde_json::json!({"outcome": "no_match"})),
                Err(e) => Some(serde_json::json!({"error": e.to_string()})),
            },
            async {
                let ctx = ResolutionContext {
                    user_id: job.user_id.clone(),
                };
                let result = self.ctx.resolution.resolve(&snapshot, &ctx).await;

                let intent_job_id = job
                    .intent_job_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                jobs::store_intent(&self.ctx.db, &job.id, &result.snapshot, &intent_job_id)
                    .await?;

                if !result.clarifications.is_empty() {
                    return Ok(Decision::Clarify {
                        snapshot: result.snapshot,
                        questions: result.clarifications,
                    });
                }
                self.build_command(&job.user_id, &result.snapshot).await
            },
        )
        .await?;

        match decision {
            Decision::Clarify { snapshot, questions } => {
                let n = questions.len();
                self.ctx
                    .clarify
                    .open_clarification(&job, &snapshot, questions)
                    .await?;
                info!(job_id = %job.id, outstanding = n, "intent incomplete, clarification opened");
            }
            Decision::Execute { command } => {
                enqueue_next(
                    &self.ctx,
                    &CreateEventPayload {
                        job_id: job.id.clone(),
                        command,
                    },
                )
                .await?;
                info!(job_id = %job.id, "intent actionable, calendar command enqueued");
            }
            Decision::NoMatch { user_message } => {
                enqueue_next(
                    &self.ctx,
                    &NotifyPayload {
                        job_id: job.id.clone(),
                        outcome: NotifyOutcome::Failure { user_message },
                    },
                )
                .await?;
                info!(job_id = %job.id, "no event matched the reference, failure notification enqueued");
            }
        }

        Ok(StageOutcome::Done)
    }
}

/// Build the provider-ready draft from a complete snapshot.
fn draft_from_snapshot(snapshot: &IntentSnapshot) -> Result<EventDraft, EchocalError> {
    let title = snapshot
        .title
        .clone()
        .ok_or_else(|| EchocalError::Internal("complete snapshot missing title".into()))?;
    let start_date = snapshot
        .start_date
        .clone()
        .ok_or_else(|| EchocalError::Internal("complete snapshot missing start date".into()))?;

    let end_time = snapshot.end_time.clone().or_else(|| {
        // Derive an end from the stated duration when no end was given.
        let (start, minutes) = (snapshot.start_time.as_deref()?, snapshot.duration_minutes?);
        let start = chrono::NaiveTime::parse_from_str(start, "%H:%M").ok()?;
        let end = start + chrono::Duration::minutes(minutes);
        Some(end.format("%H:%M").to_string())
    });

    Ok(EventDraft {
        title,
        start_date,
        start_time: snapshot.start_time.clone(),
        end_time,
        is_all_day: snapshot.is_all_day,
        location: snapshot.location.clone(),
        description: snapshot.description.clone(),
        attendee_emails: snapshot
            .attendees
            .iter()
            .filter_map(|a| a.resolved_email.clone())
            .collect(),
    })
}

/// The date part of an event start ("2026-03-01 09:30" or "2026-03-01").
fn date_of(start: &str) -> String {
    start.chars().take(10).collect()
}
