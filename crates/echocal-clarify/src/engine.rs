// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The clarification engine.
//!
//! Owns the pending-intent lifecycle: opening a clarification round when the
//! resolution pipeline finds gaps, dispatching questions over the channel,
//! matching inbound answers back to the record that asked, and resuming the
//! pipeline once the plan is fully answered.
//!
//! Answer matching is deliberately conservative: expired records never match
//! and a second answer to the same question is dropped without touching
//! state.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use echocal_core::payload::{ProcessPayload, StagePayload};
use echocal_core::types::{
    Attendee, ClarificationEntry, FieldDescriptor, FlowToken, InboundMessage, IntentSnapshot,
    MessageContent,
};
use echocal_core::{ChannelAdapter, EchocalError, JobState, PendingIntentId, PendingIntentStatus};
use echocal_storage::models::{FlowSession, InteractivePrompt, PendingIntent, VoiceJob};
use echocal_storage::models::{now_rfc3339, rfc3339_after};
use echocal_storage::queries::{flows, jobs, pending_intents, prompts, queue};
use echocal_storage::Database;

use crate::render::{RenderedQuestion, match_text_to_option, render_question};

const FLOW_BODY: &str = "I need a few more details to set this up.";

/// What became of an inbound message offered to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ClarifyOutcome {
    /// Not an answer to any live clarification; the caller handles it as an
    /// ordinary message.
    NotMatched,
    /// Matched a clarification record but was late or duplicate; dropped
    /// without changing state.
    Ignored,
    /// Answer recorded; more questions remain and the next was dispatched.
    AwaitingMore { pending_intent_id: PendingIntentId },
    /// The last answer arrived; the intent is resolved and `process-intent`
    /// has been re-enqueued.
    Resolved {
        pending_intent_id: PendingIntentId,
        job_id: echocal_core::JobId,
    },
}

pub struct ClarifyEngine {
    db: Database,
    channel: Arc<dyn ChannelAdapter>,
    expiry: Duration,
    queue_max_attempts: i32,
}

impl ClarifyEngine {
    pub fn new(
        db: Database,
        channel: Arc<dyn ChannelAdapter>,
        expiry: Duration,
        queue_max_attempts: i32,
    ) -> Self {
        Self {
            db,
            channel,
            expiry,
            queue_max_attempts,
        }
    }

    /// Open a clarification round for a job whose intent is incomplete.
    ///
    /// Creates the pending intent (unique per job: a duplicate stage delivery
    /// returns the existing record without re-asking), moves the job to
    /// `AwaitingClarification`, and dispatches the first question.
    pub async fn open_clarification(
        &self,
        job: &VoiceJob,
        snapshot: &IntentSnapshot,
        plan: Vec<ClarificationEntry>,
    ) -> Result<PendingIntentId, EchocalError> {
        let now = now_rfc3339();
        let intent = PendingIntent {
            id: PendingIntentId(uuid::Uuid::new_v4().to_string()),
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            channel_number_id: job.channel_number_id.clone(),
            sender_address: job.sender_address.clone(),
            intent_snapshot: snapshot.clone(),
            clarification_plan: plan,
            status: PendingIntentStatus::AwaitingClarification,
            expires_at: rfc3339_after(self.expiry),
            created_at: now.clone(),
            updated_at: now,
        };

        if !pending_intents::create(&self.db, &intent).await? {
            let existing = pending_intents::get_by_job(&self.db, &job.id)
                .await?
                .ok_or_else(|| {
                    EchocalError::Internal(format!(
                        "pending intent insert ignored but none found for job {}",
                        job.id
                    ))
                })?;
            if existing.status == PendingIntentStatus::AwaitingClarification {
                debug!(job_id = %job.id, "clarification already open, duplicate delivery dropped");
                return Ok(existing.id);
            }
            // A later round: re-validation of the merged snapshot surfaced
            // new gaps. The job's single row is reopened with a fresh plan.
            let reopened = PendingIntent {
                id: existing.id,
                ..intent
            };
            pending_intents::reopen(
                &self.db,
                &reopened.id,
                &reopened.intent_snapshot,
                &reopened.clarification_plan,
                &reopened.expires_at,
            )
            .await?;
            jobs::update_state(&self.db, &job.id, JobState::AwaitingClarification).await?;
            info!(
                job_id = %job.id,
                pending_intent_id = %reopened.id,
                questions = reopened.clarification_plan.len(),
                "clarification reopened"
            );
            self.dispatch_next(&reopened).await?;
            return Ok(reopened.id);
        }

        jobs::update_state(&self.db, &job.id, JobState::AwaitingClarification).await?;
        info!(
            job_id = %job.id,
            pending_intent_id = %intent.id,
            questions = intent.clarification_plan.len(),
            "clarification opened"
        );

        self.dispatch_next(&intent).await?;
        Ok(intent.id)
    }

    /// Offer an inbound message to the engine as a potential answer.
    pub async fn handle_inbound(
        &self,
        msg: &InboundMessage,
    ) -> Result<ClarifyOutcome, EchocalError> {
        match &msg.content {
            MessageContent::Audio { .. } => Ok(ClarifyOutcome::NotMatched),
            MessageContent::FlowReply {
                flow_token,
                response,
            } => self.handle_flow_reply(flow_token, response).await,
            MessageContent::Selection { selection_id } => {
                self.handle_selection(msg, selection_id).await
            }
            MessageContent::Text(text) => self.handle_text(msg, text).await,
        }
    }

    /// Dispatch the next question(s) for an intent.
    ///
    /// One outstanding entry is sent per its option count; several outstanding
    /// entries are batched into a single multi-field flow.
    async fn dispatch_next(&self, intent: &PendingIntent) -> Result<(), EchocalError> {
        let outstanding: Vec<&ClarificationEntry> = intent
            .clarification_plan
            .iter()
            .filter(|e| !e.is_resolved())
            .collect();
        match outstanding.len() {
            0 => Ok(()),
            1 => self.dispatch_single(intent, outstanding[0]).await,
            _ => self.dispatch_flow(intent, &outstanding).await,
        }
    }

    async fn dispatch_single(
        &self,
        intent: &PendingIntent,
        entry: &ClarificationEntry,
    ) -> Result<(), EchocalError> {
        let to = intent.sender_address.as_str();
        match render_question(entry) {
            RenderedQuestion::Text { body } => {
                self.channel.send_text(to, &body).await?;
            }
            RenderedQuestion::Buttons { body, options } => {
                let prompt = self.new_prompt(intent, entry, options.clone());
                prompts::create(&self.db, &prompt).await?;
                let msg_id = self.channel.send_buttons(to, &body, &options).await?;
                prompts::set_outbound_message_id(&self.db, &prompt.id, &msg_id.0).await?;
            }
            RenderedQuestion::List { body, options } => {
                let prompt = self.new_prompt(intent, entry, options.clone());
                prompts::create(&self.db, &prompt).await?;
                let msg_id = self.channel.send_list(to, &body, &options).await?;
                prompts::set_outbound_message_id(&self.db, &prompt.id, &msg_id.0).await?;
            }
            RenderedQuestion::Enumeration { body, options } => {
                // The prompt record backs number/label matching of the reply.
                let prompt = self.new_prompt(intent, entry, options);
                prompts::create(&self.db, &prompt).await?;
                let msg_id = self.channel.send_text(to, &body).await?;
                prompts::set_outbound_message_id(&self.db, &prompt.id, &msg_id.0).await?;
            }
        }
        debug!(
            pending_intent_id = %intent.id,
            field_key = %entry.field_key,
            "question dispatched"
        );
        Ok(())
    }

    async fn dispatch_flow(
        &self,
        intent: &PendingIntent,
        outstanding: &[&ClarificationEntry],
    ) -> Result<(), EchocalError> {
        let fields: Vec<FieldDescriptor> = outstanding
            .iter()
            .map(|e| FieldDescriptor {
                field_key: e.field_key.clone(),
                label: e.question.clone(),
                options: e.options.clone(),
            })
            .collect();
        let flow = FlowSession {
            flow_token: FlowToken(uuid::Uuid::new_v4().to_string()),
            pending_intent_id: intent.id.clone(),
            fields_requested: fields.clone(),
            response_data: None,
            response_received: false,
            expires_at: intent.expires_at.clone(),
            created_at: now_rfc3339(),
        };
        flows::create(&self.db, &flow).await?;
        self.channel
            .send_flow(&intent.sender_address, &flow.flow_token.0, FLOW_BODY, &fields)
            .await?;
        debug!(
            pending_intent_id = %intent.id,
            fields = fields.len(),
            "flow dispatched"
        );
        Ok(())
    }

    fn new_prompt(
        &self,
        intent: &PendingIntent,
        entry: &ClarificationEntry,
        options: Vec<echocal_core::types::AnswerOption>,
    ) -> InteractivePrompt {
        InteractivePrompt {
            id: uuid::Uuid::new_v4().to_string(),
            pending_intent_id: intent.id.clone(),
            outbound_message_id: None,
            field_key: entry.field_key.clone(),
            options,
            selected_value: None,
            response_received: false,
            expires_at: intent.expires_at.clone(),
            created_at: now_rfc3339(),
        }
    }

    async fn handle_flow_reply(
        &self,
        token: &str,
        response: &serde_json::Value,
    ) -> Result<ClarifyOutcome, EchocalError> {
        let Some(flow) = flows::find_live_by_token(&self.db, token).await? else {
            // Known-but-dead sessions are late replies; unknown tokens are
            // not ours.
            return Ok(if flows::get(&self.db, token).await?.is_some() {
                ClarifyOutcome::Ignored
            } else {
                ClarifyOutcome::NotMatched
            });
        };
        if !flows::record_response(&self.db, token, response).await? {
            return Ok(ClarifyOutcome::Ignored);
        }
        let Some(mut intent) = pending_intents::get(&self.db, &flow.pending_intent_id).await?
        else {
            return Ok(ClarifyOutcome::Ignored);
        };
        if intent.status != PendingIntentStatus::AwaitingClarification {
            return Ok(ClarifyOutcome::Ignored);
        }

        let mut answered = 0;
        for field in &flow.fields_requested {
            if let Some(value) = response.get(&field.field_key).and_then(|v| v.as_str())
                && apply_answer(&mut intent, &field.field_key, value)
            {
                answered += 1;
            }
        }
        if answered == 0 {
            warn!(flow_token = token, "flow reply carried no usable answers");
            return Ok(ClarifyOutcome::Ignored);
        }
        self.finalize(intent).await
    }

    async fn handle_selection(
        &self,
        msg: &InboundMessage,
        selection_id: &str,
    ) -> Result<ClarifyOutcome, EchocalError> {
        let Some(mut intent) = pending_intents::find_awaiting_for_sender(
            &self.db,
            &msg.sender_address,
            &msg.channel_number_id,
        )
        .await?
        else {
            return Ok(ClarifyOutcome::NotMatched);
        };
        let Some(prompt) = prompts::find_live_by_intent(&self.db, &intent.id).await? else {
            return Ok(ClarifyOutcome::Ignored);
        };
        let Some(option) = prompt.options.iter().find(|o| o.id == selection_id) else {
            warn!(
                pending_intent_id = %intent.id,
                selection_id,
                "selection id not among prompt options"
            );
            return Ok(ClarifyOutcome::Ignored);
        };
        if !prompts::record_selection(&self.db, &prompt.id, &option.value).await? {
            return Ok(ClarifyOutcome::Ignored);
        }
        apply_answer(&mut intent, &prompt.field_key, &option.value);
        self.finalize(intent).await
    }

    async fn handle_text(
        &self,
        msg: &InboundMessage,
        text: &str,
    ) -> Result<ClarifyOutcome, EchocalError> {
        let Some(mut intent) = pending_intents::find_awaiting_for_sender(
            &self.db,
            &msg.sender_address,
            &msg.channel_number_id,
        )
        .await?
        else {
            return Ok(ClarifyOutcome::NotMatched);
        };

        if let Some(prompt) = prompts::find_live_by_intent(&self.db, &intent.id).await? {
            // A live option prompt: accept a number, a label, or a direct
            // value (the user may type an email instead of picking).
            let value = match_text_to_option(text, &prompt.options)
                .unwrap_or_else(|| text.trim().to_string());
            if !prompts::record_selection(&self.db, &prompt.id, &value).await? {
                return Ok(ClarifyOutcome::Ignored);
            }
            apply_answer(&mut intent, &prompt.field_key, &value);
            return self.finalize(intent).await;
        }

        // Free-text question: the reply answers the first outstanding entry.
        let Some(field_key) = intent.next_outstanding().map(|e| e.field_key.clone()) else {
            return Ok(ClarifyOutcome::Ignored);
        };
        apply_answer(&mut intent, &field_key, text.trim());
        self.finalize(intent).await
    }

    /// Persist the merged plan and snapshot, then either ask the next
    /// question or resolve and resume the pipeline.
    async fn finalize(&self, intent: PendingIntent) -> Result<ClarifyOutcome, EchocalError> {
        pending_intents::update_plan_and_snapshot(
            &self.db,
            &intent.id,
            &intent.clarification_plan,
            &intent.intent_snapshot,
        )
        .await?;

        if intent.next_outstanding().is_some() {
            self.dispatch_next(&intent).await?;
            return Ok(ClarifyOutcome::AwaitingMore {
                pending_intent_id: intent.id,
            });
        }

        pending_intents::set_status(&self.db, &intent.id, PendingIntentStatus::Resolved).await?;
        let payload = ProcessPayload {
            job_id: intent.job_id.clone(),
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| EchocalError::Internal(e.to_string()))?;
        // The partial unique index on dedup_key makes the resume idempotent
        // under duplicate final answers.
        queue::enqueue(
            &self.db,
            ProcessPayload::STAGE,
            &body,
            &payload.dedup_key(),
            self.queue_max_attempts,
            0,
        )
        .await?;
        info!(
            pending_intent_id = %intent.id,
            job_id = %intent.job_id,
            "clarification resolved, pipeline resumed"
        );
        Ok(ClarifyOutcome::Resolved {
            pending_intent_id: intent.id,
            job_id: intent.job_id,
        })
    }
}

/// Record an answer in the plan and merge it into the snapshot.
///
/// Returns `false` when the field key has no outstanding entry.
fn apply_answer(intent: &mut PendingIntent, field_key: &str, value: &str) -> bool {
    let Some(entry) = intent
        .clarification_plan
        .iter_mut()
        .find(|e| e.field_key == field_key && !e.is_resolved())
    else {
        return false;
    };
    entry.answer = Some(value.to_string());

    let snapshot = &mut intent.intent_snapshot;
    match field_key {
        "title" => snapshot.title = Some(value.to_string()),
        "start_date" => snapshot.start_date = Some(value.to_string()),
        "start_time" => snapshot.start_time = Some(value.to_string()),
        "end_time" => snapshot.end_time = Some(value.to_string()),
        "location" => snapshot.location = Some(value.to_string()),
        // The reference is used as search text when locating the event.
        "event_reference" => snapshot.title = Some(value.to_string()),
        key if key.starts_with("attendee:") => {
            let raw = &key["attendee:".len()..];
            if let Some(attendee) = snapshot.attendees.iter_mut().find(|a| a.raw == raw) {
                attendee.resolved_email = Some(value.to_string());
            } else {
                snapshot.attendees.push(Attendee {
                    raw: raw.to_string(),
                    resolved_email: Some(value.to_string()),
                });
            }
        }
        other => {
            warn!(field_key = other, "answer for unknown field key, stored in plan only");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use echocal_core::types::{
        AnswerOption, ClarificationReason, IntentAction, MessageContent,
    };
    use echocal_storage::queries::queue as queue_queries;
    use echocal_test_utils::{MockChannel, SentMessage};
    use tempfile::tempdir;

    struct Setup {
        db: Database,
        _dir: tempfile::TempDir,
        channel: Arc<MockChannel>,
        engine: ClarifyEngine,
        job: VoiceJob,
    }

    async fn setup() -> Setup {
        setup_with_expiry(Duration::hours(1)).await
    }

    async fn setup_with_expiry(expiry: Duration) -> Setup {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let channel = Arc::new(MockChannel::new());
        let engine = ClarifyEngine::new(db.clone(), channel.clone(), expiry, 3);

        let job = VoiceJob::new("user-1", "num-1", "wamid.1", "media-1", "+15550001111", "audio/ogg");
        jobs::create_job(&db, &job).await.unwrap();
        Setup {
            db,
            _dir: dir,
            channel,
            engine,
            job,
        }
    }

    fn inbound(content: MessageContent) -> InboundMessage {
        InboundMessage {
            id: uuid::Uuid::new_v4().to_string(),
            channel_number_id: "num-1".into(),
            sender_address: "+15550001111".into(),
            user_id: Some("user-1".into()),
            content,
            timestamp: now_rfc3339(),
        }
    }

    fn free_text_entry(field_key: &str, question: &str) -> ClarificationEntry {
        ClarificationEntry {
            field_key: field_key.into(),
            reason: ClarificationReason::MissingField,
            question: question.into(),
            options: Vec::new(),
            answer: None,
        }
    }

    fn ambiguous_entry(n_options: usize) -> ClarificationEntry {
        ClarificationEntry {
            field_key: "attendee:sam".into(),
            reason: ClarificationReason::AmbiguousContact,
            question: "Who did you mean?".into(),
            options: (0..n_options)
                .map(|i| AnswerOption {
                    id: format!("contact-{i}"),
                    label: format!("Sam {i} (sam{i}@example.com)"),
                    value: format!("sam{i}@example.com"),
                })
                .collect(),
            answer: None,
        }
    }

    fn snapshot_with_attendee() -> IntentSnapshot {
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.title = Some("Design review".into());
        snapshot.start_date = Some("2026-03-03".into());
        snapshot.start_time = Some("11:00".into());
        snapshot.attendees = vec![Attendee::raw("sam")];
        snapshot
    }

    #[tokio::test]
    async fn open_sends_buttons_and_is_idempotent() {
        let s = setup().await;
        let snapshot = snapshot_with_attendee();

        let id = s
            .engine
            .open_clarification(&s.job, &snapshot, vec![ambiguous_entry(2)])
            .await
            .unwrap();

        let sent = s.channel.sent_messages().await;
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            SentMessage::Buttons { to, buttons, .. } => {
                assert_eq!(to, "+15550001111");
                assert_eq!(buttons.len(), 2);
            }
            other => panic!("expected buttons, got {other:?}"),
        }

        let job = jobs::get_job(&s.db, &s.job.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::AwaitingClarification);

        // Duplicate stage delivery: same record, no second question.
        let again = s
            .engine
            .open_clarification(&s.job, &snapshot, vec![ambiguous_entry(2)])
            .await
            .unwrap();
        assert_eq!(again, id);
        assert_eq!(s.channel.sent_count().await, 1);

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn resolved_intent_is_reopened_for_a_second_round() {
        let s = setup().await;
        let snapshot = IntentSnapshot::new(IntentAction::Create);
        let plan = vec![free_text_entry("title", "What should the event be called?")];
        let first = s
            .engine
            .open_clarification(&s.job, &snapshot, plan)
            .await
            .unwrap();
        s.engine
            .handle_inbound(&inbound(MessageContent::Text("Standup".into())))
            .await
            .unwrap();

        // Re-validation found another gap: the same row carries a new round.
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.title = Some("Standup".into());
        let plan = vec![free_text_entry("start_time", "What time does it start?")];
        let second = s
            .engine
            .open_clarification(&s.job, &snapshot, plan)
            .await
            .unwrap();
        assert_eq!(second, first);

        let intent = pending_intents::get_by_job(&s.db, &s.job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.status, PendingIntentStatus::AwaitingClarification);
        assert_eq!(intent.clarification_plan.len(), 1);
        assert_eq!(intent.clarification_plan[0].field_key, "start_time");

        let sent = s.channel.sent_messages().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].body(), "What time does it start?");

        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::Text("09:30".into())))
            .await
            .unwrap();
        assert!(matches!(outcome, ClarifyOutcome::Resolved { .. }));

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn multiple_questions_are_batched_into_a_flow() {
        let s = setup().await;
        let snapshot = IntentSnapshot::new(IntentAction::Create);
        let plan = vec![
            free_text_entry("title", "What should the event be called?"),
            free_text_entry("start_time", "What time does it start?"),
        ];

        s.engine
            .open_clarification(&s.job, &snapshot, plan)
            .await
            .unwrap();

        let sent = s.channel.sent_messages().await;
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            SentMessage::Flow { fields, .. } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].field_key, "title");
                assert_eq!(fields[1].field_key, "start_time");
            }
            other => panic!("expected flow, got {other:?}"),
        }

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn text_answer_resolves_and_resumes_exactly_once() {
        let s = setup().await;
        let snapshot = IntentSnapshot::new(IntentAction::Create);
        let plan = vec![free_text_entry("title", "What should the event be called?")];
        s.engine
            .open_clarification(&s.job, &snapshot, plan)
            .await
            .unwrap();

        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::Text("Standup".into())))
            .await
            .unwrap();
        match outcome {
            ClarifyOutcome::Resolved { job_id, .. } => assert_eq!(job_id, s.job.id),
            other => panic!("expected resolved, got {other:?}"),
        }

        let intent = pending_intents::get_by_job(&s.db, &s.job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.status, PendingIntentStatus::Resolved);
        assert_eq!(intent.intent_snapshot.title.as_deref(), Some("Standup"));

        // Exactly one process-intent entry in the queue.
        let entry = queue_queries::dequeue(&s.db).await.unwrap().unwrap();
        assert_eq!(entry.stage, echocal_core::Stage::ProcessIntent);
        assert!(queue_queries::dequeue(&s.db).await.unwrap().is_none());

        // A further reply no longer matches anything.
        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::Text("again".into())))
            .await
            .unwrap();
        assert_eq!(outcome, ClarifyOutcome::NotMatched);

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn selection_merges_resolved_email_into_snapshot() {
        let s = setup().await;
        let snapshot = snapshot_with_attendee();
        s.engine
            .open_clarification(&s.job, &snapshot, vec![ambiguous_entry(2)])
            .await
            .unwrap();

        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::Selection {
                selection_id: "contact-1".into(),
            }))
            .await
            .unwrap();
        assert!(matches!(outcome, ClarifyOutcome::Resolved { .. }));

        let intent = pending_intents::get_by_job(&s.db, &s.job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            intent.intent_snapshot.attendees[0].resolved_email.as_deref(),
            Some("sam1@example.com")
        );

        // The same selection again is dropped unchanged.
        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::Selection {
                selection_id: "contact-0".into(),
            }))
            .await
            .unwrap();
        assert_eq!(outcome, ClarifyOutcome::NotMatched);
        let intent = pending_intents::get_by_job(&s.db, &s.job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            intent.intent_snapshot.attendees[0].resolved_email.as_deref(),
            Some("sam1@example.com")
        );

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn enumeration_reply_by_number_selects_the_option() {
        let s = setup().await;
        let snapshot = snapshot_with_attendee();
        s.engine
            .open_clarification(&s.job, &snapshot, vec![ambiguous_entry(12)])
            .await
            .unwrap();

        // Twelve options degrade to a numbered text message.
        let sent = s.channel.sent_messages().await;
        match &sent[0] {
            SentMessage::Text { body, .. } => {
                assert!(body.contains("\n12. Sam 11"));
            }
            other => panic!("expected text enumeration, got {other:?}"),
        }

        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::Text("3".into())))
            .await
            .unwrap();
        assert!(matches!(outcome, ClarifyOutcome::Resolved { .. }));

        let intent = pending_intents::get_by_job(&s.db, &s.job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            intent.intent_snapshot.attendees[0].resolved_email.as_deref(),
            Some("sam2@example.com")
        );

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn flow_reply_merges_all_fields_at_once() {
        let s = setup().await;
        let snapshot = IntentSnapshot::new(IntentAction::Create);
        let plan = vec![
            free_text_entry("title", "What should the event be called?"),
            free_text_entry("start_date", "What date is the event on?"),
            free_text_entry("start_time", "What time does it start?"),
        ];
        s.engine
            .open_clarification(&s.job, &snapshot, plan)
            .await
            .unwrap();

        let sent = s.channel.sent_messages().await;
        let token = match &sent[0] {
            SentMessage::Flow { flow_token, .. } => flow_token.clone(),
            other => panic!("expected flow, got {other:?}"),
        };

        let response = serde_json::json!({
            "title": "Standup",
            "start_date": "2026-03-01",
            "start_time": "09:30",
        });
        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::FlowReply {
                flow_token: token.clone(),
                response: response.clone(),
            }))
            .await
            .unwrap();
        assert!(matches!(outcome, ClarifyOutcome::Resolved { .. }));

        let intent = pending_intents::get_by_job(&s.db, &s.job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.intent_snapshot.title.as_deref(), Some("Standup"));
        assert_eq!(intent.intent_snapshot.start_time.as_deref(), Some("09:30"));

        // A duplicate flow reply is dropped.
        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::FlowReply {
                flow_token: token,
                response,
            }))
            .await
            .unwrap();
        assert_eq!(outcome, ClarifyOutcome::Ignored);

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn partial_flow_reply_asks_for_the_rest() {
        let s = setup().await;
        let snapshot = IntentSnapshot::new(IntentAction::Create);
        let plan = vec![
            free_text_entry("title", "What should the event be called?"),
            free_text_entry("start_time", "What time does it start?"),
        ];
        s.engine
            .open_clarification(&s.job, &snapshot, plan)
            .await
            .unwrap();

        let token = match &s.channel.sent_messages().await[0] {
            SentMessage::Flow { flow_token, .. } => flow_token.clone(),
            other => panic!("expected flow, got {other:?}"),
        };

        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::FlowReply {
                flow_token: token,
                response: serde_json::json!({"title": "Standup"}),
            }))
            .await
            .unwrap();
        assert!(matches!(outcome, ClarifyOutcome::AwaitingMore { .. }));

        // The remaining question went out as plain text (single free-text).
        let sent = s.channel.sent_messages().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].body(), "What time does it start?");

        // Answering it resolves the intent.
        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::Text("09:30".into())))
            .await
            .unwrap();
        assert!(matches!(outcome, ClarifyOutcome::Resolved { .. }));

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_clarification_never_matches() {
        let s = setup_with_expiry(Duration::minutes(-5)).await;
        let snapshot = IntentSnapshot::new(IntentAction::Create);
        let plan = vec![free_text_entry("title", "What should the event be called?")];
        s.engine
            .open_clarification(&s.job, &snapshot, plan)
            .await
            .unwrap();

        let outcome = s
            .engine
            .handle_inbound(&inbound(MessageContent::Text("Standup".into())))
            .await
            .unwrap();
        assert_eq!(outcome, ClarifyOutcome::NotMatched);

        // Nothing changed and nothing was resumed.
        let intent = pending_intents::get_by_job(&s.db, &s.job.id)
            .await
            .unwrap()
            .unwrap();
        assert!(intent.intent_snapshot.title.is_none());
        assert!(queue_queries::dequeue(&s.db).await.unwrap().is_none());

        s.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unrelated_sender_is_not_matched() {
        let s = setup().await;
        let snapshot = IntentSnapshot::new(IntentAction::Create);
        s.engine
            .open_clarification(
                &s.job,
                &snapshot,
                vec![free_text_entry("title", "What should the event be called?")],
            )
            .await
            .unwrap();

        let mut msg = inbound(MessageContent::Text("hello".into()));
        msg.sender_address = "+15559999999".into();
        let outcome = s.engine.handle_inbound(&msg).await.unwrap();
        assert_eq!(outcome, ClarifyOutcome::NotMatched);

        s.db.close().await.unwrap();
    }
}
