// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for storage entities.
//!
//! JSON columns are surfaced as typed values; the query modules serialize at
//! the SQL boundary. Timestamps are RFC3339 strings in the same millisecond
//! format SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` produces, so
//! Rust-generated and SQL-generated timestamps compare lexicographically.

use echocal_core::types::{
    AnswerOption, ClarificationEntry, FieldDescriptor, FlowToken, IntentSnapshot, JobId, JobState,
    PayloadType, PendingIntentId, PendingIntentStatus, Stage,
};
use strum::{Display, EnumString};

/// Current UTC time as an RFC3339 millisecond string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// UTC time `delta` from now as an RFC3339 millisecond string.
pub fn rfc3339_after(delta: chrono::Duration) -> String {
    (chrono::Utc::now() + delta)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// One inbound voice note and its pipeline lifecycle. Never hard-deleted.
#[derive(Debug, Clone)]
pub struct VoiceJob {
    pub id: JobId,
    pub user_id: String,
    pub channel_number_id: String,
    pub inbound_message_id: String,
    pub media_id: String,
    pub sender_address: String,
    pub mime_type: String,
    pub state: JobState,
    pub transcribed_text: Option<String>,
    pub intent_snapshot: Option<IntentSnapshot>,
    /// Correlates payload audit records across clarification rounds.
    pub intent_job_id: Option<String>,
    /// Test-only: pause the pipeline before this stage executes.
    pub test_pause_before: Option<Stage>,
    pub error_message: Option<String>,
    pub error_stage: Option<Stage>,
    pub retry_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl VoiceJob {
    /// A fresh job in the `Received` state for an inbound voice note.
    pub fn new(
        user_id: impl Into<String>,
        channel_number_id: impl Into<String>,
        inbound_message_id: impl Into<String>,
        media_id: impl Into<String>,
        sender_address: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            channel_number_id: channel_number_id.into(),
            inbound_message_id: inbound_message_id.into(),
            media_id: media_id.into(),
            sender_address: sender_address.into(),
            mime_type: mime_type.into(),
            state: JobState::Received,
            transcribed_text: None,
            intent_snapshot: None,
            intent_job_id: None,
            test_pause_before: None,
            error_message: None,
            error_stage: None,
            retry_count: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// The paused-pipeline record awaiting clarifying answers. At most one active
/// per job (unique on job_id).
#[derive(Debug, Clone)]
pub struct PendingIntent {
    pub id: PendingIntentId,
    pub job_id: JobId,
    pub user_id: String,
    pub channel_number_id: String,
    pub sender_address: String,
    pub intent_snapshot: IntentSnapshot,
    pub clarification_plan: Vec<ClarificationEntry>,
    pub status: PendingIntentStatus,
    pub expires_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl PendingIntent {
    /// The first outstanding (unanswered) plan entry, if any.
    pub fn next_outstanding(&self) -> Option<&ClarificationEntry> {
        self.clarification_plan.iter().find(|e| !e.is_resolved())
    }
}

/// A single-field multiple-choice question dispatched over the channel.
#[derive(Debug, Clone)]
pub struct InteractivePrompt {
    pub id: String,
    pub pending_intent_id: PendingIntentId,
    pub outbound_message_id: Option<String>,
    pub field_key: String,
    pub options: Vec<AnswerOption>,
    pub selected_value: Option<String>,
    pub response_received: bool,
    pub expires_at: String,
    pub created_at: String,
}

/// A multi-field structured-form exchange correlated by an opaque token.
#[derive(Debug, Clone)]
pub struct FlowSession {
    pub flow_token: FlowToken,
    pub pending_intent_id: PendingIntentId,
    pub fields_requested: Vec<FieldDescriptor>,
    pub response_data: Option<serde_json::Value>,
    pub response_received: bool,
    pub expires_at: String,
    pub created_at: String,
}

/// Append-only audit of one stage execution.
#[derive(Debug, Clone)]
pub struct TimingRecord {
    pub id: i64,
    pub job_id: JobId,
    pub stage: Stage,
    pub stage_group: Option<String>,
    /// Static per-stage lookup, not insertion order.
    pub sequence: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Append-only audit of one prompt/response/context payload exchanged with
/// the extraction model.
#[derive(Debug, Clone)]
pub struct PayloadRecord {
    pub id: i64,
    pub job_id: JobId,
    pub sequence: i64,
    pub payload_type: PayloadType,
    pub provider: String,
    pub content: String,
    pub created_at: String,
}

/// One durable stage execution request.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub stage: Stage,
    pub payload: String,
    pub dedup_key: String,
    pub status: QueueStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: String,
    pub locked_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Delivery status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}
