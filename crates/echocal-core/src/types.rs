// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Echocal pipeline crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a voice job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Mint a fresh v4 UUID job id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a pending intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingIntentId(pub String);

impl std::fmt::Display for PendingIntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a message sent or received over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Opaque correlation token for a multi-field flow session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowToken(pub String);

// --- Pipeline stages ---

/// One discrete unit of pipeline work.
///
/// The serialized form ("download-audio", ...) doubles as the queue name
/// and the stage column in timing records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    DownloadAudio,
    TranscribeAudio,
    AnalyzeIntent,
    ProcessIntent,
    CreateEvent,
    SendNotification,
}

impl Stage {
    /// Canonical ordering position, independent of wall-clock execution order.
    ///
    /// Timing records carry this so a timeline can be reconstructed even when
    /// retries execute stages out of order.
    pub fn sequence(self) -> i64 {
        match self {
            Stage::DownloadAudio => 1,
            Stage::TranscribeAudio => 2,
            Stage::AnalyzeIntent => 3,
            Stage::ProcessIntent => 4,
            Stage::CreateEvent => 5,
            Stage::SendNotification => 6,
        }
    }

    /// Logical grouping used in timing records.
    pub fn group(self) -> &'static str {
        match self {
            Stage::DownloadAudio | Stage::TranscribeAudio => "ingest",
            Stage::AnalyzeIntent | Stage::ProcessIntent => "intent",
            Stage::CreateEvent | Stage::SendNotification => "action",
        }
    }

    /// The next forward stage, or `None` for the terminal stage.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::DownloadAudio => Some(Stage::TranscribeAudio),
            Stage::TranscribeAudio => Some(Stage::AnalyzeIntent),
            Stage::AnalyzeIntent => Some(Stage::ProcessIntent),
            Stage::ProcessIntent => Some(Stage::CreateEvent),
            Stage::CreateEvent => Some(Stage::SendNotification),
            Stage::SendNotification => None,
        }
    }

    /// All stages in canonical order.
    pub fn all() -> [Stage; 6] {
        [
            Stage::DownloadAudio,
            Stage::TranscribeAudio,
            Stage::AnalyzeIntent,
            Stage::ProcessIntent,
            Stage::CreateEvent,
            Stage::SendNotification,
        ]
    }
}

// --- Job state ---

/// Lifecycle state of a voice job.
///
/// Transitions are monotonic along the stage sequence except for the two
/// side-states (`PausedForTest`, `AwaitingClarification`), which always
/// resume into the next forward stage. Illegal combinations (a paused job
/// without a stage, a clarifying job marked completed) are unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Job row created, download not yet started.
    Received,
    Downloading,
    Transcribing,
    Analyzing,
    Processing,
    /// Test-induced pause before the given stage executes.
    PausedForTest(Stage),
    /// Pipeline stalled on a pending intent; resumes via `process-intent`.
    AwaitingClarification,
    Completed,
    Failed,
}

const PAUSED_PREFIX: &str = "paused_before_";

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Received => write!(f, "received"),
            JobState::Downloading => write!(f, "downloading"),
            JobState::Transcribing => write!(f, "transcribing"),
            JobState::Analyzing => write!(f, "analyzing"),
            JobState::Processing => write!(f, "processing"),
            JobState::PausedForTest(stage) => write!(f, "{PAUSED_PREFIX}{stage}"),
            JobState::AwaitingClarification => write!(f, "awaiting_clarification"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(stage) = s.strip_prefix(PAUSED_PREFIX) {
            let stage = stage
                .parse::<Stage>()
                .map_err(|_| format!("unknown paused stage: {stage}"))?;
            return Ok(JobState::PausedForTest(stage));
        }
        match s {
            "received" => Ok(JobState::Received),
            "downloading" => Ok(JobState::Downloading),
            "transcribing" => Ok(JobState::Transcribing),
            "analyzing" => Ok(JobState::Analyzing),
            "processing" => Ok(JobState::Processing),
            "awaiting_clarification" => Ok(JobState::AwaitingClarification),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

impl JobState {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// The active state a handler sets while executing the given stage.
    pub fn active_for(stage: Stage) -> JobState {
        match stage {
            Stage::DownloadAudio => JobState::Downloading,
            Stage::TranscribeAudio => JobState::Transcribing,
            Stage::AnalyzeIntent => JobState::Analyzing,
            Stage::ProcessIntent => JobState::Processing,
            // The final two stages run under the processing umbrella until
            // the notify handler marks the job terminal.
            Stage::CreateEvent | Stage::SendNotification => JobState::Processing,
        }
    }
}

// --- Intent model ---

/// The calendar action the user asked for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentAction {
    Create,
    Update,
    Delete,
    Query,
}

/// A person referenced in an utterance, before and after directory resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    /// The raw value as extracted ("Sarah", "bob@example.com").
    pub raw: String,
    /// The resolved address, once the contact resolver has run.
    #[serde(default)]
    pub resolved_email: Option<String>,
}

impl Attendee {
    pub fn raw(value: impl Into<String>) -> Self {
        Self {
            raw: value.into(),
            resolved_email: None,
        }
    }
}

/// Structured representation of what the user wants, extracted from free text.
///
/// All fields except `action` are optional: extraction is unreliable and
/// frequently under-specified, and the resolution pipeline decides what is
/// missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSnapshot {
    pub action: IntentAction,
    #[serde(default)]
    pub title: Option<String>,
    /// ISO date, e.g. "2025-03-01".
    #[serde(default)]
    pub start_date: Option<String>,
    /// 24h wall time, e.g. "14:30".
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    /// Extractor self-reported confidence in [0, 1].
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl IntentSnapshot {
    /// An empty snapshot for the given action.
    pub fn new(action: IntentAction) -> Self {
        Self {
            action,
            title: None,
            start_date: None,
            start_time: None,
            end_time: None,
            is_all_day: false,
            duration_minutes: None,
            location: None,
            description: None,
            attendees: Vec::new(),
            confidence: None,
        }
    }
}

// --- Clarification model ---

/// Why a clarification entry exists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClarificationReason {
    MissingField,
    AmbiguousContact,
    ContactNotFound,
}

/// One selectable answer in a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    /// Stable id echoed back by the channel when the user selects this option.
    pub id: String,
    /// Human-readable label shown to the user.
    pub label: String,
    /// The value merged into the intent snapshot when selected.
    pub value: String,
}

/// One outstanding question needed to complete an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationEntry {
    /// Which snapshot field this question fills ("title", "start_time",
    /// "attendee:<raw>").
    pub field_key: String,
    pub reason: ClarificationReason,
    pub question: String,
    /// Empty for free-text questions.
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    /// Set once an answer has been recorded for this entry.
    #[serde(default)]
    pub answer: Option<String>,
}

impl ClarificationEntry {
    pub fn is_resolved(&self) -> bool {
        self.answer.is_some()
    }
}

/// Lifecycle status of a pending intent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PendingIntentStatus {
    AwaitingClarification,
    Resolved,
    Expired,
}

/// A field requested in a multi-field flow session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub field_key: String,
    pub label: String,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
}

// --- Channel messages ---

/// Content of an inbound channel message, after transport parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    /// A voice note; bytes are fetched later by the download stage.
    Audio { media_id: String, mime_type: String },
    /// A button or list selection, carrying the selected option id.
    Selection { selection_id: String },
    /// A completed multi-field flow, correlated by token.
    FlowReply {
        flow_token: String,
        response: serde_json::Value,
    },
}

/// An inbound message received from the channel transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    /// The business number the message arrived on.
    pub channel_number_id: String,
    pub sender_address: String,
    /// Present only when the transport verified the sender maps to a user.
    pub user_id: Option<String>,
    pub content: MessageContent,
    pub timestamp: String,
}

// --- Collaborator payload types ---

/// Result of a speech-to-text call.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
}

/// Audit tag for an extraction payload record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    Prompt,
    Response,
    Context,
}

/// One prompt/response/context payload exchanged with the extraction model.
#[derive(Debug, Clone)]
pub struct ExtractionPayload {
    pub payload_type: PayloadType,
    pub provider: String,
    pub content: String,
}

/// Result of an intent extraction call: the snapshot plus the full audit trail.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub snapshot: IntentSnapshot,
    pub audit: Vec<ExtractionPayload>,
}

// --- Calendar types ---

/// A directory contact from the calendar provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

/// A fully specified event ready for the calendar provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub start_date: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    pub is_all_day: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attendee_emails: Vec<String>,
}

/// Identifier and link for a created or updated calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub event_id: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Search criteria for locating existing events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// A matched event from a calendar search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: String,
    pub title: String,
    pub start: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn stage_round_trips_through_strings() {
        for stage in Stage::all() {
            let s = stage.to_string();
            assert_eq!(Stage::from_str(&s).unwrap(), stage);
        }
        assert_eq!(Stage::DownloadAudio.to_string(), "download-audio");
        assert_eq!(Stage::SendNotification.to_string(), "send-notification");
    }

    #[test]
    fn stage_sequence_is_canonical_order() {
        let mut prev = 0;
        for stage in Stage::all() {
            assert!(stage.sequence() > prev);
            prev = stage.sequence();
        }
    }

    #[test]
    fn stage_next_walks_the_pipeline() {
        assert_eq!(Stage::DownloadAudio.next(), Some(Stage::TranscribeAudio));
        assert_eq!(Stage::CreateEvent.next(), Some(Stage::SendNotification));
        assert_eq!(Stage::SendNotification.next(), None);
    }

    #[test]
    fn job_state_round_trips_including_paused() {
        let states = [
            JobState::Received,
            JobState::Downloading,
            JobState::Transcribing,
            JobState::Analyzing,
            JobState::Processing,
            JobState::PausedForTest(Stage::AnalyzeIntent),
            JobState::AwaitingClarification,
            JobState::Completed,
            JobState::Failed,
        ];
        for state in states {
            let s = state.to_string();
            assert_eq!(JobState::from_str(&s).unwrap(), state);
        }
        assert_eq!(
            JobState::PausedForTest(Stage::AnalyzeIntent).to_string(),
            "paused_before_analyze-intent"
        );
    }

    #[test]
    fn job_state_rejects_unknown_strings() {
        assert!(JobState::from_str("bogus").is_err());
        assert!(JobState::from_str("paused_before_bogus").is_err());
    }

    #[test]
    fn intent_action_serializes_uppercase() {
        let json = serde_json::to_string(&IntentAction::Create).unwrap();
        assert_eq!(json, r#""CREATE""#);
        let parsed: IntentAction = serde_json::from_str(r#""DELETE""#).unwrap();
        assert_eq!(parsed, IntentAction::Delete);
    }

    #[test]
    fn intent_snapshot_tolerates_sparse_json() {
        let snapshot: IntentSnapshot =
            serde_json::from_str(r#"{"action":"CREATE","title":"Standup"}"#).unwrap();
        assert_eq!(snapshot.action, IntentAction::Create);
        assert_eq!(snapshot.title.as_deref(), Some("Standup"));
        assert!(snapshot.start_date.is_none());
        assert!(!snapshot.is_all_day);
        assert!(snapshot.attendees.is_empty());
    }

    #[test]
    fn clarification_entry_resolved_tracks_answer() {
        let mut entry = ClarificationEntry {
            field_key: "title".into(),
            reason: ClarificationReason::MissingField,
            question: "What should the event be called?".into(),
            options: Vec::new(),
            answer: None,
        };
        assert!(!entry.is_resolved());
        entry.answer = Some("Standup".into());
        assert!(entry.is_resolved());
    }
}
