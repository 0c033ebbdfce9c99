// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed payloads for the durable stage queue.
//!
//! Each stage transition carries exactly the data the receiving handler
//! needs, validated at the queue boundary when the JSON column is
//! deserialized. The dedup key is derived from the payload, so duplicate
//! deliveries of the same transition collapse while a live entry exists.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{EventDraft, EventQuery, EventSummary, JobId, Stage};

/// A queue payload bound to one pipeline stage.
pub trait StagePayload: Serialize + DeserializeOwned {
    const STAGE: Stage;

    fn job_id(&self) -> &JobId;

    /// Deterministic dedup key: `<stage>-<job_id>`.
    fn dedup_key(&self) -> String {
        format!("{}-{}", Self::STAGE, self.job_id())
    }
}

/// download-audio: fetch the voice note bytes from the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadPayload {
    pub job_id: JobId,
}

impl StagePayload for DownloadPayload {
    const STAGE: Stage = Stage::DownloadAudio;

    fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

/// transcribe-audio: run speech-to-text over the spooled bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribePayload {
    pub job_id: JobId,
    /// Spool file written by the download stage; deleted after transcription.
    pub audio_path: String,
    pub mime_type: String,
}

impl StagePayload for TranscribePayload {
    const STAGE: Stage = Stage::TranscribeAudio;

    fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

/// analyze-intent: extract a structured snapshot from the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzePayload {
    pub job_id: JobId,
}

impl StagePayload for AnalyzePayload {
    const STAGE: Stage = Stage::AnalyzeIntent;

    fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

/// process-intent: resolve fields and decide actionable vs. clarification.
///
/// Carries only the job id; the snapshot is read from the job row so the
/// clarification loop's re-enqueue picks up merged answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPayload {
    pub job_id: JobId,
}

impl StagePayload for ProcessPayload {
    const STAGE: Stage = Stage::ProcessIntent;

    fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

/// The concrete calendar operation decided by the process stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarCommand {
    Create {
        draft: EventDraft,
    },
    Update {
        event_id: String,
        draft: EventDraft,
    },
    Delete {
        event_id: String,
        title: String,
    },
    Query {
        query: EventQuery,
    },
}

/// create-event: execute the calendar command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventPayload {
    pub job_id: JobId,
    pub command: CalendarCommand,
}

impl StagePayload for CreateEventPayload {
    const STAGE: Stage = Stage::CreateEvent;

    fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

/// What the notification stage tells the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifyOutcome {
    EventCreated {
        title: String,
        start: String,
        #[serde(default)]
        link: Option<String>,
    },
    EventUpdated {
        title: String,
    },
    EventDeleted {
        title: String,
    },
    QueryResults {
        #[serde(default)]
        date: Option<String>,
        events: Vec<EventSummary>,
    },
    Failure {
        user_message: String,
    },
}

/// send-notification: deliver the outcome message and finish the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub job_id: JobId,
    pub outcome: NotifyOutcome,
}

impl StagePayload for NotifyPayload {
    const STAGE: Stage = Stage::SendNotification;

    fn job_id(&self) -> &JobId {
        &self.job_id
    }
}
