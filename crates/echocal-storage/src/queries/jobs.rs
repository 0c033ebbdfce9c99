// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice job CRUD operations.
//!
//! Every mutation is a single atomic UPDATE keyed by job id, so concurrent
//! retries cannot produce lost updates.

use echocal_core::EchocalError;
use echocal_core::types::{IntentSnapshot, JobId, JobState, Stage};
use rusqlite::params;

use crate::database::Database;
use crate::models::VoiceJob;

const JOB_COLUMNS: &str = "id, user_id, channel_number_id, inbound_message_id, media_id,
     sender_address, mime_type, state, transcribed_text, intent_snapshot,
     intent_job_id, test_pause_before, error_message, error_stage, retry_count,
     created_at, updated_at";

fn parse_err(e: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(e.to_string())),
    )
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<VoiceJob, rusqlite::Error> {
    let state: String = row.get(7)?;
    let snapshot: Option<String> = row.get(9)?;
    let pause: Option<String> = row.get(11)?;
    let error_stage: Option<String> = row.get(13)?;
    Ok(VoiceJob {
        id: JobId(row.get(0)?),
        user_id: row.get(1)?,
        channel_number_id: row.get(2)?,
        inbound_message_id: row.get(3)?,
        media_id: row.get(4)?,
        sender_address: row.get(5)?,
        mime_type: row.get(6)?,
        state: state.parse::<JobState>().map_err(parse_err)?,
        transcribed_text: row.get(8)?,
        intent_snapshot: snapshot
            .map(|s| serde_json::from_str::<IntentSnapshot>(&s))
            .transpose()
            .map_err(parse_err)?,
        intent_job_id: row.get(10)?,
        test_pause_before: pause
            .map(|s| s.parse::<Stage>())
            .transpose()
            .map_err(parse_err)?,
        error_message: row.get(12)?,
        error_stage: error_stage
            .map(|s| s.parse::<Stage>())
            .transpose()
            .map_err(parse_err)?,
        retry_count: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Insert a new job.
///
/// Returns `false` when a job for the same media id already exists (duplicate
/// webhook delivery); the existing job is left untouched.
pub async fn create_job(db: &Database, job: &VoiceJob) -> Result<bool, EchocalError> {
    let job = job.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO voice_jobs
                 (id, user_id, channel_number_id, inbound_message_id, media_id,
                  sender_address, mime_type, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    job.id.0,
                    job.user_id,
                    job.channel_number_id,
                    job.inbound_message_id,
                    job.media_id,
                    job.sender_address,
                    job.mime_type,
                    job.state.to_string(),
                    job.created_at,
                    job.updated_at,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a job by id.
pub async fn get_job(db: &Database, id: &JobId) -> Result<Option<VoiceJob>, EchocalError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {JOB_COLUMNS} FROM voice_jobs WHERE id = ?1"))?;
            match stmt.query_row(params![id], row_to_job) {
                Ok(job) => Ok(Some(job)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get the job for a media id, if one exists.
pub async fn get_job_by_media(
    db: &Database,
    media_id: &str,
) -> Result<Option<VoiceJob>, EchocalError> {
    let media_id = media_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM voice_jobs WHERE media_id = ?1"
            ))?;
            match stmt.query_row(params![media_id], row_to_job) {
                Ok(job) => Ok(Some(job)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the job's lifecycle state.
pub async fn update_state(db: &Database, id: &JobId, state: JobState) -> Result<(), EchocalError> {
    let id = id.0.clone();
    let state = state.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE voice_jobs SET state = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![state, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Persist the transcription result.
pub async fn store_transcript(db: &Database, id: &JobId, text: &str) -> Result<(), EchocalError> {
    let id = id.0.clone();
    let text = text.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE voice_jobs SET transcribed_text = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![text, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Persist the extracted (or clarification-augmented) intent snapshot.
///
/// `intent_job_id` is only written when the job does not already have one,
/// so the audit correlation id minted on the first analysis survives
/// clarification rounds.
pub async fn store_intent(
    db: &Database,
    id: &JobId,
    snapshot: &IntentSnapshot,
    intent_job_id: &str,
) -> Result<(), EchocalError> {
    let id = id.0.clone();
    let snapshot = serde_json::to_string(snapshot)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    let intent_job_id = intent_job_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE voice_jobs SET intent_snapshot = ?1,
                 intent_job_id = COALESCE(intent_job_id, ?2),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![snapshot, intent_job_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a stage failure: error digest plus retry counter, in one update.
pub async fn record_stage_error(
    db: &Database,
    id: &JobId,
    stage: Stage,
    message: &str,
) -> Result<(), EchocalError> {
    let id = id.0.clone();
    let stage = stage.to_string();
    let message = message.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE voice_jobs SET error_message = ?1, error_stage = ?2,
                 retry_count = retry_count + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![message, stage, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set or clear the test-only pause flag.
pub async fn set_test_pause(
    db: &Database,
    id: &JobId,
    pause_before: Option<Stage>,
) -> Result<(), EchocalError> {
    let id = id.0.clone();
    let pause = pause_before.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE voice_jobs SET test_pause_before = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![pause, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
