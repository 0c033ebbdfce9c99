// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interactive prompt operations.
//!
//! A prompt's selected value is set at most once; once `response_received`
//! is set the record is immutable.

use echocal_core::EchocalError;
use echocal_core::types::{AnswerOption, PendingIntentId};
use rusqlite::params;

use crate::database::Database;
use crate::models::InteractivePrompt;

const PROMPT_COLUMNS: &str = "id, pending_intent_id, outbound_message_id, field_key, options,
     selected_value, response_received, expires_at, created_at";

fn parse_err(e: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(e.to_string())),
    )
}

fn row_to_prompt(row: &rusqlite::Row<'_>) -> Result<InteractivePrompt, rusqlite::Error> {
    let options: String = row.get(4)?;
    let received: i64 = row.get(6)?;
    Ok(InteractivePrompt {
        id: row.get(0)?,
        pending_intent_id: PendingIntentId(row.get(1)?),
        outbound_message_id: row.get(2)?,
        field_key: row.get(3)?,
        options: serde_json::from_str::<Vec<AnswerOption>>(&options).map_err(parse_err)?,
        selected_value: row.get(5)?,
        response_received: received != 0,
        expires_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Insert a new prompt record.
pub async fn create(db: &Database, prompt: &InteractivePrompt) -> Result<(), EchocalError> {
    let options = serde_json::to_string(&prompt.options)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    let prompt = prompt.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO interactive_prompts
                 (id, pending_intent_id, outbound_message_id, field_key, options,
                  expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    prompt.id,
                    prompt.pending_intent_id.0,
                    prompt.outbound_message_id,
                    prompt.field_key,
                    options,
                    prompt.expires_at,
                    prompt.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the channel message id once the prompt has been sent.
pub async fn set_outbound_message_id(
    db: &Database,
    id: &str,
    message_id: &str,
) -> Result<(), EchocalError> {
    let id = id.to_string();
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE interactive_prompts SET outbound_message_id = ?1 WHERE id = ?2",
                params![message_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The live (unanswered, unexpired) prompt for a pending intent, if any.
pub async fn find_live_by_intent(
    db: &Database,
    pending_intent_id: &PendingIntentId,
) -> Result<Option<InteractivePrompt>, EchocalError> {
    let intent_id = pending_intent_id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROMPT_COLUMNS} FROM interactive_prompts
                 WHERE pending_intent_id = ?1
                   AND response_received = 0
                   AND expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 ORDER BY created_at DESC
                 LIMIT 1"
            ))?;
            match stmt.query_row(params![intent_id], row_to_prompt) {
                Ok(prompt) => Ok(Some(prompt)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a selection, at most once and only while the prompt is live.
///
/// Returns `false` when the prompt was already answered or has expired; the
/// record is untouched in that case.
pub async fn record_selection(
    db: &Database,
    id: &str,
    selected_value: &str,
) -> Result<bool, EchocalError> {
    let id = id.to_string();
    let value = selected_value.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE interactive_prompts
                 SET selected_value = ?1, response_received = 1
                 WHERE id = ?2
                   AND response_received = 0
                   AND expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![value, id],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a prompt by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<InteractivePrompt>, EchocalError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROMPT_COLUMNS} FROM interactive_prompts WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_prompt) {
                Ok(prompt) => Ok(Some(prompt)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PendingIntent, VoiceJob, now_rfc3339, rfc3339_after};
    use crate::queries::{jobs, pending_intents};
    use echocal_core::types::{IntentAction, IntentSnapshot, PendingIntentStatus};
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir, PendingIntentId) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let job = VoiceJob::new("u", "n", "m", "media", "+1", "audio/ogg");
        jobs::create_job(&db, &job).await.unwrap();

        let now = now_rfc3339();
        let intent = PendingIntent {
            id: PendingIntentId(uuid::Uuid::new_v4().to_string()),
            job_id: job.id,
            user_id: "u".into(),
            channel_number_id: "n".into(),
            sender_address: "+1".into(),
            intent_snapshot: IntentSnapshot::new(IntentAction::Create),
            clarification_plan: Vec::new(),
            status: PendingIntentStatus::AwaitingClarification,
            expires_at: rfc3339_after(chrono::Duration::hours(1)),
            created_at: now.clone(),
            updated_at: now,
        };
        pending_intents::create(&db, &intent).await.unwrap();
        (db, dir, intent.id)
    }

    fn make_prompt(intent_id: &PendingIntentId, expires_at: String) -> InteractivePrompt {
        InteractivePrompt {
            id: uuid::Uuid::new_v4().to_string(),
            pending_intent_id: intent_id.clone(),
            outbound_message_id: None,
            field_key: "attendee:sarah".into(),
            options: vec![
                AnswerOption {
                    id: "opt-1".into(),
                    label: "Sarah Chen (sarah.chen@example.com)".into(),
                    value: "sarah.chen@example.com".into(),
                },
                AnswerOption {
                    id: "opt-2".into(),
                    label: "Sarah Park (sarah.park@example.com)".into(),
                    value: "sarah.park@example.com".into(),
                },
            ],
            selected_value: None,
            response_received: false,
            expires_at,
            created_at: now_rfc3339(),
        }
    }

    #[tokio::test]
    async fn selection_is_recorded_at_most_once() {
        let (db, _dir, intent_id) = setup().await;
        let prompt = make_prompt(&intent_id, rfc3339_after(chrono::Duration::hours(1)));
        create(&db, &prompt).await.unwrap();

        assert!(record_selection(&db, &prompt.id, "sarah.chen@example.com").await.unwrap());
        // Second answer is rejected; the record is immutable.
        assert!(!record_selection(&db, &prompt.id, "sarah.park@example.com").await.unwrap());

        let got = get(&db, &prompt.id).await.unwrap().unwrap();
        assert_eq!(got.selected_value.as_deref(), Some("sarah.chen@example.com"));
        assert!(got.response_received);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_prompt_rejects_selection() {
        let (db, _dir, intent_id) = setup().await;
        let prompt = make_prompt(&intent_id, rfc3339_after(chrono::Duration::minutes(-1)));
        create(&db, &prompt).await.unwrap();

        assert!(!record_selection(&db, &prompt.id, "sarah.chen@example.com").await.unwrap());
        let got = get(&db, &prompt.id).await.unwrap().unwrap();
        assert!(got.selected_value.is_none());
        assert!(!got.response_received);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_live_skips_answered_and_expired() {
        let (db, _dir, intent_id) = setup().await;

        let expired = make_prompt(&intent_id, rfc3339_after(chrono::Duration::minutes(-1)));
        create(&db, &expired).await.unwrap();
        assert!(find_live_by_intent(&db, &intent_id).await.unwrap().is_none());

        let live = make_prompt(&intent_id, rfc3339_after(chrono::Duration::hours(1)));
        create(&db, &live).await.unwrap();
        let found = find_live_by_intent(&db, &intent_id).await.unwrap().unwrap();
        assert_eq!(found.id, live.id);
        assert_eq!(found.options.len(), 2);

        record_selection(&db, &live.id, "sarah.chen@example.com").await.unwrap();
        assert!(find_live_by_intent(&db, &intent_id).await.unwrap().is_none());

        db.close().await.unwrap();
    }
}
