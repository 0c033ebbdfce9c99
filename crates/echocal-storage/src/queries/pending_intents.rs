// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending intent CRUD operations.

use echocal_core::EchocalError;
use echocal_core::types::{
    ClarificationEntry, IntentSnapshot, JobId, PendingIntentId, PendingIntentStatus,
};
use rusqlite::params;

use crate::database::Database;
use crate::models::PendingIntent;

const INTENT_COLUMNS: &str = "id, job_id, user_id, channel_number_id, sender_address,
     intent_snapshot, clarification_plan, status, expires_at, created_at, updated_at";

fn parse_err(e: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(e.to_string())),
    )
}

fn row_to_intent(row: &rusqlite::Row<'_>) -> Result<PendingIntent, rusqlite::Error> {
    let snapshot: String = row.get(5)?;
    let plan: String = row.get(6)?;
    let status: String = row.get(7)?;
    Ok(PendingIntent {
        id: PendingIntentId(row.get(0)?),
        job_id: JobId(row.get(1)?),
        user_id: row.get(2)?,
        channel_number_id: row.get(3)?,
        sender_address: row.get(4)?,
        intent_snapshot: serde_json::from_str::<IntentSnapshot>(&snapshot).map_err(parse_err)?,
        clarification_plan: serde_json::from_str::<Vec<ClarificationEntry>>(&plan)
            .map_err(parse_err)?,
        status: status.parse::<PendingIntentStatus>().map_err(parse_err)?,
        expires_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Insert a pending intent.
///
/// Returns `false` when the job already has one (unique on job_id); the
/// existing record is left untouched.
pub async fn create(db: &Database, intent: &PendingIntent) -> Result<bool, EchocalError> {
    let snapshot = serde_json::to_string(&intent.intent_snapshot)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    let plan = serde_json::to_string(&intent.clarification_plan)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    let intent = intent.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO pending_intents
                 (id, job_id, user_id, channel_number_id, sender_address,
                  intent_snapshot, clarification_plan, status, expires_at,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    intent.id.0,
                    intent.job_id.0,
                    intent.user_id,
                    intent.channel_number_id,
                    intent.sender_address,
                    snapshot,
                    plan,
                    intent.status.to_string(),
                    intent.expires_at,
                    intent.created_at,
                    intent.updated_at,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a pending intent by id.
pub async fn get(
    db: &Database,
    id: &PendingIntentId,
) -> Result<Option<PendingIntent>, EchocalError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INTENT_COLUMNS} FROM pending_intents WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_intent) {
                Ok(intent) => Ok(Some(intent)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get the pending intent for a job, regardless of status.
pub async fn get_by_job(
    db: &Database,
    job_id: &JobId,
) -> Result<Option<PendingIntent>, EchocalError> {
    let job_id = job_id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INTENT_COLUMNS} FROM pending_intents WHERE job_id = ?1"
            ))?;
            match stmt.query_row(params![job_id], row_to_intent) {
                Ok(intent) => Ok(Some(intent)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Persist the plan and snapshot after an answer is merged, in one update.
pub async fn update_plan_and_snapshot(
    db: &Database,
    id: &PendingIntentId,
    plan: &[ClarificationEntry],
    snapshot: &IntentSnapshot,
) -> Result<(), EchocalError> {
    let id = id.0.clone();
    let plan = serde_json::to_string(plan)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    let snapshot = serde_json::to_string(snapshot)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE pending_intents SET clarification_plan = ?1, intent_snapshot = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![plan, snapshot, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Reopen a resolved or expired intent for another clarification round.
///
/// The clarification loop is unbounded: re-validating a merged snapshot may
/// surface new gaps, and the job's single pending-intent row is reused with
/// a fresh plan and expiry.
pub async fn reopen(
    db: &Database,
    id: &PendingIntentId,
    snapshot: &IntentSnapshot,
    plan: &[ClarificationEntry],
    expires_at: &str,
) -> Result<(), EchocalError> {
    let id = id.0.clone();
    let snapshot = serde_json::to_string(snapshot)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    let plan = serde_json::to_string(plan)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    let expires_at = expires_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE pending_intents SET intent_snapshot = ?1, clarification_plan = ?2,
                 status = 'awaiting_clarification', expires_at = ?3,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?4",
                params![snapshot, plan, expires_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the pending intent's status.
pub async fn set_status(
    db: &Database,
    id: &PendingIntentId,
    status: PendingIntentStatus,
) -> Result<(), EchocalError> {
    let id = id.0.clone();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE pending_intents SET status = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![status, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find the live pending intent for a sender, used to match inbound answers.
///
/// Expired records are excluded even before the sweep has marked them, so a
/// late answer never matches.
pub async fn find_awaiting_for_sender(
    db: &Database,
    sender_address: &str,
    channel_number_id: &str,
) -> Result<Option<PendingIntent>, EchocalError> {
    let sender = sender_address.to_string();
    let number = channel_number_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INTENT_COLUMNS} FROM pending_intents
                 WHERE sender_address = ?1 AND channel_number_id = ?2
                   AND status = 'awaiting_clarification'
                   AND expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 ORDER BY created_at DESC
                 LIMIT 1"
            ))?;
            match stmt.query_row(params![sender, number], row_to_intent) {
                Ok(intent) => Ok(Some(intent)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark overdue awaiting intents expired. Returns the number flipped.
pub async fn expire_overdue(db: &Database) -> Result<usize, EchocalError> {
    db.connection()
        .call(|conn| {
            let expired = conn.execute(
                "UPDATE pending_intents SET status = 'expired',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'awaiting_clarification'
                   AND expires_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )?;
            Ok(expired)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
