// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable stage queue with at-least-once delivery.
//!
//! Enqueueing is idempotent per dedup key while a live entry exists, so
//! duplicate webhook deliveries never create duplicate stage executions.
//! Delivery is at-least-once, never at-most-once: handlers must tolerate
//! re-delivery.

use echocal_core::EchocalError;
use echocal_core::types::Stage;
use rusqlite::params;

use crate::database::Database;
use crate::models::{QueueEntry, QueueStatus};

const QUEUE_COLUMNS: &str = "id, stage, payload, dedup_key, status, attempts, max_attempts,
     run_at, locked_until, created_at, updated_at";

fn parse_err(e: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(e.to_string())),
    )
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<QueueEntry, rusqlite::Error> {
    let stage: String = row.get(1)?;
    let status: String = row.get(4)?;
    Ok(QueueEntry {
        id: row.get(0)?,
        stage: stage.parse::<Stage>().map_err(parse_err)?,
        payload: row.get(2)?,
        dedup_key: row.get(3)?,
        status: status.parse::<QueueStatus>().map_err(parse_err)?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        run_at: row.get(7)?,
        locked_until: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Enqueue a stage execution, eligible after `delay_secs`.
///
/// Returns the new entry id, or `None` when a live entry with the same dedup
/// key already exists (the duplicate is dropped).
pub async fn enqueue(
    db: &Database,
    stage: Stage,
    payload: &str,
    dedup_key: &str,
    max_attempts: i32,
    delay_secs: i64,
) -> Result<Option<i64>, EchocalError> {
    let stage = stage.to_string();
    let payload = payload.to_string();
    let dedup_key = dedup_key.to_string();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO stage_queue
                 (stage, payload, dedup_key, max_attempts, run_at)
                 VALUES (?1, ?2, ?3, ?4,
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?5 || ' seconds'))",
                params![stage, payload, dedup_key, max_attempts, delay_secs],
            )?;
            if inserted > 0 {
                Ok(Some(conn.last_insert_rowid()))
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Dequeue the next due pending entry across all stages.
///
/// Atomically selects the oldest pending entry whose `run_at` has passed and
/// marks it processing with a 5-minute lock timeout. Returns `None` when
/// nothing is due.
pub async fn dequeue(db: &Database) -> Result<Option<QueueEntry>, EchocalError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {QUEUE_COLUMNS} FROM stage_queue
                     WHERE status = 'pending'
                       AND run_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     ORDER BY id ASC
                     LIMIT 1"
                ))?;
                stmt.query_row([], row_to_entry)
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE stage_queue SET status = 'processing',
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![entry.id],
                    )?;
                    tx.commit()?;
                    Ok(Some(QueueEntry {
                        status: QueueStatus::Processing,
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge successful processing of a queue entry.
pub async fn ack(db: &Database, id: i64) -> Result<(), EchocalError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE stage_queue SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a delivery attempt failed.
///
/// Increments attempts. Below the attempt limit the entry goes back to
/// pending with `run_at` pushed out by `retry_delay_secs` (the caller computes
/// the backoff); at the limit it is marked failed and retained for
/// inspection. Returns the entry's new status.
pub async fn fail(
    db: &Database,
    id: i64,
    retry_delay_secs: i64,
) -> Result<QueueStatus, EchocalError> {
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts): (i32, i32) = conn.query_row(
                "SELECT attempts, max_attempts FROM stage_queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            if new_attempts >= max_attempts {
                conn.execute(
                    "UPDATE stage_queue SET status = 'failed', attempts = ?1,
                     locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![new_attempts, id],
                )?;
                Ok(QueueStatus::Failed)
            } else {
                conn.execute(
                    "UPDATE stage_queue SET status = 'pending', attempts = ?1,
                     locked_until = NULL,
                     run_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2 || ' seconds'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_attempts, retry_delay_secs, id],
                )?;
                Ok(QueueStatus::Pending)
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark an entry failed immediately, skipping any remaining attempts.
///
/// Used for permanent error categories that will not self-resolve. The entry
/// is retained for inspection like any other failure.
pub async fn fail_permanent(db: &Database, id: i64) -> Result<(), EchocalError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE stage_queue SET status = 'failed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Reschedule a processing entry without counting an attempt.
///
/// Used by the pause-for-testing check: the handler returns without side
/// effects and the entry re-delivers after the fixed delay.
pub async fn reschedule(db: &Database, id: i64, delay_secs: i64) -> Result<(), EchocalError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE stage_queue SET status = 'pending', locked_until = NULL,
                 run_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1 || ' seconds'),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![delay_secs, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return processing entries whose lock has expired to pending.
///
/// Covers worker crashes between dequeue and ack. Returns the number of
/// entries released.
pub async fn release_stale(db: &Database) -> Result<usize, EchocalError> {
    db.connection()
        .call(|conn| {
            let released = conn.execute(
                "UPDATE stage_queue SET status = 'pending', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing'
                   AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )?;
            Ok(released)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete completed entries older than `older_than_secs`. Failed entries are
/// retained for inspection.
pub async fn prune_completed(db: &Database, older_than_secs: i64) -> Result<usize, EchocalError> {
    db.connection()
        .call(move |conn| {
            let pruned = conn.execute(
                "DELETE FROM stage_queue
                 WHERE status = 'completed'
                   AND updated_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-' || ?1 || ' seconds')",
                params![older_than_secs],
            )?;
            Ok(pruned)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
