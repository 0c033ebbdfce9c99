// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only stage timing audit.

use echocal_core::EchocalError;
use echocal_core::types::{JobId, Stage};
use rusqlite::params;

use crate::database::Database;
use crate::models::TimingRecord;

/// Append one timing record.
pub async fn record(
    db: &Database,
    job_id: &JobId,
    stage: Stage,
    started_at: &str,
    completed_at: &str,
    duration_ms: i64,
    metadata: Option<&serde_json::Value>,
) -> Result<(), EchocalError> {
    let job_id = job_id.0.clone();
    let stage_name = stage.to_string();
    let group = stage.group().to_string();
    let sequence = stage.sequence();
    let started_at = started_at.to_string();
    let completed_at = completed_at.to_string();
    let metadata = metadata.map(|m| m.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO voice_job_timings
                 (job_id, stage, stage_group, sequence, started_at, completed_at,
                  duration_ms, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    job_id,
                    stage_name,
                    group,
                    sequence,
                    started_at,
                    completed_at,
                    duration_ms,
                    metadata,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All timing records for a job, ordered by canonical stage sequence.
///
/// Sorting by `sequence` (a static per-stage lookup) reconstructs the
/// pipeline timeline even when retries executed stages out of order.
pub async fn list_for_job(db: &Database, job_id: &JobId) -> Result<Vec<TimingRecord>, EchocalError> {
    let job_id = job_id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, job_id, stage, stage_group, sequence, started_at,
                        completed_at, duration_ms, metadata
                 FROM voice_job_timings
                 WHERE job_id = ?1
                 ORDER BY sequence ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![job_id], |row| {
                let stage: String = row.get(2)?;
                let metadata: Option<String> = row.get(8)?;
                Ok(TimingRecord {
                    id: row.get(0)?,
                    job_id: JobId(row.get(1)?),
                    stage: stage.parse::<Stage>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            Box::new(std::io::Error::other(e.to_string())),
                        )
                    })?,
                    stage_group: row.get(3)?,
                    sequence: row.get(4)?,
                    started_at: row.get(5)?,
                    completed_at: row.get(6)?,
                    duration_ms: row.get(7)?,
                    metadata: metadata
                        .map(|m| serde_json::from_str(&m))
                        .transpose()
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                8,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                })
            })?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
