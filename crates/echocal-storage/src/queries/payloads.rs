// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit of payloads exchanged with the extraction model.
//!
//! Write-only from the analyze stage; never read by the pipeline itself.

use echocal_core::EchocalError;
use echocal_core::types::{JobId, PayloadType};
use rusqlite::params;

use crate::database::Database;
use crate::models::PayloadRecord;

/// Append one payload record, assigning the next sequence number for the job.
pub async fn append(
    db: &Database,
    job_id: &JobId,
    payload_type: PayloadType,
    provider: &str,
    content: &str,
) -> Result<(), EchocalError> {
    let job_id = job_id.0.clone();
    let payload_type = payload_type.to_string();
    let provider = provider.to_string();
    let content = content.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO intent_pipeline_payloads
                 (job_id, sequence, payload_type, provider, content)
                 VALUES (?1,
                         COALESCE((SELECT MAX(sequence) + 1 FROM intent_pipeline_payloads
                                   WHERE job_id = ?1), 1),
                         ?2, ?3, ?4)",
                params![job_id, payload_type, provider, content],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All payload records for a job in sequence order. Used by tests and
/// debugging tooling only.
pub async fn list_for_job(
    db: &Database,
    job_id: &JobId,
) -> Result<Vec<PayloadRecord>, EchocalError> {
    let job_id = job_id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, job_id, sequence, payload_type, provider, content, created_at
                 FROM intent_pipeline_payloads
                 WHERE job_id = ?1
                 ORDER BY sequence ASC",
            )?;
            let rows = stmt.query_map(params![job_id], |row| {
                let payload_type: String = row.get(3)?;
                Ok(PayloadRecord {
                    id: row.get(0)?,
                    job_id: JobId(row.get(1)?),
                    sequence: row.get(2)?,
                    payload_type: payload_type.parse::<PayloadType>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(std::io::Error::other(e.to_string())),
                        )
                    })?,
                    provider: row.get(4)?,
                    content: row.get(5)?,
                    created_at: row.get(6)?,
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
