// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stage timing instrumentation.
//!
//! Timing is observability, not correctness: a failure to record never fails
//! the stage and never causes a retry.

use std::time::Instant;

use tracing::warn;

use echocal_core::EchocalError;
use echocal_core::types::{JobId, Stage};
use echocal_storage::Database;
use echocal_storage::models::now_rfc3339;
use echocal_storage::queries::timings;

/// Run `op` and append a timing record for it.
///
/// `metadata` is computed from the outcome after the operation finishes, so
/// builders can report success details (byte counts, match counts) or the
/// failure message. The operation's result is returned unchanged; recording
/// failures are swallowed at warning level.
pub async fn with_timing<T, F, M>(
    db: &Database,
    job_id: &JobId,
    stage: Stage,
    metadata: M,
    op: F,
) -> Result<T, EchocalError>
where
    F: Future<Output = Result<T, EchocalError>>,
    M: FnOnce(&Result<T, EchocalError>) -> Option<serde_json::Value>,
{
    let started_at = now_rfc3339();
    let start = Instant::now();
    let result = op.await;
    let completed_at = now_rfc3339();
    let duration_ms = start.elapsed().as_millis() as i64;

    let meta = metadata(&result);
    if let Err(e) = timings::record(
        db,
        job_id,
        stage,
        &started_at,
        &completed_at,
        duration_ms,
        meta.as_ref(),
    )
    .await
    {
        warn!(job_id = %job_id, %stage, error = %e, "failed to record stage timing");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn success_records_timing_with_metadata() {
        let (db, _dir) = setup_db().await;
        let job_id = JobId("job-1".into());

        let result = with_timing(
            &db,
            &job_id,
            Stage::DownloadAudio,
            |r: &Result<usize, EchocalError>| {
                r.as_ref().ok().map(|n| serde_json::json!({"bytes": n}))
            },
            async { Ok(2048usize) },
        )
        .await
        .unwrap();
        assert_eq!(result, 2048);

        let records = timings::list_for_job(&db, &job_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage, Stage::DownloadAudio);
        assert_eq!(records[0].metadata.as_ref().unwrap()["bytes"], 2048);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failure_still_records_and_propagates() {
        let (db, _dir) = setup_db().await;
        let job_id = JobId("job-2".into());

        let result: Result<(), EchocalError> = with_timing(
            &db,
            &job_id,
            Stage::TranscribeAudio,
            |r| match r {
                Ok(_) => None,
                Err(e) => Some(serde_json::json!({"error": e.to_string()})),
            },
            async { Err(EchocalError::Internal("boom".into())) },
        )
        .await;
        assert!(result.is_err());

        let records = timings::list_for_job(&db, &job_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].metadata.as_ref().unwrap()["error"],
            "internal error: boom"
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn record_failure_is_swallowed() {
        let (db, _dir) = setup_db().await;
        let job_id = JobId("job-3".into());
        db.close().await.unwrap();

        // The audit store is gone; the operation result survives anyway.
        let result = with_timing(&db, &job_id, Stage::AnalyzeIntent, |_| None, async {
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
    }
}
