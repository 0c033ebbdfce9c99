// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic expiry sweep for pending intents.
//!
//! Overdue awaiting intents are flipped to `expired` so stale state does not
//! accumulate. Answer matching already excludes overdue records by timestamp,
//! so the sweep is bookkeeping, not a correctness gate. No reminder or
//! timeout notification is sent to the user.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use echocal_storage::Database;
use echocal_storage::queries::pending_intents;

/// Run the expiry sweep every `interval` until cancelled.
pub async fn run_sweeper(db: Database, interval: Duration, cancel: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "expiry sweeper started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("expiry sweeper stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match pending_intents::expire_overdue(&db).await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "pending intents expired"),
            Err(e) => error!(error = %e, "expiry sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sweeper_exits_on_cancellation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweeper(
            db.clone(),
            Duration::from_secs(3600),
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();

        db.close().await.unwrap();
    }
}
