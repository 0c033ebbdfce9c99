// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock intent extractor.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use echocal_core::EchocalError;
use echocal_core::traits::extractor::{ExtractionContext, IntentExtractor};
use echocal_core::types::{Extraction, ExtractionPayload, IntentSnapshot, PayloadType};

/// A mock extractor returning canned snapshots with a synthetic audit trail.
///
/// Queued snapshots are consumed in order; once the queue is empty the
/// fallback snapshot is returned indefinitely. Each call fabricates a
/// prompt/response audit pair the way a real model adapter would.
pub struct MockExtractor {
    queue: Arc<Mutex<VecDeque<IntentSnapshot>>>,
    fallback: IntentSnapshot,
    error: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    /// An extractor that always returns the given snapshot.
    pub fn with_snapshot(snapshot: IntentSnapshot) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: snapshot,
            error: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue snapshots to be returned in order before the fallback.
    pub fn with_queued(self, snapshots: Vec<IntentSnapshot>) -> Self {
        self.queue
            .try_lock()
            .expect("builder used before sharing")
            .extend(snapshots);
        self
    }

    /// Make every call fail with an extraction error carrying this message.
    pub fn with_error(self, message: &str) -> Self {
        *self.error.try_lock().expect("builder used before sharing") =
            Some(message.to_string());
        self
    }

    /// The transcript text passed to each call.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl IntentExtractor for MockExtractor {
    async fn extract(
        &self,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<Extraction, EchocalError> {
        self.calls.lock().await.push(text.to_string());
        if let Some(message) = self.error.lock().await.clone() {
            return Err(EchocalError::Extraction {
                message,
                source: None,
            });
        }
        let snapshot = self
            .queue
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let response = serde_json::to_string(&snapshot)
            .map_err(|e| EchocalError::Internal(e.to_string()))?;
        Ok(Extraction {
            snapshot,
            audit: vec![
                ExtractionPayload {
                    payload_type: PayloadType::Context,
                    provider: "mock-extractor".to_string(),
                    content: format!("user={} today={}", context.user_id, context.today),
                },
                ExtractionPayload {
                    payload_type: PayloadType::Prompt,
                    provider: "mock-extractor".to_string(),
                    content: text.to_string(),
                },
                ExtractionPayload {
                    payload_type: PayloadType::Response,
                    provider: "mock-extractor".to_string(),
                    content: response,
                },
            ],
        })
    }
}
