// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock speech-to-text provider.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use echocal_core::EchocalError;
use echocal_core::traits::transcriber::Transcriber;
use echocal_core::types::Transcription;

/// A mock transcriber that returns canned transcripts.
///
/// Queued transcripts are consumed in order; once the queue is empty the
/// fallback transcript is returned indefinitely.
pub struct MockTranscriber {
    queue: Arc<Mutex<VecDeque<String>>>,
    fallback: String,
    error: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<Vec<(usize, String)>>>,
}

impl MockTranscriber {
    /// A transcriber that always returns the given text.
    pub fn with_text(text: &str) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: text.to_string(),
            error: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue transcripts to be returned in order before the fallback.
    pub fn with_queued(self, texts: Vec<String>) -> Self {
        self.queue
            .try_lock()
            .expect("builder used before sharing")
            .extend(texts);
        self
    }

    /// Make every call fail with a transcription error carrying this message.
    pub fn with_error(self, message: &str) -> Self {
        *self.error.try_lock().expect("builder used before sharing") =
            Some(message.to_string());
        self
    }

    /// `(audio_len, mime_type)` for each call received.
    pub async fn calls(&self) -> Vec<(usize, String)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<Transcription, EchocalError> {
        self.calls
            .lock()
            .await
            .push((audio.len(), mime_type.to_string()));
        if let Some(message) = self.error.lock().await.clone() {
            return Err(EchocalError::Transcription {
                message,
                source: None,
            });
        }
        let text = self
            .queue
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(Transcription {
            text,
            language: Some("en".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_transcripts_then_fallback() {
        let transcriber = MockTranscriber::with_text("fallback")
            .with_queued(vec!["first".into(), "second".into()]);

        assert_eq!(transcriber.transcribe(b"a", "audio/ogg").await.unwrap().text, "first");
        assert_eq!(transcriber.transcribe(b"bb", "audio/ogg").await.unwrap().text, "second");
        assert_eq!(transcriber.transcribe(b"ccc", "audio/ogg").await.unwrap().text, "fallback");

        let calls = transcriber.calls().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], (3, "audio/ogg".to_string()));
    }

    #[tokio::test]
    async fn error_mode_fails_every_call() {
        let transcriber = MockTranscriber::with_text("unused").with_error("503 overloaded");
        let err = transcriber.transcribe(b"a", "audio/ogg").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
