// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with a registry of media bytes
//! for `fetch_media()` and full capture of every outbound send for assertion
//! in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use echocal_core::EchocalError;
use echocal_core::traits::channel::ChannelAdapter;
use echocal_core::types::{AnswerOption, FieldDescriptor, MessageId};

/// One captured outbound message, tagged by which send method produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Text {
        to: String,
        body: String,
    },
    Buttons {
        to: String,
        body: String,
        buttons: Vec<AnswerOption>,
    },
    List {
        to: String,
        body: String,
        options: Vec<AnswerOption>,
    },
    Flow {
        to: String,
        flow_token: String,
        body: String,
        fields: Vec<FieldDescriptor>,
    },
}

impl SentMessage {
    /// The body text, whichever variant this is.
    pub fn body(&self) -> &str {
        match self {
            SentMessage::Text { body, .. }
            | SentMessage::Buttons { body, .. }
            | SentMessage::List { body, .. }
            | SentMessage::Flow { body, .. } => body,
        }
    }
}

/// A mock messaging channel for testing.
///
/// Register media bytes with `with_media()`, then assert on what the code
/// under test sent via `sent_messages()`.
pub struct MockChannel {
    media: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    send_error: Arc<Mutex<Option<String>>>,
    fetch_error: Arc<Mutex<Option<String>>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            media: Arc::new(Mutex::new(HashMap::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            send_error: Arc::new(Mutex::new(None)),
            fetch_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Register media bytes retrievable through `fetch_media()`.
    pub fn with_media(self, media_id: &str, bytes: Vec<u8>) -> Self {
        self.media
            .try_lock()
            .expect("builder used before sharing")
            .insert(media_id.to_string(), bytes);
        self
    }

    /// Make every send fail with a channel error carrying this message.
    pub fn with_send_error(self, message: &str) -> Self {
        *self
            .send_error
            .try_lock()
            .expect("builder used before sharing") = Some(message.to_string());
        self
    }

    /// Make every `fetch_media()` fail with a channel error carrying this
    /// message.
    pub fn with_fetch_error(self, message: &str) -> Self {
        *self
            .fetch_error
            .try_lock()
            .expect("builder used before sharing") = Some(message.to_string());
        self
    }

    /// All messages captured so far, in send order.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// Clear any configured send failure, so subsequent sends succeed.
    pub async fn clear_send_error(&self) {
        *self.send_error.lock().await = None;
    }

    async fn capture(&self, msg: SentMessage) -> Result<MessageId, EchocalError> {
        if let Some(message) = self.send_error.lock().await.clone() {
            return Err(EchocalError::Channel {
                message,
                source: None,
            });
        }
        self.sent.lock().await.push(msg);
        Ok(MessageId(format!("mock-msg-{}", uuid::Uuid::new_v4())))
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    async fn send_text(&self, to: &str, body: &str) -> Result<MessageId, EchocalError> {
        self.capture(SentMessage::Text {
            to: to.to_string(),
            body: body.to_string(),
        })
        .await
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[AnswerOption],
    ) -> Result<MessageId, EchocalError> {
        self.capture(SentMessage::Buttons {
            to: to.to_string(),
            body: body.to_string(),
            buttons: buttons.to_vec(),
        })
        .await
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        options: &[AnswerOption],
    ) -> Result<MessageId, EchocalError> {
        self.capture(SentMessage::List {
            to: to.to_string(),
            body: body.to_string(),
            options: options.to_vec(),
        })
        .await
    }

    async fn send_flow(
        &self,
        to: &str,
        flow_token: &str,
        body: &str,
        fields: &[FieldDescriptor],
    ) -> Result<MessageId, EchocalError> {
        self.capture(SentMessage::Flow {
            to: to.to_string(),
            flow_token: flow_token.to_string(),
            body: body.to_string(),
            fields: fields.to_vec(),
        })
        .await
    }

    async fn fetch_media(&self, media_id: &str) -> Result<Vec<u8>, EchocalError> {
        if let Some(message) = self.fetch_error.lock().await.clone() {
            return Err(EchocalError::Channel {
                message,
                source: None,
            });
        }
        self.media
            .lock()
            .await
            .get(media_id)
            .cloned()
            .ok_or_else(|| EchocalError::Channel {
                message: format!("media not found: {media_id}"),
                source: None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sends_are_captured_in_order() {
        let channel = MockChannel::new();
        channel.send_text("user-1", "first").await.unwrap();
        channel
            .send_buttons(
                "user-1",
                "pick one",
                &[AnswerOption {
                    id: "a".into(),
                    label: "A".into(),
                    value: "a".into(),
                }],
            )
            .await
            .unwrap();

        let sent = channel.sent_messages().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body(), "first");
        match &sent[1] {
            SentMessage::Buttons { buttons, .. } => assert_eq!(buttons.len(), 1),
            other => panic!("expected buttons, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_media_returns_registered_bytes() {
        let channel = MockChannel::new().with_media("m1", vec![1, 2, 3]);
        assert_eq!(channel.fetch_media("m1").await.unwrap(), vec![1, 2, 3]);
        assert!(channel.fetch_media("missing").await.is_err());
    }

    #[tokio::test]
    async fn send_error_fails_and_captures_nothing() {
        let channel = MockChannel::new().with_send_error("429 too many requests");
        let err = channel.send_text("user-1", "hi").await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert_eq!(channel.sent_count().await, 0);

        channel.clear_send_error().await;
        channel.send_text("user-1", "hi").await.unwrap();
        assert_eq!(channel.sent_count().await, 1);
    }
}
