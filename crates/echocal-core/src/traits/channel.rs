// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel transport trait for messaging platform integrations.

use async_trait::async_trait;

use crate::error::EchocalError;
use crate::types::{AnswerOption, FieldDescriptor, MessageId};

/// Outbound side of the messaging channel.
///
/// Every send returns the platform message identifier, which is used to
/// correlate future responses back to the prompt that asked the question.
/// Webhook parsing and signature verification live in the transport, not here.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, to: &str, body: &str) -> Result<MessageId, EchocalError>;

    /// Send a message with reply buttons. Transports support at most 3.
    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[AnswerOption],
    ) -> Result<MessageId, EchocalError>;

    /// Send a list prompt. Transports support at most 10 options.
    async fn send_list(
        &self,
        to: &str,
        body: &str,
        options: &[AnswerOption],
    ) -> Result<MessageId, EchocalError>;

    /// Send a structured multi-field form, correlated by an opaque token.
    async fn send_flow(
        &self,
        to: &str,
        flow_token: &str,
        body: &str,
        fields: &[FieldDescriptor],
    ) -> Result<MessageId, EchocalError>;

    /// Fetch the raw bytes of a media object referenced by an inbound message.
    async fn fetch_media(&self, media_id: &str) -> Result<Vec<u8>, EchocalError>;
}
