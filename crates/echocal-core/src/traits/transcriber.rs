// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech-to-text provider trait.

use async_trait::async_trait;

use crate::error::EchocalError;
use crate::types::Transcription;

/// Converts raw audio bytes into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<Transcription, EchocalError>;
}
