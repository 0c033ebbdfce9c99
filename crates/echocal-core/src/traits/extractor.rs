// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intent extraction trait for the language-model collaborator.

use async_trait::async_trait;

use crate::error::EchocalError;
use crate::types::Extraction;

/// Context passed to the extractor alongside the transcript.
///
/// `today` anchors relative date expressions ("tomorrow at three") to an
/// absolute ISO date.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub user_id: String,
    pub today: String,
}

/// Extracts a structured intent snapshot from free text.
///
/// Implementations must return the full prompt/response audit trail in
/// [`Extraction::audit`]; the analyze stage persists every payload for
/// debugging and reproducibility.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<Extraction, EchocalError>;
}
