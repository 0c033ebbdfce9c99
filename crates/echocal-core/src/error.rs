// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Echocal pipeline.

use thiserror::Error;

/// The primary error type used across all Echocal crates and collaborator traits.
#[derive(Debug, Error)]
pub enum EchocalError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel transport errors (send failure, media fetch failure, rate limiting).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Speech-to-text errors (provider failure, unsupported audio).
    #[error("transcription error: {message}")]
    Transcription {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Intent extraction errors (model failure, malformed structured output).
    #[error("extraction error: {message}")]
    Extraction {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Calendar provider errors (create/update/delete/search/contacts failures).
    #[error("calendar error: {message}")]
    Calendar {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EchocalError {
    /// The message text used for error classification and logging.
    ///
    /// Classification matches on this string, so collaborator adapters should
    /// preserve upstream status codes and error identifiers in `message`.
    pub fn classification_text(&self) -> String {
        self.to_string()
    }
}
