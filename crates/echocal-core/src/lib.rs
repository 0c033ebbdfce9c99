// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Echocal voice-to-calendar pipeline.
//!
//! This crate provides the foundational error type, common types (stages,
//! job states, intent snapshots, clarification entries), and the collaborator
//! traits implemented by channel, speech-to-text, extraction, and calendar
//! adapters.

pub mod error;
pub mod payload;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::EchocalError;
pub use types::{
    FlowToken, IntentAction, IntentSnapshot, JobId, JobState, MessageId, PendingIntentId,
    PendingIntentStatus, Stage,
};

pub use traits::{
    CalendarProvider, ChannelAdapter, ExtractionContext, IntentExtractor, Transcriber,
};
