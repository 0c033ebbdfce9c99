// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits consumed by the pipeline core.
//!
//! The channel transport, speech-to-text provider, intent extraction model,
//! and calendar integration are external collaborators; the core depends on
//! these interfaces only.

pub mod calendar;
pub mod channel;
pub mod extractor;
pub mod transcriber;

pub use calendar::CalendarProvider;
pub use channel::ChannelAdapter;
pub use extractor::{ExtractionContext, IntentExtractor};
pub use transcriber::Transcriber;
