// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock collaborators for Echocal integration tests.
//!
//! Provides deterministic, CI-runnable stand-ins for the four external
//! collaborators so pipeline tests never touch a real messaging platform,
//! speech-to-text provider, language model, or calendar.
//!
//! # Components
//!
//! - [`MockChannel`] - captures outbound messages, serves media bytes
//! - [`MockTranscriber`] - returns canned transcripts
//! - [`MockExtractor`] - returns canned intent snapshots with audit trails
//! - [`MockCalendar`] - in-memory directory and event store

pub mod mock_calendar;
pub mod mock_channel;
pub mod mock_extractor;
pub mod mock_transcriber;

pub use mock_calendar::MockCalendar;
pub use mock_channel::{MockChannel, SentMessage};
pub use mock_extractor::MockExtractor;
pub use mock_transcriber::MockTranscriber;
