// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Clarification engine for incomplete intents.
//!
//! When the resolution pipeline cannot act on an intent, this crate pauses
//! the job, asks the user over the channel, matches their answers back to
//! the records that asked, and resumes the pipeline once everything is
//! answered. Questions render by option count: plain text, reply buttons,
//! a list picker, or a numbered enumeration.

pub mod engine;
pub mod render;
pub mod sweep;

pub use engine::{ClarifyEngine, ClarifyOutcome};
pub use render::{RenderedQuestion, render_question};
pub use sweep::run_sweeper;
