// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Echocal stage pipeline.
//!
//! Six durable stages take a voice note from inbound webhook to calendar
//! action: download-audio, transcribe-audio, analyze-intent, process-intent,
//! create-event, send-notification. Each stage is a queue handler with an
//! idempotence gate, timing instrumentation, and classified failure
//! handling; the orchestrator owns dispatch, retries, and terminal-failure
//! notifications.

pub mod classify;
pub mod handlers;
pub mod orchestrator;
pub mod timing;

pub use classify::{Classification, ErrorCategory, classify, classify_error};
pub use handlers::{PipelineContext, StageHandler, StageOutcome};
pub use orchestrator::{Orchestrator, RetryPolicy, run_worker};
pub use timing::with_timing;
