// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table.

pub mod flows;
pub mod jobs;
pub mod payloads;
pub mod pending_intents;
pub mod prompts;
pub mod queue;
pub mod timings;
