// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field resolvers and the intent resolution pipeline.
//!
//! Decides whether an extracted intent snapshot is actionable, resolving
//! attendee references against the user's contact directory and turning every
//! remaining gap into a clarification question.

pub mod contact;
pub mod pipeline;

pub use contact::{AmbiguousMatch, ContactResolution, resolve_contacts};
pub use pipeline::{ResolutionContext, ResolutionPipeline, ResolutionResult};
