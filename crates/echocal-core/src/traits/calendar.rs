// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Calendar provider trait.

use async_trait::async_trait;

use crate::error::EchocalError;
use crate::types::{Contact, CreatedEvent, EventDraft, EventQuery, EventSummary};

/// The calendar integration consumed by the create-event stage and the
/// contact resolver.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn create_event(
        &self,
        user_id: &str,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, EchocalError>;

    async fn update_event(
        &self,
        user_id: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, EchocalError>;

    async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<(), EchocalError>;

    async fn search_events(
        &self,
        user_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<EventSummary>, EchocalError>;

    /// The user's contact directory, used by the contact resolver.
    async fn get_contacts(&self, user_id: &str) -> Result<Vec<Contact>, EchocalError>;
}
