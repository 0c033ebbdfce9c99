// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock calendar provider with an in-memory directory and event store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use echocal_core::EchocalError;
use echocal_core::traits::calendar::CalendarProvider;
use echocal_core::types::{Contact, CreatedEvent, EventDraft, EventQuery, EventSummary};

/// A mock calendar for testing.
///
/// Seed the contact directory with `with_contacts()` and searchable events
/// with `with_events()`; created and deleted events are captured for
/// assertion.
pub struct MockCalendar {
    contacts: Arc<Mutex<Vec<Contact>>>,
    events: Arc<Mutex<Vec<EventSummary>>>,
    created: Arc<Mutex<Vec<(String, EventDraft)>>>,
    updated: Arc<Mutex<Vec<(String, String, EventDraft)>>>,
    deleted: Arc<Mutex<Vec<(String, String)>>>,
    contacts_error: Arc<Mutex<Option<String>>>,
    create_error: Arc<Mutex<Option<String>>>,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self {
            contacts: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(Vec::new())),
            created: Arc::new(Mutex::new(Vec::new())),
            updated: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            contacts_error: Arc::new(Mutex::new(None)),
            create_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Seed the contact directory.
    pub fn with_contacts(self, contacts: Vec<Contact>) -> Self {
        *self
            .contacts
            .try_lock()
            .expect("builder used before sharing") = contacts;
        self
    }

    /// Seed events returned by `search_events()`.
    pub fn with_events(self, events: Vec<EventSummary>) -> Self {
        *self.events.try_lock().expect("builder used before sharing") = events;
        self
    }

    /// Make `get_contacts()` fail with a calendar error carrying this message.
    pub fn with_contacts_error(self, message: &str) -> Self {
        *self
            .contacts_error
            .try_lock()
            .expect("builder used before sharing") = Some(message.to_string());
        self
    }

    /// Make `create_event()` fail with a calendar error carrying this message.
    pub fn with_create_error(self, message: &str) -> Self {
        *self
            .create_error
            .try_lock()
            .expect("builder used before sharing") = Some(message.to_string());
        self
    }

    /// `(user_id, draft)` for each created event.
    pub async fn created_events(&self) -> Vec<(String, EventDraft)> {
        self.created.lock().await.clone()
    }

    /// `(user_id, event_id, draft)` for each updated event.
    pub async fn updated_events(&self) -> Vec<(String, String, EventDraft)> {
        self.updated.lock().await.clone()
    }

    /// `(user_id, event_id)` for each deleted event.
    pub async fn deleted_events(&self) -> Vec<(String, String)> {
        self.deleted.lock().await.clone()
    }
}

impl Default for MockCalendar {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    async fn create_event(
        &self,
        user_id: &str,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, EchocalError> {
        if let Some(message) = self.create_error.lock().await.clone() {
            return Err(EchocalError::Calendar {
                message,
                source: None,
            });
        }
        let mut created = self.created.lock().await;
        created.push((user_id.to_string(), draft.clone()));
        let event_id = format!("evt-{}", created.len());
        Ok(CreatedEvent {
            link: Some(format!("https://calendar.example.com/{event_id}")),
            event_id,
        })
    }

    async fn update_event(
        &self,
        user_id: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, EchocalError> {
        self.updated
            .lock()
            .await
            .push((user_id.to_string(), event_id.to_string(), draft.clone()));
        Ok(CreatedEvent {
            event_id: event_id.to_string(),
            link: Some(format!("https://calendar.example.com/{event_id}")),
        })
    }

    async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<(), EchocalError> {
        self.deleted
            .lock()
            .await
            .push((user_id.to_string(), event_id.to_string()));
        Ok(())
    }

    async fn search_events(
        &self,
        _user_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<EventSummary>, EchocalError> {
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|e| {
                let text_ok = query
                    .text
                    .as_ref()
                    .is_none_or(|t| e.title.to_lowercase().contains(&t.to_lowercase()));
                let date_ok = query.date.as_ref().is_none_or(|d| e.start.starts_with(d.as_str()));
                text_ok && date_ok
            })
            .cloned()
            .collect())
    }

    async fn get_contacts(&self, _user_id: &str) -> Result<Vec<Contact>, EchocalError> {
        if let Some(message) = self.contacts_error.lock().await.clone() {
            return Err(EchocalError::Calendar {
                message,
                source: None,
            });
        }
        Ok(self.contacts.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_captures_and_assigns_sequential_ids() {
        let calendar = MockCalendar::new();
        let draft = EventDraft {
            title: "Standup".into(),
            start_date: "2026-03-01".into(),
            start_time: Some("09:30".into()),
            end_time: None,
            is_all_day: false,
            location: None,
            description: None,
            attendee_emails: vec![],
        };

        let first = calendar.create_event("u1", &draft).await.unwrap();
        let second = calendar.create_event("u1", &draft).await.unwrap();
        assert_eq!(first.event_id, "evt-1");
        assert_eq!(second.event_id, "evt-2");
        assert_eq!(calendar.created_events().await.len(), 2);
    }

    #[tokio::test]
    async fn search_filters_by_text_and_date() {
        let calendar = MockCalendar::new().with_events(vec![
            EventSummary {
                event_id: "e1".into(),
                title: "Standup".into(),
                start: "2026-03-01T09:30:00Z".into(),
            },
            EventSummary {
                event_id: "e2".into(),
                title: "Lunch".into(),
                start: "2026-03-02T12:00:00Z".into(),
            },
        ]);

        let by_text = calendar
            .search_events(
                "u1",
                &EventQuery {
                    text: Some("stand".into()),
                    date: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].event_id, "e1");

        let by_date = calendar
            .search_events(
                "u1",
                &EventQuery {
                    text: None,
                    date: Some("2026-03-02".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_date.len(), 1);
        assert_eq!(by_date[0].event_id, "e2");
    }

    #[tokio::test]
    async fn create_error_mode_fails() {
        let calendar = MockCalendar::new().with_create_error("403 forbidden");
        let draft = EventDraft {
            title: "Standup".into(),
            start_date: "2026-03-01".into(),
            start_time: None,
            end_time: None,
            is_all_day: true,
            location: None,
            description: None,
            attendee_emails: vec![],
        };
        let err = calendar.create_event("u1", &draft).await.unwrap_err();
        assert!(err.to_string().contains("403"));
        assert!(calendar.created_events().await.is_empty());
    }
}
