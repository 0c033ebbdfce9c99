// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The intent resolution pipeline.
//!
//! Takes an extracted snapshot and decides whether it is actionable:
//! attendee references are resolved against the contact directory, then the
//! action-specific completeness rules run. Every gap becomes a
//! [`ClarificationEntry`]; all gaps are accumulated in a single pass so the
//! user can be asked everything at once rather than drip-fed one question per
//! round trip.

use std::sync::Arc;

use echocal_core::CalendarProvider;
use echocal_core::types::{
    ClarificationEntry, ClarificationReason, IntentAction, IntentSnapshot,
};
use tracing::debug;

use crate::contact::{attendee_field_key, resolve_contacts};

/// Per-job context the resolvers need beyond the snapshot itself.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub user_id: String,
}

/// Result of one resolution pass.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    /// The snapshot with any directory-resolved attendee addresses filled in.
    pub snapshot: IntentSnapshot,
    /// Outstanding questions, in presentation order. Empty means actionable.
    pub clarifications: Vec<ClarificationEntry>,
}

impl ResolutionResult {
    pub fn is_complete(&self) -> bool {
        self.clarifications.iter().all(ClarificationEntry::is_resolved)
    }

    /// The first unresolved question, if any.
    pub fn next_question(&self) -> Option<&ClarificationEntry> {
        self.clarifications.iter().find(|c| !c.is_resolved())
    }
}

/// Runs attendee resolution and completeness checks over a snapshot.
pub struct ResolutionPipeline {
    calendar: Arc<dyn CalendarProvider>,
}

impl ResolutionPipeline {
    pub fn new(calendar: Arc<dyn CalendarProvider>) -> Self {
        Self { calendar }
    }

    /// One full resolution pass. Never fails: resolver-level errors degrade
    /// into clarification questions instead of aborting the job.
    pub async fn resolve(
        &self,
        snapshot: &IntentSnapshot,
        ctx: &ResolutionContext,
    ) -> ResolutionResult {
        let mut snapshot = snapshot.clone();
        let mut clarifications = Vec::new();

        // Contact questions come before missing-field questions, so on
        // single-question channels the attendee ambiguity is settled first.
        let raw_values: Vec<String> = snapshot
            .attendees
            .iter()
            .filter(|a| a.resolved_email.is_none())
            .map(|a| a.raw.clone())
            .collect();
        let resolution = resolve_contacts(self.calendar.as_ref(), &ctx.user_id, &raw_values).await;

        for attendee in &mut snapshot.attendees {
            if attendee.resolved_email.is_none() {
                if let Some(email) = resolution.resolved.get(&attendee.raw) {
                    attendee.resolved_email = Some(email.clone());
                }
            }
        }
        for ambiguous in resolution.ambiguous {
            clarifications.push(ambiguous.question);
        }
        for raw in resolution.not_found {
            clarifications.push(not_found_question(&raw));
        }

        clarifications.extend(missing_field_questions(&snapshot));

        debug!(
            action = %snapshot.action,
            outstanding = clarifications.len(),
            "resolution pass complete"
        );
        ResolutionResult {
            snapshot,
            clarifications,
        }
    }
}

/// Completeness rules per action, in presentation order
/// (title, then date, then time).
fn missing_field_questions(snapshot: &IntentSnapshot) -> Vec<ClarificationEntry> {
    let mut questions = Vec::new();
    match snapshot.action {
        IntentAction::Create => {
            if snapshot.title.is_none() {
                questions.push(free_text_question(
                    "title",
                    "What should the event be called?",
                ));
            }
            if snapshot.start_date.is_none() {
                questions.push(free_text_question(
                    "start_date",
                    "What date is the event on?",
                ));
            }
            // All-day events do not need a wall-clock time.
            if snapshot.start_time.is_none() && !snapshot.is_all_day {
                questions.push(free_text_question(
                    "start_time",
                    "What time does it start?",
                ));
            }
        }
        IntentAction::Update | IntentAction::Delete => {
            // These need enough to find the existing event: a title or a date.
            if snapshot.title.is_none() && snapshot.start_date.is_none() {
                questions.push(free_text_question(
                    "event_reference",
                    "Which event do you mean? Tell me its name or date.",
                ));
            }
        }
        // A query with no criteria lists the day's events, so it is always
        // complete.
        IntentAction::Query => {}
    }
    questions
}

fn free_text_question(field_key: &str, question: &str) -> ClarificationEntry {
    ClarificationEntry {
        field_key: field_key.to_string(),
        reason: ClarificationReason::MissingField,
        question: question.to_string(),
        options: Vec::new(),
        answer: None,
    }
}

fn not_found_question(raw: &str) -> ClarificationEntry {
    ClarificationEntry {
        field_key: attendee_field_key(raw),
        reason: ClarificationReason::ContactNotFound,
        question: format!(
            "I couldn't find \"{raw}\" in your contacts. What's their email address?"
        ),
        options: Vec::new(),
        answer: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echocal_core::types::{Attendee, Contact};
    use echocal_test_utils::MockCalendar;

    fn pipeline_with(contacts: Vec<Contact>) -> ResolutionPipeline {
        ResolutionPipeline::new(Arc::new(MockCalendar::new().with_contacts(contacts)))
    }

    fn ctx() -> ResolutionContext {
        ResolutionContext {
            user_id: "u1".into(),
        }
    }

    fn directory() -> Vec<Contact> {
        vec![
            Contact { name: "Sarah Chen".into(), email: "sarah.chen@example.com".into() },
            Contact { name: "Sarah Park".into(), email: "sarah.park@example.com".into() },
            Contact { name: "Bob Miller".into(), email: "bob@example.com".into() },
        ]
    }

    #[tokio::test]
    async fn complete_create_yields_no_questions() {
        let pipeline = pipeline_with(directory());
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.title = Some("Standup".into());
        snapshot.start_date = Some("2026-03-01".into());
        snapshot.start_time = Some("09:30".into());

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        assert!(result.clarifications.is_empty());
        assert!(result.is_complete());
        assert!(result.next_question().is_none());
    }

    #[tokio::test]
    async fn bare_create_asks_title_then_date_then_time() {
        let pipeline = pipeline_with(directory());
        let snapshot = IntentSnapshot::new(IntentAction::Create);

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        let keys: Vec<&str> =
            result.clarifications.iter().map(|c| c.field_key.as_str()).collect();
        assert_eq!(keys, vec!["title", "start_date", "start_time"]);
        assert!(!result.is_complete());
        assert_eq!(result.next_question().unwrap().field_key, "title");
        for entry in &result.clarifications {
            assert_eq!(entry.reason, ClarificationReason::MissingField);
            assert!(entry.options.is_empty());
        }
    }

    #[tokio::test]
    async fn all_day_create_does_not_ask_for_a_time() {
        let pipeline = pipeline_with(directory());
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.title = Some("Company offsite".into());
        snapshot.start_date = Some("2026-04-10".into());
        snapshot.is_all_day = true;

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        assert!(result.clarifications.is_empty());
    }

    #[tokio::test]
    async fn attendees_are_resolved_into_the_snapshot() {
        let pipeline = pipeline_with(directory());
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.title = Some("1:1".into());
        snapshot.start_date = Some("2026-03-02".into());
        snapshot.start_time = Some("15:00".into());
        snapshot.attendees = vec![Attendee::raw("bob")];

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        assert!(result.is_complete());
        assert_eq!(
            result.snapshot.attendees[0].resolved_email.as_deref(),
            Some("bob@example.com")
        );
    }

    #[tokio::test]
    async fn ambiguous_attendee_becomes_a_multiple_choice_question() {
        let pipeline = pipeline_with(directory());
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.title = Some("Design review".into());
        snapshot.start_date = Some("2026-03-03".into());
        snapshot.start_time = Some("11:00".into());
        snapshot.attendees = vec![Attendee::raw("sarah")];

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        assert_eq!(result.clarifications.len(), 1);
        let question = &result.clarifications[0];
        assert_eq!(question.field_key, "attendee:sarah");
        assert_eq!(question.reason, ClarificationReason::AmbiguousContact);
        assert_eq!(question.options.len(), 2);
        assert!(result.snapshot.attendees[0].resolved_email.is_none());
    }

    #[tokio::test]
    async fn unknown_attendee_asks_for_an_email() {
        let pipeline = pipeline_with(directory());
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.title = Some("Lunch".into());
        snapshot.start_date = Some("2026-03-04".into());
        snapshot.start_time = Some("12:00".into());
        snapshot.attendees = vec![Attendee::raw("zelda")];

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        assert_eq!(result.clarifications.len(), 1);
        let question = &result.clarifications[0];
        assert_eq!(question.field_key, "attendee:zelda");
        assert_eq!(question.reason, ClarificationReason::ContactNotFound);
        assert!(question.options.is_empty());
    }

    #[tokio::test]
    async fn all_gaps_are_accumulated_in_one_pass() {
        let pipeline = pipeline_with(directory());
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.start_date = Some("2026-03-05".into());
        snapshot.attendees = vec![Attendee::raw("sarah"), Attendee::raw("zelda")];

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        let keys: Vec<&str> =
            result.clarifications.iter().map(|c| c.field_key.as_str()).collect();
        // Attendee questions lead, then completeness questions.
        assert_eq!(
            keys,
            vec!["attendee:sarah", "attendee:zelda", "title", "start_time"]
        );
    }

    #[tokio::test]
    async fn contact_questions_come_before_missing_field_questions() {
        let pipeline = pipeline_with(directory());
        let mut snapshot = IntentSnapshot::new(IntentAction::Create);
        snapshot.start_date = Some("2026-03-06".into());
        snapshot.start_time = Some("10:00".into());
        snapshot.attendees = vec![Attendee::raw("sarah")];

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        let keys: Vec<&str> =
            result.clarifications.iter().map(|c| c.field_key.as_str()).collect();
        assert_eq!(keys, vec!["attendee:sarah", "title"]);
        assert_eq!(result.next_question().unwrap().field_key, "attendee:sarah");
    }

    #[tokio::test]
    async fn update_without_any_event_reference_asks_for_one() {
        let pipeline = pipeline_with(directory());
        let snapshot = IntentSnapshot::new(IntentAction::Update);

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        assert_eq!(result.clarifications.len(), 1);
        assert_eq!(result.clarifications[0].field_key, "event_reference");
    }

    #[tokio::test]
    async fn delete_with_a_title_is_complete() {
        let pipeline = pipeline_with(directory());
        let mut snapshot = IntentSnapshot::new(IntentAction::Delete);
        snapshot.title = Some("Standup".into());

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        assert!(result.clarifications.is_empty());
    }

    #[tokio::test]
    async fn bare_query_is_always_complete() {
        let pipeline = pipeline_with(directory());
        let snapshot = IntentSnapshot::new(IntentAction::Query);

        let result = pipeline.resolve(&snapshot, &ctx()).await;
        assert!(result.clarifications.is_empty());
    }

    #[tokio::test]
    async fn answered_entries_count_as_complete() {
        let pipeline = pipeline_with(directory());
        let snapshot = IntentSnapshot::new(IntentAction::Create);

        let mut result = pipeline.resolve(&snapshot, &ctx()).await;
        for entry in &mut result.clarifications {
            entry.answer = Some("answered".into());
        }
        assert!(result.is_complete());
        assert!(result.next_question().is_none());
    }
}
