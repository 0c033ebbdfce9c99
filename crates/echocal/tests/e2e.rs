// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook-level end-to-end tests: inbound message in, calendar action and
//! notification out, with the background worker running.

use std::sync::Arc;
use std::time::Duration;

use echocal::{Collaborators, IngestOutcome, Runtime};
use echocal_core::types::{InboundMessage, JobId, JobState, MessageContent};
use echocal_storage::models::now_rfc3339;
use echocal_storage::queries::jobs;
use echocal_test_utils::{MockCalendar, MockChannel, MockExtractor, MockTranscriber};
use tempfile::TempDir;

struct E2e {
    runtime: Runtime,
    channel: Arc<MockChannel>,
    calendar: Arc<MockCalendar>,
    _dir: TempDir,
}

async fn e2e(extractor: MockExtractor, calendar: MockCalendar) -> E2e {
    let dir = TempDir::new().unwrap();
    let config = echocal::load_and_validate_str(&format!(
        r#"
        [storage]
        database_path = "{db}"
        spool_dir = "{spool}"

        [queue]
        poll_interval_ms = 20
        "#,
        db = dir.path().join("e2e.db").display(),
        spool = dir.path().join("spool").display(),
    ))
    .unwrap();

    let channel = Arc::new(MockChannel::new().with_media("media-1", b"voice note".to_vec()));
    let calendar = Arc::new(calendar);
    let runtime = Runtime::new(
        config,
        Collaborators {
            channel: channel.clone(),
            transcriber: Arc::new(MockTranscriber::with_text(
                "schedule a design review on march first at nine thirty",
            )),
            extractor: Arc::new(extractor),
            calendar: calendar.clone(),
        },
    )
    .await
    .unwrap();
    runtime.start();

    E2e {
        runtime,
        channel,
        calendar,
        _dir: dir,
    }
}

fn voice_note(media_id: &str) -> InboundMessage {
    InboundMessage {
        id: uuid(),
        channel_number_id: "num-1".into(),
        sender_address: "+15550001111".into(),
        user_id: Some("user-1".into()),
        content: MessageContent::Audio {
            media_id: media_id.into(),
            mime_type: "audio/ogg".into(),
        },
        timestamp: now_rfc3339(),
    }
}

fn text_reply(body: &str) -> InboundMessage {
    InboundMessage {
        id: uuid(),
        channel_number_id: "num-1".into(),
        sender_address: "+15550001111".into(),
        user_id: Some("user-1".into()),
        content: MessageContent::Text(body.into()),
        timestamp: now_rfc3339(),
    }
}

fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn complete_snapshot() -> echocal_core::types::IntentSnapshot {
    use echocal_core::types::{IntentAction, IntentSnapshot};
    let mut s = IntentSnapshot::new(IntentAction::Create);
    s.title = Some("Design review".into());
    s.start_date = Some("2026-03-01".into());
    s.start_time = Some("09:30".into());
    s
}

async fn wait_for_state(e2e: &E2e, job_id: &JobId, state: JobState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = jobs::get_job(e2e.runtime.database(), job_id)
            .await
            .unwrap()
            .unwrap();
        if job.state == state {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} stuck in {} waiting for {state}",
            job.state
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn voice_note_becomes_a_calendar_event() {
    let e2e = e2e(MockExtractor::with_snapshot(complete_snapshot()), MockCalendar::new()).await;

    let outcome = e2e.runtime.ingest(&voice_note("media-1")).await.unwrap();
    let IngestOutcome::JobCreated { job_id } = outcome else {
        panic!("expected a new job, got {outcome:?}");
    };

    wait_for_state(&e2e, &job_id, JobState::Completed).await;

    let created = e2e.calendar.created_events().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].1.title, "Design review");
    let sent = e2e.channel.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body().contains("Created \"Design review\""));

    e2e.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_webhook_delivery_creates_one_job() {
    let e2e = e2e(MockExtractor::with_snapshot(complete_snapshot()), MockCalendar::new()).await;

    let first = e2e.runtime.ingest(&voice_note("media-1")).await.unwrap();
    let IngestOutcome::JobCreated { job_id } = first else {
        panic!("expected a new job");
    };
    let second = e2e.runtime.ingest(&voice_note("media-1")).await.unwrap();
    assert_eq!(
        second,
        IngestOutcome::DuplicateMedia {
            job_id: job_id.clone()
        }
    );

    wait_for_state(&e2e, &job_id, JobState::Completed).await;
    assert_eq!(e2e.calendar.created_events().await.len(), 1);

    e2e.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn unverified_sender_is_dropped() {
    let e2e = e2e(MockExtractor::with_snapshot(complete_snapshot()), MockCalendar::new()).await;

    let mut msg = voice_note("media-1");
    msg.user_id = None;
    let outcome = e2e.runtime.ingest(&msg).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Unverified);
    assert_eq!(e2e.channel.sent_count().await, 0);

    e2e.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn clarification_answer_flows_back_into_the_pipeline() {
    let mut snapshot = complete_snapshot();
    snapshot.title = None;
    let e2e = e2e(MockExtractor::with_snapshot(snapshot), MockCalendar::new()).await;

    let outcome = e2e.runtime.ingest(&voice_note("media-1")).await.unwrap();
    let IngestOutcome::JobCreated { job_id } = outcome else {
        panic!("expected a new job");
    };

    wait_for_state(&e2e, &job_id, JobState::AwaitingClarification).await;
    let sent = e2e.channel.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body(), "What should the event be called?");

    // The user replies over the same channel; ingest routes it to the engine.
    let outcome = e2e.runtime.ingest(&text_reply("Quarterly planning")).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Clarification(echocal::ClarifyOutcome::Resolved { .. })
    ));

    wait_for_state(&e2e, &job_id, JobState::Completed).await;
    let created = e2e.calendar.created_events().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].1.title, "Quarterly planning");

    e2e.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn stray_text_without_a_pending_question_is_not_matched() {
    let e2e = e2e(MockExtractor::with_snapshot(complete_snapshot()), MockCalendar::new()).await;

    let outcome = e2e.runtime.ingest(&text_reply("hello there")).await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Clarification(echocal::ClarifyOutcome::NotMatched)
    );

    e2e.runtime.shutdown().await.unwrap();
}
