// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Echocal runtime.
//!
//! Wires configuration, storage, the stage pipeline, and the clarification
//! engine behind a single facade. An embedding transport (a webhook server,
//! a CLI, a test harness) constructs a [`Runtime`] with its collaborator
//! implementations, starts the background worker, and feeds parsed inbound
//! messages to [`Runtime::ingest`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use echocal_clarify::{ClarifyEngine, run_sweeper};
use echocal_core::payload::{DownloadPayload, StagePayload};
use echocal_core::types::{InboundMessage, JobId, MessageContent};
use echocal_core::{
    CalendarProvider, ChannelAdapter, EchocalError, IntentExtractor, Transcriber,
};
use echocal_pipeline::{Orchestrator, PipelineContext, RetryPolicy, run_worker};
use echocal_resolve::ResolutionPipeline;
use echocal_storage::Database;
use echocal_storage::models::VoiceJob;
use echocal_storage::queries::{jobs, queue};

pub use echocal_clarify::ClarifyOutcome;
pub use echocal_config::{EchocalConfig, load_and_validate, load_and_validate_str};

/// The four external collaborators an embedding must provide.
pub struct Collaborators {
    pub channel: Arc<dyn ChannelAdapter>,
    pub transcriber: Arc<dyn Transcriber>,
    pub extractor: Arc<dyn IntentExtractor>,
    pub calendar: Arc<dyn CalendarProvider>,
}

/// What became of one ingested message.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A voice note from a verified sender started a new job.
    JobCreated { job_id: JobId },
    /// The same media id was already ingested; no new job.
    DuplicateMedia { job_id: JobId },
    /// The message was offered to the clarification engine.
    Clarification(ClarifyOutcome),
    /// The sender is not a verified user; the message was dropped.
    Unverified,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub struct Runtime {
    config: EchocalConfig,
    db: Database,
    clarify: Arc<ClarifyEngine>,
    orchestrator: Arc<Orchestrator>,
    cancel: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    /// Open storage and assemble the pipeline.
    pub async fn new(
        config: EchocalConfig,
        collaborators: Collaborators,
    ) -> Result<Self, EchocalError> {
        let db = Database::open(&config.storage.database_path).await?;

        let clarify = Arc::new(ClarifyEngine::new(
            db.clone(),
            collaborators.channel.clone(),
            chrono::Duration::minutes(config.clarify.expiry_minutes),
            config.queue.max_attempts,
        ));
        let ctx = Arc::new(PipelineContext {
            db: db.clone(),
            channel: collaborators.channel,
            transcriber: collaborators.transcriber,
            extractor: collaborators.extractor,
            calendar: collaborators.calendar.clone(),
            resolution: ResolutionPipeline::new(collaborators.calendar),
            clarify: clarify.clone(),
            queue_max_attempts: config.queue.max_attempts,
            spool_dir: config.storage.spool_dir.clone().into(),
        });
        let orchestrator = Arc::new(Orchestrator::new(
            ctx,
            RetryPolicy {
                backoff_base_secs: config.queue.backoff_base_secs,
                pause_retry_delay_secs: config.clarify.pause_retry_delay_secs,
            },
        ));

        info!(
            database = %config.storage.database_path,
            "runtime assembled"
        );
        Ok(Self {
            config,
            db,
            clarify,
            orchestrator,
            cancel: CancellationToken::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Start the queue worker and the clarification expiry sweeper.
    pub fn start(&self) {
        let worker = tokio::spawn(run_worker(
            self.orchestrator.clone(),
            Duration::from_millis(self.config.queue.poll_interval_ms),
            self.config.queue.prune_completed_after_secs as i64,
            self.cancel.child_token(),
        ));
        let sweeper = tokio::spawn(run_sweeper(
            self.db.clone(),
            Duration::from_secs(self.config.clarify.sweep_interval_secs),
            self.cancel.child_token(),
        ));
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(worker);
            tasks.push(sweeper);
        }
    }

    /// Route one parsed inbound message.
    ///
    /// Voice notes start jobs (idempotent per media id); everything else is
    /// offered to the clarification engine as a potential answer.
    pub async fn ingest(&self, msg: &InboundMessage) -> Result<IngestOutcome, EchocalError> {
        let Some(user_id) = &msg.user_id else {
            warn!(sender = %msg.sender_address, "message from unverified sender dropped");
            return Ok(IngestOutcome::Unverified);
        };

        match &msg.content {
            MessageContent::Audio {
                media_id,
                mime_type,
            } => {
                let job = VoiceJob::new(
                    user_id.clone(),
                    msg.channel_number_id.clone(),
                    msg.id.clone(),
                    media_id.clone(),
                    msg.sender_address.clone(),
                    mime_type.clone(),
                );
                if !jobs::create_job(&self.db, &job).await? {
                    let existing = jobs::get_job_by_media(&self.db, media_id)
                        .await?
                        .ok_or_else(|| {
                            EchocalError::Internal(format!(
                                "job insert ignored but none found for media {media_id}"
                            ))
                        })?;
                    info!(job_id = %existing.id, media_id, "duplicate media delivery dropped");
                    return Ok(IngestOutcome::DuplicateMedia {
                        job_id: existing.id,
                    });
                }

                let payload = DownloadPayload {
                    job_id: job.id.clone(),
                };
                let body = serde_json::to_string(&payload)
                    .map_err(|e| EchocalError::Internal(e.to_string()))?;
                queue::enqueue(
                    &self.db,
                    DownloadPayload::STAGE,
                    &body,
                    &payload.dedup_key(),
                    self.config.queue.max_attempts,
                    0,
                )
                .await?;
                info!(job_id = %job.id, media_id, "voice job created");
                Ok(IngestOutcome::JobCreated { job_id: job.id })
            }
            _ => {
                let outcome = self.clarify.handle_inbound(msg).await?;
                Ok(IngestOutcome::Clarification(outcome))
            }
        }
    }

    /// Stop background tasks and close storage.
    pub async fn shutdown(self) -> Result<(), EchocalError> {
        self.cancel.cancel();
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task did not stop cleanly");
            }
        }
        self.db.close().await?;
        info!("runtime stopped");
        Ok(())
    }

    /// Direct storage access for embeddings and tests.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The clarification engine, for transports that route answers directly.
    pub fn clarify_engine(&self) -> &Arc<ClarifyEngine> {
        &self.clarify
    }
}
