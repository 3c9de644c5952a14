//! Top-level rescan loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use chatvault_core::{
    ConversationRepository, Error, MessageRepository, MessagingService, ParticipantRepository,
    RemoteUser, ResolvedConversation, Result,
};
use chatvault_jobs::MediaIngestionPool;

use crate::cancel::Cancellation;
use crate::config::IngestConfig;
use crate::enumerator::ConversationEnumerator;
use crate::paginator::MessageHistoryPaginator;
use crate::recorder::{MessageRecorder, RecordOutcome};
use crate::resolver::ConversationResolver;

/// Everything the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub remote: Arc<dyn MessagingService>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub participants: Arc<dyn ParticipantRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub media: Arc<MediaIngestionPool>,
}

/// Counters for one rescan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescanStats {
    pub conversations_seen: usize,
    pub conversations_skipped: usize,
    pub conversations_failed: usize,
    pub messages_recorded: usize,
    pub messages_duplicate: usize,
    pub messages_skipped: usize,
    pub media_jobs_queued: usize,
}

impl RescanStats {
    fn count(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Recorded { .. } => self.messages_recorded += 1,
            RecordOutcome::Duplicate { .. } => self.messages_duplicate += 1,
            RecordOutcome::Skipped => self.messages_skipped += 1,
        }
        if outcome.media_queued() {
            self.media_jobs_queued += 1;
        }
    }
}

/// Errors that end the rescan instead of being absorbed per conversation.
fn stops_rescan(error: &Error) -> bool {
    error.is_fatal() || matches!(error, Error::Cancelled | Error::Job(_))
}

/// Log a failure the rescan continues past. Transient failures log as
/// warnings, anything else as an error.
fn log_recoverable(error: &Error, op: &'static str, subject: &str, message: &str) {
    let transient = error.is_transient();
    if transient {
        warn!(
            subsystem = "ingest",
            component = "driver",
            op,
            subject,
            transient,
            error = %error,
            "{}",
            message
        );
    } else {
        error!(
            subsystem = "ingest",
            component = "driver",
            op,
            subject,
            transient,
            error = %error,
            "{}",
            message
        );
    }
}

/// Enumerates conversations, walks their history and records every message,
/// then waits and does it again.
pub struct IngestionDriver {
    config: IngestConfig,
    self_user: RemoteUser,
    enumerator: ConversationEnumerator,
    resolver: ConversationResolver,
    paginator: MessageHistoryPaginator,
    recorder: MessageRecorder,
    span: Span,
}

impl IngestionDriver {
    /// Resolve the account owner and wire the pipeline.
    ///
    /// Fails when the session is not authorized.
    pub async fn start(
        collaborators: Collaborators,
        config: IngestConfig,
        parent: &Span,
    ) -> Result<Self> {
        config.validate()?;
        let span = info_span!(parent: parent, "ingestion_driver");

        let self_user = collaborators
            .remote
            .current_user()
            .instrument(span.clone())
            .await?;
        span.in_scope(|| {
            info!(
                subsystem = "ingest",
                component = "driver",
                self_id = self_user.id,
                dialogs_page_limit = config.dialogs_page_limit,
                messages_page_limit = config.messages_page_limit,
                rescan_interval_secs = config.rescan_interval.as_secs(),
                "Ingestion driver started"
            )
        });

        let Collaborators {
            remote,
            conversations,
            participants,
            messages,
            media,
        } = collaborators;

        Ok(Self {
            enumerator: ConversationEnumerator::new(remote.clone(), config.dialogs_page_limit, &span),
            resolver: ConversationResolver::new(remote.clone(), conversations, self_user.id, &span),
            paginator: MessageHistoryPaginator::new(remote, config.messages_page_limit, &span),
            recorder: MessageRecorder::new(participants, messages, media, self_user.clone(), &span),
            self_user,
            config,
            span,
        })
    }

    pub fn self_user(&self) -> &RemoteUser {
        &self.self_user
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// One full rescan.
    ///
    /// Only authentication failures, cancellation and a closed media queue
    /// are returned as errors; everything else is logged and counted.
    pub async fn run_once(&self, cancel: &Cancellation) -> Result<RescanStats> {
        let span = info_span!(parent: &self.span, "rescan");
        self.rescan(cancel).instrument(span).await
    }

    async fn rescan(&self, cancel: &Cancellation) -> Result<RescanStats> {
        let start = Instant::now();
        let mut stats = RescanStats::default();
        let mut pages = self.enumerator.pages();

        loop {
            let batch = match pages.next(cancel).await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) if stops_rescan(&e) => return Err(e),
                Err(e) => {
                    log_recoverable(
                        &e,
                        "list_dialogs",
                        "dialogs",
                        "Conversation listing failed, ending rescan early",
                    );
                    break;
                }
            };

            for dialog in &batch.dialogs {
                stats.conversations_seen += 1;
                let resolved = match self
                    .resolver
                    .resolve(dialog, &batch.users, &batch.chats, cancel)
                    .await
                {
                    Ok(Some(resolved)) => resolved,
                    Ok(None) => {
                        stats.conversations_skipped += 1;
                        continue;
                    }
                    Err(e) if stops_rescan(&e) => return Err(e),
                    Err(e) => {
                        log_recoverable(&e, "resolve", dialog.shape(), "Failed to resolve conversation");
                        stats.conversations_failed += 1;
                        continue;
                    }
                };

                if let Err(e) = self.archive(&resolved, cancel, &mut stats).await {
                    if stops_rescan(&e) {
                        return Err(e);
                    }
                    log_recoverable(
                        &e,
                        "archive",
                        &format!("{} ({})", resolved.conversation.id, resolved.display_name),
                        "History traversal failed, continuing with next conversation",
                    );
                    stats.conversations_failed += 1;
                }
            }
        }

        info!(
            subsystem = "ingest",
            component = "driver",
            op = "rescan",
            conversations_seen = stats.conversations_seen,
            conversations_skipped = stats.conversations_skipped,
            conversations_failed = stats.conversations_failed,
            messages_recorded = stats.messages_recorded,
            messages_duplicate = stats.messages_duplicate,
            messages_skipped = stats.messages_skipped,
            media_jobs_queued = stats.media_jobs_queued,
            media_queue_depth = self.recorder.queued_media(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Rescan complete"
        );
        Ok(stats)
    }

    /// Walk one conversation's history and record every message in order.
    async fn archive(
        &self,
        conversation: &ResolvedConversation,
        cancel: &Cancellation,
        stats: &mut RescanStats,
    ) -> Result<()> {
        let start = Instant::now();
        let mut pages = self.paginator.pages(conversation.peer);
        let mut seen = 0usize;

        while let Some(batch) = pages.next(cancel).await? {
            for message in &batch.messages {
                let outcome = self
                    .recorder
                    .record(conversation, message, &batch.users, cancel)
                    .await?;
                stats.count(outcome);
                seen += 1;
            }
        }

        debug!(
            subsystem = "ingest",
            component = "driver",
            op = "archive",
            conversation_id = %conversation.conversation.id,
            title = %conversation.display_name,
            pages = pages.requested(),
            messages = seen,
            duration_ms = start.elapsed().as_millis() as u64,
            "Conversation archived"
        );
        Ok(())
    }

    /// Rescan until `cancel` fires, pausing the configured interval between
    /// passes.
    ///
    /// Returns an error only for failures that make further rescans
    /// pointless, such as a revoked session.
    pub async fn run(&self, cancel: Cancellation) -> Result<()> {
        let mut rescans: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.run_once(&cancel).await {
                Ok(_) => rescans += 1,
                Err(Error::Cancelled) => break,
                Err(e) => {
                    self.span.in_scope(|| {
                        error!(
                            subsystem = "ingest",
                            component = "driver",
                            error = %e,
                            "Rescan aborted, stopping driver"
                        )
                    });
                    return Err(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.rescan_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        self.span.in_scope(|| {
            info!(
                subsystem = "ingest",
                component = "driver",
                rescans,
                "Ingestion driver stopped"
            )
        });
        Ok(())
    }
}
