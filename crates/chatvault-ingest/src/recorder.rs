//! Remote message to archived message, plus media job submission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info_span, trace, warn, Instrument, Span};
use uuid::Uuid;

use chatvault_core::{
    find_user, placeholder_user_name, Error, MediaJob, MessageKind, MessageRepository,
    NewMessage, ParticipantRepository, PeerKind, RemoteMessage, RemoteMessageBody, RemotePeer,
    RemoteUser, ResolvedConversation, Result,
};
use chatvault_jobs::MediaIngestionPool;

use crate::cancel::Cancellation;

/// What recording one remote message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new message row was written.
    Recorded { media_queued: bool },
    /// The message was already archived.
    Duplicate { media_queued: bool },
    /// Nothing was written.
    Skipped,
}

impl RecordOutcome {
    pub fn media_queued(&self) -> bool {
        matches!(
            self,
            RecordOutcome::Recorded { media_queued: true }
                | RecordOutcome::Duplicate { media_queued: true }
        )
    }
}

/// Persists remote messages idempotently and hands their media to the pool.
pub struct MessageRecorder {
    participants: Arc<dyn ParticipantRepository>,
    messages: Arc<dyn MessageRepository>,
    media: Arc<MediaIngestionPool>,
    self_user: RemoteUser,
    span: Span,
}

impl MessageRecorder {
    pub fn new(
        participants: Arc<dyn ParticipantRepository>,
        messages: Arc<dyn MessageRepository>,
        media: Arc<MediaIngestionPool>,
        self_user: RemoteUser,
        parent: &Span,
    ) -> Self {
        Self {
            participants,
            messages,
            media,
            self_user,
            span: info_span!(parent: parent, "recorder"),
        }
    }

    /// Media jobs waiting in the pool queue.
    pub fn queued_media(&self) -> usize {
        self.media.queued()
    }

    /// Record one message of `conversation`.
    ///
    /// Persistence failures skip the message and are retried by the next
    /// rescan. Cancellation, authentication and queue errors are returned.
    pub async fn record(
        &self,
        conversation: &ResolvedConversation,
        message: &RemoteMessage,
        users: &[RemoteUser],
        cancel: &Cancellation,
    ) -> Result<RecordOutcome> {
        let body = match message {
            RemoteMessage::Message(body) => body,
            other => {
                trace!(shape = other.shape(), id = ?other.id(), "Skipping non-content message");
                return Ok(RecordOutcome::Skipped);
            }
        };

        let span = self.span.clone();
        self.record_body(conversation, body, users, cancel)
            .instrument(span)
            .await
    }

    async fn record_body(
        &self,
        conversation: &ResolvedConversation,
        body: &RemoteMessageBody,
        users: &[RemoteUser],
        cancel: &Cancellation,
    ) -> Result<RecordOutcome> {
        let conversation_id = conversation.conversation.id;

        let Some(author_remote_id) = self.author_of(conversation, body) else {
            warn!(
                subsystem = "ingest",
                component = "recorder",
                %conversation_id,
                remote_message_id = body.id,
                from = ?body.from,
                "Sender is not a user, skipping message"
            );
            return Ok(RecordOutcome::Skipped);
        };

        let author_name = self.author_name(author_remote_id, users);
        let author = match cancel
            .run(self.participants.ensure(author_remote_id, &author_name))
            .await
        {
            Ok(author) => author,
            Err(e) => return self.absorb(e, conversation_id, body.id, "ensure_participant"),
        };
        if author.inserted() {
            debug!(
                subsystem = "ingest",
                component = "recorder",
                participant_id = %author.record.id,
                remote_id = author_remote_id,
                name = %author_name,
                "Participant created"
            );
        }

        let new_message = NewMessage {
            remote_message_id: body.id,
            conversation_id,
            author_id: author.record.id,
            content: body.text.clone(),
            kind: MessageKind::classify(body.media.as_ref()),
            sent_at: (body.date > 0)
                .then(|| DateTime::<Utc>::from_timestamp(body.date, 0))
                .flatten(),
        };
        let stored = match cancel.run(self.messages.upsert(new_message)).await {
            Ok(stored) => stored,
            Err(e) => return self.absorb(e, conversation_id, body.id, "upsert_message"),
        };

        let media_queued = match &body.media {
            Some(media) if stored.record.media_locator.is_none() => {
                let job = MediaJob {
                    remote_message_id: body.id,
                    conversation_id,
                    author_id: Some(author.record.id),
                    media: media.clone(),
                    naming_hint: conversation.display_name.clone(),
                };
                cancel.run(self.media.submit(job)).await?;
                true
            }
            _ => false,
        };

        trace!(
            %conversation_id,
            remote_message_id = body.id,
            kind = stored.record.kind.as_str(),
            inserted = stored.inserted(),
            media_queued,
            "Message recorded"
        );

        Ok(if stored.inserted() {
            RecordOutcome::Recorded { media_queued }
        } else {
            RecordOutcome::Duplicate { media_queued }
        })
    }

    /// Remote user id the message is attributed to.
    ///
    /// Without an explicit sender, outgoing messages belong to the account
    /// owner and incoming one-to-one messages to the counterpart.
    fn author_of(&self, conversation: &ResolvedConversation, body: &RemoteMessageBody) -> Option<i64> {
        match body.from {
            Some(RemotePeer::User { user_id }) => Some(user_id),
            Some(_) => None,
            None if body.out => Some(self.self_user.id),
            None if conversation.conversation.remote.kind == PeerKind::User => {
                Some(conversation.conversation.remote.remote_id)
            }
            None => None,
        }
    }

    fn author_name(&self, remote_id: i64, users: &[RemoteUser]) -> String {
        find_user(users, remote_id)
            .and_then(RemoteUser::display_name)
            .or_else(|| {
                (remote_id == self.self_user.id)
                    .then(|| self.self_user.display_name())
                    .flatten()
            })
            .unwrap_or_else(|| placeholder_user_name(remote_id))
    }

    /// Log and skip a persistence failure; pass everything else through.
    fn absorb(
        &self,
        error: Error,
        conversation_id: Uuid,
        remote_message_id: i64,
        op: &'static str,
    ) -> Result<RecordOutcome> {
        if matches!(error, Error::Cancelled) || error.is_fatal() {
            return Err(error);
        }
        // A transient failure is picked up again by the next rescan.
        let transient = error.is_transient();
        if transient {
            warn!(
                subsystem = "ingest",
                component = "recorder",
                op,
                %conversation_id,
                remote_message_id,
                transient,
                error = %error,
                "Failed to persist message, skipping"
            );
        } else {
            error!(
                subsystem = "ingest",
                component = "recorder",
                op,
                %conversation_id,
                remote_message_id,
                transient,
                error = %error,
                "Failed to persist message, skipping"
            );
        }
        Ok(RecordOutcome::Skipped)
    }
}
