//! Raw conversation to local conversation identity.

use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument, Span};

use chatvault_core::{
    find_chat, find_user, ConversationRef, ConversationRepository, InputPeer, InputUser,
    MessagingService, PeerKind, RemoteChat, RemoteDialog, RemotePeer, RemoteUser,
    ResolvedConversation, Result, UpsertOutcome,
};

use crate::cancel::Cancellation;

/// Maps listing entries to local conversations, creating or retitling them.
pub struct ConversationResolver {
    remote: Arc<dyn MessagingService>,
    conversations: Arc<dyn ConversationRepository>,
    self_id: i64,
    span: Span,
}

impl ConversationResolver {
    pub fn new(
        remote: Arc<dyn MessagingService>,
        conversations: Arc<dyn ConversationRepository>,
        self_id: i64,
        parent: &Span,
    ) -> Self {
        Self {
            remote,
            conversations,
            self_id,
            span: info_span!(parent: parent, "resolver"),
        }
    }

    /// Resolve one listing entry.
    ///
    /// Returns `Ok(None)` for entries that are never archived: the account
    /// owner's own dialog, folders and unrecognized shapes.
    pub async fn resolve(
        &self,
        dialog: &RemoteDialog,
        users: &[RemoteUser],
        chats: &[RemoteChat],
        cancel: &Cancellation,
    ) -> Result<Option<ResolvedConversation>> {
        let span = self.span.clone();
        self.resolve_inner(dialog, users, chats, cancel)
            .instrument(span)
            .await
    }

    async fn resolve_inner(
        &self,
        dialog: &RemoteDialog,
        users: &[RemoteUser],
        chats: &[RemoteChat],
        cancel: &Cancellation,
    ) -> Result<Option<ResolvedConversation>> {
        let peer = match dialog {
            RemoteDialog::Dialog { peer, .. } => *peer,
            other => {
                warn!(
                    subsystem = "ingest",
                    component = "resolver",
                    shape = other.shape(),
                    "Skipping non-conversation listing entry"
                );
                return Ok(None);
            }
        };

        let (display_name, input_peer) = match peer {
            RemotePeer::User { user_id } if user_id == self.self_id => {
                debug!(
                    subsystem = "ingest",
                    component = "resolver",
                    remote_id = user_id,
                    "Skipping self dialog"
                );
                return Ok(None);
            }
            RemotePeer::User { user_id } => {
                let user = self.user_record(user_id, users, cancel).await?;
                let name = user
                    .as_ref()
                    .and_then(RemoteUser::display_name)
                    .unwrap_or_else(|| PeerKind::User.placeholder(user_id));
                let batch: Vec<RemoteUser> = user.into_iter().collect();
                (name, InputPeer::resolve(&peer, &batch, &[]))
            }
            RemotePeer::Chat { chat_id: id } | RemotePeer::Channel { channel_id: id } => {
                let chat = self.chat_record(id, chats, cancel).await?;
                let name = chat
                    .as_ref()
                    .and_then(|c| c.title.as_deref())
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| match peer {
                        RemotePeer::Channel { .. } => PeerKind::Channel.placeholder(id),
                        _ => PeerKind::Chat.placeholder(id),
                    });
                let batch: Vec<RemoteChat> = chat.into_iter().collect();
                (name, InputPeer::resolve(&peer, &[], &batch))
            }
            RemotePeer::Unrecognized => {
                warn!(
                    subsystem = "ingest",
                    component = "resolver",
                    "Skipping conversation with unrecognized peer"
                );
                return Ok(None);
            }
        };

        // Every recognized peer has a kind and an id.
        let (Some(kind), Some(remote_id)) = (peer.kind(), peer.remote_id()) else {
            return Ok(None);
        };
        let upserted = cancel
            .run(
                self.conversations
                    .upsert(ConversationRef::new(kind, remote_id), &display_name),
            )
            .await?;

        match upserted.outcome {
            UpsertOutcome::Inserted => debug!(
                subsystem = "ingest",
                component = "resolver",
                op = "upsert",
                conversation_id = %upserted.record.id,
                title = %display_name,
                "Conversation created"
            ),
            UpsertOutcome::Updated => debug!(
                subsystem = "ingest",
                component = "resolver",
                op = "upsert",
                conversation_id = %upserted.record.id,
                title = %display_name,
                "Conversation retitled"
            ),
            UpsertOutcome::Unchanged => {}
        }

        Ok(Some(ResolvedConversation {
            conversation: upserted.record,
            peer: input_peer,
            display_name,
        }))
    }

    /// The user from the batch, or an explicit lookup when the batch lacks it.
    async fn user_record(
        &self,
        user_id: i64,
        users: &[RemoteUser],
        cancel: &Cancellation,
    ) -> Result<Option<RemoteUser>> {
        if let Some(user) = find_user(users, user_id) {
            return Ok(Some(user.clone()));
        }
        debug!(
            subsystem = "ingest",
            component = "resolver",
            op = "get_users",
            remote_id = user_id,
            "Counterpart missing from batch, looking it up"
        );
        let request = [InputUser {
            user_id,
            access_hash: 0,
        }];
        let found = cancel.run(self.remote.get_users(&request)).await?;
        Ok(found.into_iter().find(|u| u.id == user_id))
    }

    /// The group or channel from the batch, or an explicit lookup.
    async fn chat_record(
        &self,
        chat_id: i64,
        chats: &[RemoteChat],
        cancel: &Cancellation,
    ) -> Result<Option<RemoteChat>> {
        if let Some(chat) = find_chat(chats, chat_id) {
            return Ok(Some(chat.clone()));
        }
        debug!(
            subsystem = "ingest",
            component = "resolver",
            op = "get_chats",
            remote_id = chat_id,
            "Group missing from batch, looking it up"
        );
        let found = cancel.run(self.remote.get_chats(&[chat_id])).await?;
        Ok(found.into_iter().find(|c| c.id == chat_id))
    }
}
