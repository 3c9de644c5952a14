//! Collaborator interfaces.
//!
//! The ingestion pipeline only talks to the remote service, the database and
//! object storage through these traits, so every backend is pluggable and
//! the pipeline is testable against in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cursor::DialogCursor;
use crate::error::Result;
use crate::models::*;
use crate::remote::{
    DialogsPage, HistoryPage, InputPeer, InputUser, RemoteChat, RemoteMedia, RemoteUser,
};

// =============================================================================
// REMOTE MESSAGING SERVICE
// =============================================================================

/// Remote messaging service, already authenticated.
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// The account the session belongs to.
    async fn current_user(&self) -> Result<RemoteUser>;

    /// One page of the conversation listing starting at `cursor`.
    async fn list_dialogs(&self, cursor: &DialogCursor, limit: i32) -> Result<DialogsPage>;

    /// One page of history strictly older than `offset_id` (0 = newest).
    async fn message_history(
        &self,
        peer: &InputPeer,
        offset_id: i64,
        limit: i32,
    ) -> Result<HistoryPage>;

    /// Explicit participant lookup.
    async fn get_users(&self, users: &[InputUser]) -> Result<Vec<RemoteUser>>;

    /// Explicit group/channel lookup.
    async fn get_chats(&self, chat_ids: &[i64]) -> Result<Vec<RemoteChat>>;

    /// Raw bytes of an attachment.
    async fn download_media(&self, media: &RemoteMedia) -> Result<Vec<u8>>;
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Repository for conversations.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert by remote reference, or update the title if it changed.
    async fn upsert(&self, remote: ConversationRef, title: &str) -> Result<Upserted<Conversation>>;

    async fn find_by_remote(&self, remote: ConversationRef) -> Result<Option<Conversation>>;

    async fn get(&self, id: Uuid) -> Result<Conversation>;

    /// Newest first.
    async fn list(&self, page: PageRequest) -> Result<Page<Conversation>>;
}

/// Repository for participants.
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn find_by_remote(&self, remote_id: i64) -> Result<Option<Participant>>;

    /// Insert if absent. An existing participant is returned untouched.
    async fn ensure(&self, remote_id: i64, display_name: &str) -> Result<Upserted<Participant>>;
}

/// Request for listing a conversation's messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListMessagesRequest {
    pub conversation_id: Uuid,
    /// Only messages of this kind.
    pub kind: Option<MessageKind>,
    pub page: PageRequest,
}

/// Repository for messages.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert if absent, keyed by (remote message id, conversation).
    ///
    /// An existing row is returned untouched with [`UpsertOutcome::Unchanged`].
    async fn upsert(&self, message: NewMessage) -> Result<Upserted<Message>>;

    async fn find(&self, remote_message_id: i64, conversation_id: Uuid) -> Result<Option<Message>>;

    /// Set the media locator. Returns false when no such message exists.
    async fn set_media_locator(
        &self,
        remote_message_id: i64,
        conversation_id: Uuid,
        locator: &str,
    ) -> Result<bool>;

    /// Newest remote id first.
    async fn list(&self, req: ListMessagesRequest) -> Result<Page<Message>>;
}

// =============================================================================
// OBJECT STORAGE
// =============================================================================

/// Object storage for media bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `name`, overwriting any previous object, and return
    /// a stable locator.
    async fn put_object(&self, name: &str, data: Vec<u8>, content_type: &str) -> Result<String>;

    /// Time-limited read URL for a stored object name.
    async fn presign_get(&self, name: &str, expiry: Duration) -> Result<String>;
}

/// Split a `scheme://bucket/object/name` locator into bucket and object name.
pub fn split_locator(locator: &str) -> Option<(&str, &str)> {
    let (_, rest) = locator.split_once("://")?;
    let (bucket, name) = rest.split_once('/')?;
    if bucket.is_empty() || name.is_empty() {
        return None;
    }
    Some((bucket, name))
}
