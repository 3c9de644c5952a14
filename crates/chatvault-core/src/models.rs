//! Persistent records and transient work units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::remote::{InputPeer, RemoteMedia};

/// Kind of remote peer a conversation is held with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    User,
    Chat,
    Channel,
}

impl PeerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerKind::User => "user",
            PeerKind::Chat => "chat",
            PeerKind::Channel => "channel",
        }
    }

    /// Placeholder title used when the remote side supplies no name.
    pub fn placeholder(&self, remote_id: i64) -> String {
        format!("{}{}", self.as_str(), remote_id)
    }
}

impl std::str::FromStr for PeerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(PeerKind::User),
            "chat" => Ok(PeerKind::Chat),
            "channel" => Ok(PeerKind::Channel),
            other => Err(Error::InvalidInput(format!("unknown peer kind: {}", other))),
        }
    }
}

/// Remote identity of a conversation. Unique per local conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationRef {
    pub kind: PeerKind,
    pub remote_id: i64,
}

impl ConversationRef {
    pub fn new(kind: PeerKind, remote_id: i64) -> Self {
        Self { kind, remote_id }
    }
}

/// Archived conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub remote: ConversationRef,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message author known through authorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub remote_id: i64,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Placeholder participant name for a remote user id.
pub fn placeholder_user_name(remote_id: i64) -> String {
    PeerKind::User.placeholder(remote_id)
}

/// Kind of archived message, derived from its attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Photo,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Photo => "photo",
            MessageKind::Document => "document",
        }
    }

    /// Classify from an optional attachment. Unsupported media counts as text.
    pub fn classify(media: Option<&RemoteMedia>) -> Self {
        match media {
            Some(RemoteMedia::Photo { .. }) => MessageKind::Photo,
            Some(RemoteMedia::Document { .. }) => MessageKind::Document,
            Some(RemoteMedia::Unsupported) | None => MessageKind::Text,
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "photo" => Ok(MessageKind::Photo),
            "document" => Ok(MessageKind::Document),
            other => Err(Error::InvalidInput(format!("unknown message kind: {}", other))),
        }
    }
}

/// Archived message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub remote_message_id: i64,
    pub conversation_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    /// Set once media ingestion completes. Eventually consistent.
    pub media_locator: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert request for a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub remote_message_id: i64,
    pub conversation_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub sent_at: Option<DateTime<Utc>>,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Record returned by an upsert together with what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted<T> {
    pub record: T,
    pub outcome: UpsertOutcome,
}

impl<T> Upserted<T> {
    pub fn new(record: T, outcome: UpsertOutcome) -> Self {
        Self { record, outcome }
    }

    pub fn inserted(&self) -> bool {
        self.outcome == UpsertOutcome::Inserted
    }
}

/// A conversation resolved for history traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConversation {
    pub conversation: Conversation,
    /// Canonical reference for history calls.
    pub peer: InputPeer,
    pub display_name: String,
}

/// Unit of media work. Lives only in the in-memory queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaJob {
    pub remote_message_id: i64,
    pub conversation_id: Uuid,
    pub author_id: Option<Uuid>,
    pub media: RemoteMedia,
    /// Conversation display name; first segment of the object name.
    pub naming_hint: String,
}

/// Read-side page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: crate::defaults::READ_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl PageRequest {
    /// One-based page number to limit/offset.
    pub fn page(page: i64, per_page: i64) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        Self {
            limit: per_page,
            offset: (page - 1) * per_page,
        }
    }
}

/// Read-side page of records with the unpaginated total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    /// Number of pages of size `per_page` needed for `total`.
    pub fn total_pages(&self, per_page: i64) -> i64 {
        if per_page <= 0 {
            return 0;
        }
        (self.total + per_page - 1) / per_page
    }
}
