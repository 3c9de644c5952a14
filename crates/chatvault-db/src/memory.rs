//! In-memory repositories and object store.
//!
//! Same upsert semantics as the PostgreSQL implementations, without a
//! database. Used by pipeline tests and local dry runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use chatvault_core::{
    Conversation, ConversationRef, ConversationRepository, Error, ListMessagesRequest, Message,
    MessageRepository, NewMessage, ObjectStore, Page, PageRequest, Participant,
    ParticipantRepository, Result, UpsertOutcome, Upserted,
};

fn lock_poisoned<T>(_: T) -> Error {
    Error::Internal("in-memory store lock poisoned".to_string())
}

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> Vec<T> {
    items
        .iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .cloned()
        .collect()
}

/// In-memory conversation repository.
#[derive(Default)]
pub struct MemoryConversationRepository {
    rows: Mutex<Vec<Conversation>>,
}

impl MemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored conversation in insertion order.
    pub fn all(&self) -> Vec<Conversation> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn upsert(&self, remote: ConversationRef, title: &str) -> Result<Upserted<Conversation>> {
        let mut rows = self.rows.lock().map_err(lock_poisoned)?;
        let now = Utc::now();

        if let Some(existing) = rows.iter_mut().find(|c| c.remote == remote) {
            if existing.title == title {
                return Ok(Upserted::new(existing.clone(), UpsertOutcome::Unchanged));
            }
            existing.title = title.to_string();
            existing.updated_at = now;
            return Ok(Upserted::new(existing.clone(), UpsertOutcome::Updated));
        }

        let conversation = Conversation {
            id: Uuid::now_v7(),
            remote,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        rows.push(conversation.clone());
        Ok(Upserted::new(conversation, UpsertOutcome::Inserted))
    }

    async fn find_by_remote(&self, remote: ConversationRef) -> Result<Option<Conversation>> {
        let rows = self.rows.lock().map_err(lock_poisoned)?;
        Ok(rows.iter().find(|c| c.remote == remote).cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Conversation> {
        let rows = self.rows.lock().map_err(lock_poisoned)?;
        rows.iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("conversation {}", id)))
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Conversation>> {
        let rows = self.rows.lock().map_err(lock_poisoned)?;
        let newest_first: Vec<Conversation> = rows.iter().rev().cloned().collect();
        Ok(Page {
            items: paginate(&newest_first, page),
            total: rows.len() as i64,
        })
    }
}

/// In-memory participant repository.
#[derive(Default)]
pub struct MemoryParticipantRepository {
    rows: Mutex<HashMap<i64, Participant>>,
}

impl MemoryParticipantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ParticipantRepository for MemoryParticipantRepository {
    async fn find_by_remote(&self, remote_id: i64) -> Result<Option<Participant>> {
        let rows = self.rows.lock().map_err(lock_poisoned)?;
        Ok(rows.get(&remote_id).cloned())
    }

    async fn ensure(&self, remote_id: i64, display_name: &str) -> Result<Upserted<Participant>> {
        let mut rows = self.rows.lock().map_err(lock_poisoned)?;
        if let Some(existing) = rows.get(&remote_id) {
            return Ok(Upserted::new(existing.clone(), UpsertOutcome::Unchanged));
        }
        let now = Utc::now();
        let participant = Participant {
            id: Uuid::now_v7(),
            remote_id,
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
        };
        rows.insert(remote_id, participant.clone());
        Ok(Upserted::new(participant, UpsertOutcome::Inserted))
    }
}

/// In-memory message repository.
#[derive(Default)]
pub struct MemoryMessageRepository {
    rows: Mutex<HashMap<(i64, Uuid), Message>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored message, ordered by conversation then remote id.
    pub fn all(&self) -> Vec<Message> {
        let mut all: Vec<Message> = self
            .rows
            .lock()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by_key(|m| (m.conversation_id, m.remote_message_id));
        all
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn upsert(&self, message: NewMessage) -> Result<Upserted<Message>> {
        let mut rows = self.rows.lock().map_err(lock_poisoned)?;
        let key = (message.remote_message_id, message.conversation_id);
        if let Some(existing) = rows.get(&key) {
            return Ok(Upserted::new(existing.clone(), UpsertOutcome::Unchanged));
        }
        let now = Utc::now();
        let stored = Message {
            id: Uuid::now_v7(),
            remote_message_id: message.remote_message_id,
            conversation_id: message.conversation_id,
            author_id: message.author_id,
            content: message.content,
            kind: message.kind,
            media_locator: None,
            sent_at: message.sent_at,
            created_at: now,
            updated_at: now,
        };
        rows.insert(key, stored.clone());
        Ok(Upserted::new(stored, UpsertOutcome::Inserted))
    }

    async fn find(&self, remote_message_id: i64, conversation_id: Uuid) -> Result<Option<Message>> {
        let rows = self.rows.lock().map_err(lock_poisoned)?;
        Ok(rows.get(&(remote_message_id, conversation_id)).cloned())
    }

    async fn set_media_locator(
        &self,
        remote_message_id: i64,
        conversation_id: Uuid,
        locator: &str,
    ) -> Result<bool> {
        let mut rows = self.rows.lock().map_err(lock_poisoned)?;
        match rows.get_mut(&(remote_message_id, conversation_id)) {
            Some(message) => {
                message.media_locator = Some(locator.to_string());
                message.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, req: ListMessagesRequest) -> Result<Page<Message>> {
        let rows = self.rows.lock().map_err(lock_poisoned)?;
        let mut matching: Vec<Message> = rows
            .values()
            .filter(|m| m.conversation_id == req.conversation_id)
            .filter(|m| req.kind.map_or(true, |k| m.kind == k))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.remote_message_id.cmp(&a.remote_message_id));
        Ok(Page {
            items: paginate(&matching, req.page),
            total: matching.len() as i64,
        })
    }
}

/// Stored object with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// In-memory object store returning `mem://{bucket}/{name}` locators.
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("chatvault")
    }
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(name).cloned())
    }

    /// Stored object names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, name: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        crate::object_storage::validate_object_name(name)?;
        let mut objects = self.objects.lock().map_err(lock_poisoned)?;
        objects.insert(
            name.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("mem://{}/{}", self.bucket, name))
    }

    async fn presign_get(&self, name: &str, expiry: Duration) -> Result<String> {
        let objects = self.objects.lock().map_err(lock_poisoned)?;
        if !objects.contains_key(name) {
            return Err(Error::NotFound(format!("object {}", name)));
        }
        Ok(format!(
            "mem://{}/{}?expires_in={}",
            self.bucket,
            name,
            expiry.as_secs()
        ))
    }
}
