//! Scripted messaging service for deterministic testing.
//!
//! Pages are keyed by the cursor that requests them, so a scripted account
//! answers the same way on every rescan, just like the real service would
//! for an unchanged account.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatvault_remote::mock::MockMessenger;
//!
//! let remote = MockMessenger::new(me)
//!     .with_dialog_pages(vec![page1, page2])
//!     .with_history_pages(alice_peer, vec![newest, older])
//!     .with_media(500, b"\xff\xd8\xff".to_vec());
//!
//! let page = remote.list_dialogs(&DialogCursor::start(), 100).await?;
//! assert_eq!(remote.call_count("list_dialogs"), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use chatvault_core::{
    DialogCursor, DialogsPage, Error, HistoryCursor, HistoryPage, InputPeer, InputUser,
    MessagingService, RemoteChat, RemoteDialog, RemoteMedia, RemoteMessage, RemoteUser, Result,
};

/// Operation names recorded in the call log.
pub mod ops {
    pub const CURRENT_USER: &str = "current_user";
    pub const LIST_DIALOGS: &str = "list_dialogs";
    pub const MESSAGE_HISTORY: &str = "message_history";
    pub const GET_USERS: &str = "get_users";
    pub const GET_CHATS: &str = "get_chats";
    pub const DOWNLOAD_MEDIA: &str = "download_media";
}

/// Failure a scripted call answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    Unauthorized,
    RateLimited,
    Remote(String),
    Request(String),
}

impl MockFailure {
    fn to_error(&self) -> Error {
        match self {
            MockFailure::Unauthorized => Error::Unauthorized("AUTH_KEY_UNREGISTERED".into()),
            MockFailure::RateLimited => Error::RateLimited {
                retry_after_secs: Some(1),
            },
            MockFailure::Remote(msg) => Error::Remote(msg.clone()),
            MockFailure::Request(msg) => Error::Request(msg.clone()),
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: &'static str,
    /// Peer of history calls.
    pub peer: Option<InputPeer>,
    /// Offset of history calls.
    pub offset_id: Option<i64>,
}

impl MockCall {
    fn op(operation: &'static str) -> Self {
        Self {
            operation,
            peer: None,
            offset_id: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MockConfig {
    self_user: Option<RemoteUser>,
    dialog_pages: Vec<(DialogCursor, DialogsPage)>,
    history_pages: HashMap<(InputPeer, i64), HistoryPage>,
    users: Vec<RemoteUser>,
    chats: Vec<RemoteChat>,
    media: HashMap<i64, Vec<u8>>,
    download_delay: Option<Duration>,
    failures: HashMap<&'static str, MockFailure>,
    history_failures: HashMap<InputPeer, MockFailure>,
}

/// Scripted [`MessagingService`].
#[derive(Clone)]
pub struct MockMessenger {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockMessenger {
    /// Create a mock whose session belongs to `self_user`.
    pub fn new(self_user: RemoteUser) -> Self {
        Self {
            config: Arc::new(MockConfig {
                self_user: Some(self_user),
                ..Default::default()
            }),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn config_mut(&mut self) -> &mut MockConfig {
        Arc::make_mut(&mut self.config)
    }

    /// Serve `page` to the listing call made with `cursor`.
    pub fn with_dialog_page_at(mut self, cursor: DialogCursor, page: DialogsPage) -> Self {
        let pages = &mut self.config_mut().dialog_pages;
        pages.retain(|(c, _)| *c != cursor);
        pages.push((cursor, page));
        self
    }

    /// Serve `pages` in order, each keyed by the cursor computed from the
    /// last conversation of the page before it.
    ///
    /// A page that follows one without a continuable last conversation is
    /// unreachable and is dropped.
    pub fn with_dialog_pages(mut self, pages: Vec<DialogsPage>) -> Self {
        let mut cursor = Some(DialogCursor::start());
        for page in pages {
            let next = match &page {
                DialogsPage::Dialogs {
                    dialogs,
                    users,
                    chats,
                }
                | DialogsPage::Slice {
                    dialogs,
                    users,
                    chats,
                    ..
                } => dialogs
                    .last()
                    .and_then(|last| DialogCursor::after(last, users, chats)),
                _ => None,
            };
            if let Some(at) = cursor {
                self = self.with_dialog_page_at(at, page);
            }
            cursor = next;
        }
        self
    }

    /// Serve `page` to the history call for `peer` at `offset_id`.
    pub fn with_history_page_at(mut self, peer: InputPeer, offset_id: i64, page: HistoryPage) -> Self {
        self.config_mut()
            .history_pages
            .insert((peer, offset_id), page);
        self
    }

    /// Serve `pages` for `peer` newest first, each keyed by the smallest
    /// message id of the page before it.
    pub fn with_history_pages(mut self, peer: InputPeer, pages: Vec<HistoryPage>) -> Self {
        let mut cursor = HistoryCursor::start();
        for page in pages {
            let ids: Vec<i64> = page_messages(&page)
                .iter()
                .filter_map(RemoteMessage::id)
                .collect();
            self = self.with_history_page_at(peer, cursor.offset_id(), page);
            cursor = cursor.after_page(ids);
        }
        self
    }

    /// Users answered by explicit lookups.
    pub fn with_users(mut self, users: Vec<RemoteUser>) -> Self {
        self.config_mut().users.extend(users);
        self
    }

    /// Groups and channels answered by explicit lookups.
    pub fn with_chats(mut self, chats: Vec<RemoteChat>) -> Self {
        self.config_mut().chats.extend(chats);
        self
    }

    /// Bytes served for the photo or document with `media_id`.
    pub fn with_media(mut self, media_id: i64, data: Vec<u8>) -> Self {
        self.config_mut().media.insert(media_id, data);
        self
    }

    /// Delay every download by `delay`.
    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.config_mut().download_delay = Some(delay);
        self
    }

    /// Fail every call to `operation`.
    pub fn fail_on(mut self, operation: &'static str, failure: MockFailure) -> Self {
        self.config_mut().failures.insert(operation, failure);
        self
    }

    /// Fail history calls for one peer only.
    pub fn fail_history_for(mut self, peer: InputPeer, failure: MockFailure) -> Self {
        self.config_mut().history_failures.insert(peer, failure);
        self
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of calls made to `operation`.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Offsets of the history calls made for `peer`, in order.
    pub fn history_offsets(&self, peer: &InputPeer) -> Vec<i64> {
        self.calls()
            .iter()
            .filter(|c| c.operation == ops::MESSAGE_HISTORY && c.peer.as_ref() == Some(peer))
            .filter_map(|c| c.offset_id)
            .collect()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut log) = self.call_log.lock() {
            log.clear();
        }
    }

    fn record(&self, call: MockCall) -> Result<()> {
        let operation = call.operation;
        if let Ok(mut log) = self.call_log.lock() {
            log.push(call);
        }
        match self.config.failures.get(operation) {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

fn page_messages(page: &HistoryPage) -> &[RemoteMessage] {
    match page {
        HistoryPage::Messages { messages, .. }
        | HistoryPage::Slice { messages, .. }
        | HistoryPage::Channel { messages, .. } => messages,
        HistoryPage::NotModified { .. } | HistoryPage::Unrecognized => &[],
    }
}

#[async_trait]
impl MessagingService for MockMessenger {
    async fn current_user(&self) -> Result<RemoteUser> {
        self.record(MockCall::op(ops::CURRENT_USER))?;
        self.config
            .self_user
            .clone()
            .ok_or_else(|| Error::Unauthorized("no session".into()))
    }

    async fn list_dialogs(&self, cursor: &DialogCursor, _limit: i32) -> Result<DialogsPage> {
        self.record(MockCall::op(ops::LIST_DIALOGS))?;
        Ok(self
            .config
            .dialog_pages
            .iter()
            .find(|(c, _)| c == cursor)
            .map(|(_, page)| page.clone())
            .unwrap_or(DialogsPage::Dialogs {
                dialogs: Vec::<RemoteDialog>::new(),
                users: Vec::new(),
                chats: Vec::new(),
            }))
    }

    async fn message_history(
        &self,
        peer: &InputPeer,
        offset_id: i64,
        _limit: i32,
    ) -> Result<HistoryPage> {
        self.record(MockCall {
            operation: ops::MESSAGE_HISTORY,
            peer: Some(*peer),
            offset_id: Some(offset_id),
        })?;
        if let Some(failure) = self.config.history_failures.get(peer) {
            return Err(failure.to_error());
        }
        Ok(self
            .config
            .history_pages
            .get(&(*peer, offset_id))
            .cloned()
            .unwrap_or(HistoryPage::Messages {
                messages: Vec::new(),
                users: Vec::new(),
            }))
    }

    async fn get_users(&self, users: &[InputUser]) -> Result<Vec<RemoteUser>> {
        self.record(MockCall::op(ops::GET_USERS))?;
        Ok(self
            .config
            .users
            .iter()
            .filter(|u| users.iter().any(|req| req.user_id == u.id))
            .cloned()
            .collect())
    }

    async fn get_chats(&self, chat_ids: &[i64]) -> Result<Vec<RemoteChat>> {
        self.record(MockCall::op(ops::GET_CHATS))?;
        Ok(self
            .config
            .chats
            .iter()
            .filter(|c| chat_ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn download_media(&self, media: &RemoteMedia) -> Result<Vec<u8>> {
        self.record(MockCall::op(ops::DOWNLOAD_MEDIA))?;
        if let Some(delay) = self.config.download_delay {
            tokio::time::sleep(delay).await;
        }
        let id = match media {
            RemoteMedia::Photo { id, .. } | RemoteMedia::Document { id, .. } => *id,
            RemoteMedia::Unsupported => {
                return Err(Error::Classification(
                    "cannot download unsupported media".into(),
                ))
            }
        };
        self.config
            .media
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Remote(format!("FILE_ID_INVALID: {}", id)))
    }
}
