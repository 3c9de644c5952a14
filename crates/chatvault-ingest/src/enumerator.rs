//! Conversation listing, page by page.

use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument, Span};

use chatvault_core::{
    DialogCursor, DialogsPage, MessagingService, RemoteChat, RemoteDialog, RemoteUser, Result,
};

use crate::cancel::Cancellation;

/// One page of the conversation listing with the records that came with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogBatch {
    pub dialogs: Vec<RemoteDialog>,
    pub users: Vec<RemoteUser>,
    pub chats: Vec<RemoteChat>,
}

/// Walks every conversation visible to the account.
pub struct ConversationEnumerator {
    remote: Arc<dyn MessagingService>,
    limit: i32,
    span: Span,
}

impl ConversationEnumerator {
    pub fn new(remote: Arc<dyn MessagingService>, limit: i32, parent: &Span) -> Self {
        Self {
            remote,
            limit,
            span: info_span!(parent: parent, "enumerator"),
        }
    }

    pub fn limit(&self) -> i32 {
        self.limit
    }

    /// Start a fresh walk from the top of the listing.
    pub fn pages(&self) -> DialogPages<'_> {
        DialogPages {
            enumerator: self,
            cursor: DialogCursor::start(),
            done: false,
            requested: 0,
        }
    }
}

/// In-progress walk over the conversation listing.
pub struct DialogPages<'a> {
    enumerator: &'a ConversationEnumerator,
    cursor: DialogCursor,
    done: bool,
    requested: usize,
}

impl DialogPages<'_> {
    pub fn cursor(&self) -> DialogCursor {
        self.cursor
    }

    /// Listing requests made so far.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Fetch the next page. `Ok(None)` once the listing is exhausted.
    pub async fn next(&mut self, cancel: &Cancellation) -> Result<Option<DialogBatch>> {
        if self.done {
            return Ok(None);
        }
        let span = self.enumerator.span.clone();
        self.fetch(cancel).instrument(span).await
    }

    async fn fetch(&mut self, cancel: &Cancellation) -> Result<Option<DialogBatch>> {
        let limit = self.enumerator.limit;
        self.requested += 1;
        let page = match cancel
            .run(self.enumerator.remote.list_dialogs(&self.cursor, limit))
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        match page {
            DialogsPage::Dialogs {
                dialogs,
                users,
                chats,
            } => {
                debug!(
                    subsystem = "ingest",
                    component = "enumerator",
                    op = "list_dialogs",
                    shape = "dialogs",
                    dialogs = dialogs.len(),
                    "Complete listing received"
                );
                self.done = true;
                if dialogs.is_empty() {
                    return Ok(None);
                }
                Ok(Some(DialogBatch {
                    dialogs,
                    users,
                    chats,
                }))
            }
            DialogsPage::Slice {
                count,
                dialogs,
                users,
                chats,
            } => {
                debug!(
                    subsystem = "ingest",
                    component = "enumerator",
                    op = "list_dialogs",
                    shape = "slice",
                    count,
                    dialogs = dialogs.len(),
                    "Listing slice received"
                );
                if dialogs.is_empty() {
                    self.done = true;
                    return Ok(None);
                }
                if dialogs.len() < limit as usize {
                    self.done = true;
                } else {
                    self.advance(&dialogs, &users, &chats);
                }
                Ok(Some(DialogBatch {
                    dialogs,
                    users,
                    chats,
                }))
            }
            other => {
                warn!(
                    subsystem = "ingest",
                    component = "enumerator",
                    op = "list_dialogs",
                    shape = other.shape(),
                    "Unexpected listing page, ending enumeration"
                );
                self.done = true;
                Ok(None)
            }
        }
    }

    /// Move the cursor past the last conversation of a full page.
    fn advance(&mut self, dialogs: &[RemoteDialog], users: &[RemoteUser], chats: &[RemoteChat]) {
        let next = dialogs
            .last()
            .and_then(|last| DialogCursor::after(last, users, chats));
        match next {
            Some(cursor) if cursor != self.cursor => self.cursor = cursor,
            _ => {
                warn!(
                    subsystem = "ingest",
                    component = "enumerator",
                    offset_id = self.cursor.offset_id,
                    "Listing cursor cannot advance, ending enumeration"
                );
                self.done = true;
            }
        }
    }
}
