//! Backward walk over one conversation's history.

use std::sync::Arc;

use tracing::{debug, info_span, trace, warn, Instrument, Span};

use chatvault_core::{
    HistoryCursor, HistoryPage, InputPeer, MessagingService, RemoteMessage, RemoteUser, Result,
};

use crate::cancel::Cancellation;

/// One history page with the users that came with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryBatch {
    /// Messages in the order the service returned them.
    pub messages: Vec<RemoteMessage>,
    pub users: Vec<RemoteUser>,
}

/// Walks a conversation's messages from newest to oldest.
pub struct MessageHistoryPaginator {
    remote: Arc<dyn MessagingService>,
    limit: i32,
    span: Span,
}

impl MessageHistoryPaginator {
    pub fn new(remote: Arc<dyn MessagingService>, limit: i32, parent: &Span) -> Self {
        Self {
            remote,
            limit,
            span: info_span!(parent: parent, "paginator"),
        }
    }

    pub fn limit(&self) -> i32 {
        self.limit
    }

    /// Start a walk over `peer`'s history from the most recent message.
    pub fn pages(&self, peer: InputPeer) -> HistoryPages<'_> {
        HistoryPages {
            paginator: self,
            peer,
            cursor: HistoryCursor::start(),
            done: false,
            requested: 0,
        }
    }
}

/// In-progress walk over one conversation's history.
pub struct HistoryPages<'a> {
    paginator: &'a MessageHistoryPaginator,
    peer: InputPeer,
    cursor: HistoryCursor,
    done: bool,
    requested: usize,
}

impl HistoryPages<'_> {
    pub fn cursor(&self) -> HistoryCursor {
        self.cursor
    }

    /// History requests made so far.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Fetch the next older page. `Ok(None)` once history is exhausted.
    pub async fn next(&mut self, cancel: &Cancellation) -> Result<Option<HistoryBatch>> {
        if self.done {
            return Ok(None);
        }
        let span = self.paginator.span.clone();
        self.fetch(cancel).instrument(span).await
    }

    async fn fetch(&mut self, cancel: &Cancellation) -> Result<Option<HistoryBatch>> {
        let limit = self.paginator.limit;
        let offset_id = self.cursor.offset_id();
        self.requested += 1;
        trace!(offset_id, "Requesting history page");

        let page = match cancel
            .run(self.paginator.remote.message_history(&self.peer, offset_id, limit))
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        let shape = page.shape();
        let (messages, users, complete) = match page {
            HistoryPage::Messages { messages, users } => (messages, users, true),
            HistoryPage::Slice {
                messages, users, ..
            }
            | HistoryPage::Channel {
                messages, users, ..
            } => (messages, users, false),
            HistoryPage::NotModified { .. } | HistoryPage::Unrecognized => {
                warn!(
                    subsystem = "ingest",
                    component = "paginator",
                    op = "message_history",
                    shape,
                    offset_id,
                    "Unexpected history page, ending traversal"
                );
                self.done = true;
                return Ok(None);
            }
        };

        debug!(
            subsystem = "ingest",
            component = "paginator",
            op = "message_history",
            shape,
            offset_id,
            messages = messages.len(),
            "History page received"
        );

        if messages.is_empty() {
            self.done = true;
            return Ok(None);
        }

        // The cursor follows every page; only a request that would follow
        // needs it to have moved.
        let next = self
            .cursor
            .after_page(messages.iter().filter_map(RemoteMessage::id));
        if complete || messages.len() < limit as usize {
            self.cursor = next;
            self.done = true;
        } else if next.advanced_from(&self.cursor) {
            self.cursor = next;
        } else {
            warn!(
                subsystem = "ingest",
                component = "paginator",
                offset_id,
                "History cursor did not move backward, ending traversal"
            );
            self.done = true;
        }

        Ok(Some(HistoryBatch { messages, users }))
    }
}
