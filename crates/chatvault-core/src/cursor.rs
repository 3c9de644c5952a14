//! Pagination cursors for the conversation listing and message history.
//!
//! Both cursors are immutable values: advancing returns a new cursor. They
//! live only for the duration of one enumeration.

use crate::remote::{InputPeer, RemoteChat, RemoteDialog, RemoteUser};

/// Position in the conversation listing.
///
/// The listing is keyed by the last conversation seen: its last-activity
/// timestamp, its newest message id and its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DialogCursor {
    pub offset_date: i64,
    pub offset_id: i64,
    pub offset_peer: InputPeer,
}

impl DialogCursor {
    /// Cursor for the first page.
    pub fn start() -> Self {
        Self::default()
    }

    pub fn is_start(&self) -> bool {
        *self == Self::start()
    }

    /// Cursor positioned after `last`, the final conversation of a full page.
    ///
    /// Returns `None` when `last` carries no identity to continue from.
    pub fn after(last: &RemoteDialog, users: &[RemoteUser], chats: &[RemoteChat]) -> Option<Self> {
        match last {
            RemoteDialog::Dialog {
                peer,
                top_message,
                last_activity,
            } => {
                let offset_peer = InputPeer::resolve(peer, users, chats);
                if offset_peer == InputPeer::Empty {
                    return None;
                }
                Some(Self {
                    offset_date: *last_activity,
                    offset_id: *top_message,
                    offset_peer,
                })
            }
            RemoteDialog::Folder { .. } | RemoteDialog::Unrecognized => None,
        }
    }
}

/// Position in a conversation's history, walking from newest to oldest.
///
/// `offset_id == 0` means "most recent"; otherwise it is the smallest
/// message id seen so far and the next page starts just below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryCursor {
    offset_id: i64,
}

impl HistoryCursor {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn offset_id(&self) -> i64 {
        self.offset_id
    }

    /// Fold one observed message id into the cursor.
    ///
    /// Keeps the running minimum, so out-of-order items within a page never
    /// move the cursor forward.
    pub fn observe(self, id: i64) -> Self {
        if id <= 0 {
            return self;
        }
        if self.offset_id == 0 || id < self.offset_id {
            Self { offset_id: id }
        } else {
            self
        }
    }

    /// Fold every id of a page into the cursor.
    pub fn after_page(self, ids: impl IntoIterator<Item = i64>) -> Self {
        ids.into_iter().fold(self, HistoryCursor::observe)
    }

    /// Whether `self` is strictly older than `previous`.
    pub fn advanced_from(&self, previous: &HistoryCursor) -> bool {
        self.offset_id != 0 && (previous.offset_id == 0 || self.offset_id < previous.offset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemotePeer;

    #[test]
    fn test_history_cursor_tracks_minimum_of_unsorted_page() {
        let cursor = HistoryCursor::start().after_page([120, 95, 130, 101]);
        assert_eq!(cursor.offset_id(), 95);
    }

    #[test]
    fn test_history_cursor_never_moves_forward() {
        let cursor = HistoryCursor::start().after_page([50, 40]);
        let next = cursor.after_page([45, 60]);
        assert_eq!(next.offset_id(), 40);
        assert!(!next.advanced_from(&cursor));

        let older = cursor.after_page([39, 12]);
        assert_eq!(older.offset_id(), 12);
        assert!(older.advanced_from(&cursor));
    }

    #[test]
    fn test_history_cursor_ignores_non_positive_ids() {
        let cursor = HistoryCursor::start().after_page([0, -3]);
        assert_eq!(cursor, HistoryCursor::start());
        assert!(!cursor.advanced_from(&HistoryCursor::start()));
    }

    #[test]
    fn test_first_page_counts_as_advance() {
        let cursor = HistoryCursor::start().after_page([10]);
        assert!(cursor.advanced_from(&HistoryCursor::start()));
    }

    #[test]
    fn test_dialog_cursor_after_last_dialog() {
        let users = vec![RemoteUser {
            id: 8,
            access_hash: 99,
            username: None,
            first_name: None,
            last_name: None,
        }];
        let last = RemoteDialog::Dialog {
            peer: RemotePeer::User { user_id: 8 },
            top_message: 321,
            last_activity: 1_700_000_000,
        };

        let cursor = DialogCursor::after(&last, &users, &[]).unwrap();
        assert_eq!(cursor.offset_date, 1_700_000_000);
        assert_eq!(cursor.offset_id, 321);
        assert_eq!(
            cursor.offset_peer,
            InputPeer::User {
                user_id: 8,
                access_hash: 99
            }
        );
        assert!(!cursor.is_start());
    }

    #[test]
    fn test_dialog_cursor_cannot_continue_from_folder() {
        assert!(DialogCursor::after(&RemoteDialog::Folder { folder_id: 1 }, &[], &[]).is_none());
        assert!(DialogCursor::after(&RemoteDialog::Unrecognized, &[], &[]).is_none());
        let unknown_peer = RemoteDialog::Dialog {
            peer: RemotePeer::Unrecognized,
            top_message: 1,
            last_activity: 1,
        };
        assert!(DialogCursor::after(&unknown_peer, &[], &[]).is_none());
    }
}
