//! Response shapes of the remote messaging service.
//!
//! The service answers with a closed set of tagged shapes. Each one is an
//! enum with an explicit `Unrecognized` arm so that a shape this build does
//! not know about deserializes cleanly and can be logged and skipped at the
//! boundary that consumes it.

use serde::{Deserialize, Serialize};

use crate::models::PeerKind;

/// A peer as referenced inside dialogs and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemotePeer {
    User { user_id: i64 },
    Chat { chat_id: i64 },
    Channel { channel_id: i64 },
    #[serde(other)]
    Unrecognized,
}

impl RemotePeer {
    /// Local peer kind, `None` for unrecognized peers.
    pub fn kind(&self) -> Option<PeerKind> {
        match self {
            RemotePeer::User { .. } => Some(PeerKind::User),
            RemotePeer::Chat { .. } => Some(PeerKind::Chat),
            RemotePeer::Channel { .. } => Some(PeerKind::Channel),
            RemotePeer::Unrecognized => None,
        }
    }

    /// Remote numeric id, `None` for unrecognized peers.
    pub fn remote_id(&self) -> Option<i64> {
        match *self {
            RemotePeer::User { user_id } => Some(user_id),
            RemotePeer::Chat { chat_id } => Some(chat_id),
            RemotePeer::Channel { channel_id } => Some(channel_id),
            RemotePeer::Unrecognized => None,
        }
    }
}

/// Canonical peer reference accepted by history and listing calls.
///
/// Users and channels must carry the access hash the service issued for
/// this account; plain group chats are addressed by id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputPeer {
    #[default]
    Empty,
    User {
        user_id: i64,
        access_hash: i64,
    },
    Chat {
        chat_id: i64,
    },
    Channel {
        channel_id: i64,
        access_hash: i64,
    },
}

impl InputPeer {
    /// Build the canonical reference for `peer`, taking access hashes from the
    /// batch that accompanied it. Missing hashes default to zero.
    pub fn resolve(peer: &RemotePeer, users: &[RemoteUser], chats: &[RemoteChat]) -> Self {
        match *peer {
            RemotePeer::User { user_id } => InputPeer::User {
                user_id,
                access_hash: find_user(users, user_id)
                    .map(|u| u.access_hash)
                    .unwrap_or_default(),
            },
            RemotePeer::Chat { chat_id } => InputPeer::Chat { chat_id },
            RemotePeer::Channel { channel_id } => InputPeer::Channel {
                channel_id,
                access_hash: find_chat(chats, channel_id)
                    .and_then(|c| c.access_hash)
                    .unwrap_or_default(),
            },
            RemotePeer::Unrecognized => InputPeer::Empty,
        }
    }
}

/// Reference used for explicit participant lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputUser {
    pub user_id: i64,
    #[serde(default)]
    pub access_hash: i64,
}

/// A user record returned alongside dialogs and history pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: i64,
    #[serde(default)]
    pub access_hash: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl RemoteUser {
    /// Best available human name: username, then first/last name.
    pub fn display_name(&self) -> Option<String> {
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return Some(username.to_string());
        }
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!full.is_empty()).then_some(full)
    }
}

/// A group or channel record returned alongside dialogs and history pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub access_hash: Option<i64>,
}

/// Find a user in a batch by id.
pub fn find_user(users: &[RemoteUser], id: i64) -> Option<&RemoteUser> {
    users.iter().find(|u| u.id == id)
}

/// Find a chat in a batch by id.
pub fn find_chat(chats: &[RemoteChat], id: i64) -> Option<&RemoteChat> {
    chats.iter().find(|c| c.id == id)
}

/// One entry of the conversation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteDialog {
    Dialog {
        peer: RemotePeer,
        /// Id of the newest message in the conversation.
        top_message: i64,
        /// Unix timestamp of the newest message.
        #[serde(default)]
        last_activity: i64,
    },
    Folder {
        folder_id: i32,
    },
    #[serde(other)]
    Unrecognized,
}

impl RemoteDialog {
    /// Short shape name for logging.
    pub fn shape(&self) -> &'static str {
        match self {
            RemoteDialog::Dialog { .. } => "dialog",
            RemoteDialog::Folder { .. } => "folder",
            RemoteDialog::Unrecognized => "unrecognized",
        }
    }
}

/// One page of the conversation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogsPage {
    /// The whole listing fit in one response.
    Dialogs {
        #[serde(default)]
        dialogs: Vec<RemoteDialog>,
        #[serde(default)]
        users: Vec<RemoteUser>,
        #[serde(default)]
        chats: Vec<RemoteChat>,
    },
    /// A partial listing; `count` is the server-side total.
    Slice {
        count: i64,
        #[serde(default)]
        dialogs: Vec<RemoteDialog>,
        #[serde(default)]
        users: Vec<RemoteUser>,
        #[serde(default)]
        chats: Vec<RemoteChat>,
    },
    NotModified {
        count: i64,
    },
    #[serde(other)]
    Unrecognized,
}

impl DialogsPage {
    /// Short shape name for logging.
    pub fn shape(&self) -> &'static str {
        match self {
            DialogsPage::Dialogs { .. } => "dialogs",
            DialogsPage::Slice { .. } => "slice",
            DialogsPage::NotModified { .. } => "not_modified",
            DialogsPage::Unrecognized => "unrecognized",
        }
    }
}

/// Media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteMedia {
    Photo {
        id: i64,
        #[serde(default)]
        access_hash: i64,
        #[serde(default, with = "base64_bytes")]
        file_reference: Vec<u8>,
    },
    Document {
        id: i64,
        #[serde(default)]
        access_hash: i64,
        #[serde(default, with = "base64_bytes")]
        file_reference: Vec<u8>,
        #[serde(default)]
        mime_type: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

impl RemoteMedia {
    /// Short shape name for logging.
    pub fn shape(&self) -> &'static str {
        match self {
            RemoteMedia::Photo { .. } => "photo",
            RemoteMedia::Document { .. } => "document",
            RemoteMedia::Unsupported => "unsupported",
        }
    }
}

/// Payload of a regular message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessageBody {
    pub id: i64,
    /// Explicit author. Often absent for one-to-one conversations.
    #[serde(default)]
    pub from: Option<RemotePeer>,
    pub peer: RemotePeer,
    /// Sent by the account owner.
    #[serde(default)]
    pub out: bool,
    /// Unix timestamp.
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media: Option<RemoteMedia>,
}

/// One entry of a history page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteMessage {
    Message(RemoteMessageBody),
    Service {
        id: i64,
    },
    Empty {
        id: i64,
    },
    #[serde(other)]
    Unrecognized,
}

impl RemoteMessage {
    /// Remote id, if the shape carries one.
    pub fn id(&self) -> Option<i64> {
        match self {
            RemoteMessage::Message(body) => Some(body.id),
            RemoteMessage::Service { id } | RemoteMessage::Empty { id } => Some(*id),
            RemoteMessage::Unrecognized => None,
        }
    }

    /// Short shape name for logging.
    pub fn shape(&self) -> &'static str {
        match self {
            RemoteMessage::Message(_) => "message",
            RemoteMessage::Service { .. } => "service",
            RemoteMessage::Empty { .. } => "empty",
            RemoteMessage::Unrecognized => "unrecognized",
        }
    }
}

/// One page of a conversation's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryPage {
    /// The whole remaining history fit in one response.
    Messages {
        #[serde(default)]
        messages: Vec<RemoteMessage>,
        #[serde(default)]
        users: Vec<RemoteUser>,
    },
    Slice {
        count: i64,
        #[serde(default)]
        messages: Vec<RemoteMessage>,
        #[serde(default)]
        users: Vec<RemoteUser>,
    },
    Channel {
        count: i64,
        #[serde(default)]
        messages: Vec<RemoteMessage>,
        #[serde(default)]
        users: Vec<RemoteUser>,
    },
    NotModified {
        count: i64,
    },
    #[serde(other)]
    Unrecognized,
}

impl HistoryPage {
    /// Short shape name for logging.
    pub fn shape(&self) -> &'static str {
        match self {
            HistoryPage::Messages { .. } => "messages",
            HistoryPage::Slice { .. } => "slice",
            HistoryPage::Channel { .. } => "channel",
            HistoryPage::NotModified { .. } => "not_modified",
            HistoryPage::Unrecognized => "unrecognized",
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_peer_type_is_unrecognized() {
        let peer: RemotePeer = serde_json::from_value(json!({"type": "encrypted"})).unwrap();
        assert_eq!(peer, RemotePeer::Unrecognized);
        assert!(peer.kind().is_none());
        assert!(peer.remote_id().is_none());
    }

    #[test]
    fn test_dialogs_slice_deserializes() {
        let page: DialogsPage = serde_json::from_value(json!({
            "type": "slice",
            "count": 250,
            "dialogs": [
                {"type": "dialog", "peer": {"type": "user", "user_id": 7}, "top_message": 99, "last_activity": 1700000000},
                {"type": "folder", "folder_id": 1}
            ],
            "users": [{"id": 7, "access_hash": 123, "username": "alice"}]
        }))
        .unwrap();

        match page {
            DialogsPage::Slice {
                count,
                dialogs,
                users,
                chats,
            } => {
                assert_eq!(count, 250);
                assert_eq!(dialogs.len(), 2);
                assert_eq!(dialogs[1].shape(), "folder");
                assert_eq!(users[0].access_hash, 123);
                assert!(chats.is_empty());
            }
            other => panic!("unexpected shape {}", other.shape()),
        }
    }

    #[test]
    fn test_unknown_page_shape_is_unrecognized() {
        let page: HistoryPage = serde_json::from_value(json!({"type": "feed"})).unwrap();
        assert_eq!(page, HistoryPage::Unrecognized);
    }

    #[test]
    fn test_message_body_with_photo() {
        let msg: RemoteMessage = serde_json::from_value(json!({
            "type": "message",
            "id": 10,
            "from": {"type": "user", "user_id": 5},
            "peer": {"type": "user", "user_id": 5},
            "text": "look",
            "media": {"type": "photo", "id": 1, "access_hash": 2, "file_reference": "AQID"}
        }))
        .unwrap();

        let RemoteMessage::Message(body) = msg else {
            panic!("expected message body");
        };
        assert_eq!(body.id, 10);
        assert!(!body.out);
        match body.media {
            Some(RemoteMedia::Photo { file_reference, .. }) => {
                assert_eq!(file_reference, vec![1, 2, 3])
            }
            other => panic!("unexpected media {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_media_kind() {
        let media: RemoteMedia = serde_json::from_value(json!({"type": "geo"})).unwrap();
        assert_eq!(media, RemoteMedia::Unsupported);
    }

    #[test]
    fn test_service_message_keeps_id() {
        let msg: RemoteMessage =
            serde_json::from_value(json!({"type": "service", "id": 4})).unwrap();
        assert_eq!(msg.id(), Some(4));
        assert_eq!(RemoteMessage::Unrecognized.id(), None);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = RemoteUser {
            id: 1,
            access_hash: 0,
            username: Some("bob".into()),
            first_name: Some("Robert".into()),
            last_name: None,
        };
        assert_eq!(user.display_name().as_deref(), Some("bob"));

        user.username = Some(String::new());
        assert_eq!(user.display_name().as_deref(), Some("Robert"));

        user.last_name = Some("Paulson".into());
        assert_eq!(user.display_name().as_deref(), Some("Robert Paulson"));

        user.first_name = None;
        user.last_name = None;
        assert!(user.display_name().is_none());
    }

    #[test]
    fn test_input_peer_takes_hash_from_batch() {
        let users = vec![RemoteUser {
            id: 9,
            access_hash: 777,
            username: None,
            first_name: None,
            last_name: None,
        }];
        let chats = vec![RemoteChat {
            id: 3,
            title: Some("news".into()),
            access_hash: Some(555),
        }];

        assert_eq!(
            InputPeer::resolve(&RemotePeer::User { user_id: 9 }, &users, &chats),
            InputPeer::User {
                user_id: 9,
                access_hash: 777
            }
        );
        assert_eq!(
            InputPeer::resolve(&RemotePeer::Channel { channel_id: 3 }, &users, &chats),
            InputPeer::Channel {
                channel_id: 3,
                access_hash: 555
            }
        );
        assert_eq!(
            InputPeer::resolve(&RemotePeer::User { user_id: 10 }, &users, &chats),
            InputPeer::User {
                user_id: 10,
                access_hash: 0
            }
        );
        assert_eq!(
            InputPeer::resolve(&RemotePeer::Unrecognized, &users, &chats),
            InputPeer::Empty
        );
    }
}
