//! Request and response bodies of the bridge HTTP API.

use serde::{Deserialize, Serialize};

use chatvault_core::{DialogCursor, InputPeer, InputUser, RemoteChat, RemoteMedia, RemoteUser};

/// Body of `POST /dialogs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogsRequest {
    pub offset_date: i64,
    pub offset_id: i64,
    pub offset_peer: InputPeer,
    pub limit: i32,
}

impl DialogsRequest {
    pub fn new(cursor: &DialogCursor, limit: i32) -> Self {
        Self {
            offset_date: cursor.offset_date,
            offset_id: cursor.offset_id,
            offset_peer: cursor.offset_peer,
            limit,
        }
    }
}

/// Body of `POST /history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryRequest {
    pub peer: InputPeer,
    pub offset_id: i64,
    pub limit: i32,
}

/// Body of `POST /users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersRequest {
    pub users: Vec<InputUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersResponse {
    #[serde(default)]
    pub users: Vec<RemoteUser>,
}

/// Body of `POST /chats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatsRequest {
    pub chat_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatsResponse {
    #[serde(default)]
    pub chats: Vec<RemoteChat>,
}

/// Body of `POST /media`. The response is the raw attachment bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRequest {
    pub media: RemoteMedia,
}

/// Error body returned by the bridge on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeErrorResponse {
    pub error: String,
}
