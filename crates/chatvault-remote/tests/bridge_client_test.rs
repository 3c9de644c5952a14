//! HTTP client tests against a mock bridge.

use chatvault_core::{
    DialogCursor, DialogsPage, Error, HistoryPage, InputPeer, InputUser, MessagingService,
    RemoteDialog, RemoteMedia, RemoteMessage, RemotePeer,
};
use chatvault_remote::{BridgeConfig, HttpMessagingClient};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, token: Option<&str>) -> HttpMessagingClient {
    HttpMessagingClient::new(BridgeConfig {
        base_url: server.uri(),
        token: token.map(str::to_string),
        timeout_seconds: 5,
    })
    .expect("Failed to create client")
}

#[tokio::test]
async fn test_current_user_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/self"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "access_hash": 99,
            "username": "me"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let me = client_for(&server, Some("secret"))
        .current_user()
        .await
        .unwrap();
    assert_eq!(me.id, 1);
    assert_eq!(me.username.as_deref(), Some("me"));
}

#[tokio::test]
async fn test_list_dialogs_posts_cursor_and_parses_slice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dialogs"))
        .and(body_json(json!({
            "offset_date": 0,
            "offset_id": 0,
            "offset_peer": {"type": "empty"},
            "limit": 100
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "slice",
            "count": 250,
            "dialogs": [
                {"type": "dialog", "peer": {"type": "user", "user_id": 2}, "top_message": 10, "last_activity": 1700000000},
                {"type": "folder", "folder_id": 1},
                {"type": "dialog_v2", "something": true}
            ],
            "users": [{"id": 2, "access_hash": 5, "username": "alice"}],
            "chats": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client_for(&server, None)
        .list_dialogs(&DialogCursor::start(), 100)
        .await
        .unwrap();

    let DialogsPage::Slice {
        count,
        dialogs,
        users,
        ..
    } = page
    else {
        panic!("expected slice page");
    };
    assert_eq!(count, 250);
    assert_eq!(users.len(), 1);
    assert!(matches!(
        dialogs[0],
        RemoteDialog::Dialog {
            peer: RemotePeer::User { user_id: 2 },
            top_message: 10,
            ..
        }
    ));
    assert_eq!(dialogs[1], RemoteDialog::Folder { folder_id: 1 });
    assert_eq!(dialogs[2], RemoteDialog::Unrecognized);
}

#[tokio::test]
async fn test_message_history_parses_unknown_shapes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/history"))
        .and(body_json(json!({
            "peer": {"type": "channel", "channel_id": 7, "access_hash": 3},
            "offset_id": 42,
            "limit": 50
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "channel",
            "count": 2,
            "messages": [
                {
                    "type": "message", "id": 41,
                    "from": {"type": "user", "user_id": 9},
                    "peer": {"type": "channel", "channel_id": 7},
                    "date": 1700000000, "text": "hello",
                    "media": {"type": "geo_point", "lat": 1.0}
                },
                {"type": "service", "id": 40}
            ],
            "users": []
        })))
        .mount(&server)
        .await;

    let peer = InputPeer::Channel {
        channel_id: 7,
        access_hash: 3,
    };
    let page = client_for(&server, None)
        .message_history(&peer, 42, 50)
        .await
        .unwrap();

    let HistoryPage::Channel { messages, .. } = page else {
        panic!("expected channel page");
    };
    let RemoteMessage::Message(body) = &messages[0] else {
        panic!("expected message");
    };
    assert_eq!(body.from, Some(RemotePeer::User { user_id: 9 }));
    assert_eq!(body.media, Some(RemoteMedia::Unsupported));
    assert_eq!(messages[1], RemoteMessage::Service { id: 40 });
}

#[tokio::test]
async fn test_unauthorized_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/self"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "AUTH_KEY_UNREGISTERED"})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server, None).current_user().await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(ref m) if m == "AUTH_KEY_UNREGISTERED"));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dialogs"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "12")
                .set_body_json(json!({"error": "FLOOD_WAIT_12"})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server, None)
        .list_dialogs(&DialogCursor::start(), 100)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::RateLimited {
            retry_after_secs: Some(12)
        }
    ));
}

#[tokio::test]
async fn test_server_error_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/history"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server, None)
        .message_history(&InputPeer::Chat { chat_id: 1 }, 0, 50)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Request(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_get_users_and_chats() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_json(json!({"users": [{"user_id": 5, "access_hash": 8}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{"id": 5, "first_name": "Bob", "last_name": "Stone"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chats"))
        .and(body_json(json!({"chat_ids": [7]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chats": [{"id": 7, "title": "Team"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let users = client
        .get_users(&[InputUser {
            user_id: 5,
            access_hash: 8,
        }])
        .await
        .unwrap();
    assert_eq!(users[0].display_name().as_deref(), Some("Bob Stone"));

    let chats = client.get_chats(&[7]).await.unwrap();
    assert_eq!(chats[0].title.as_deref(), Some("Team"));

    // Empty lookups never hit the bridge.
    assert!(client.get_chats(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_media_returns_raw_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = client_for(&server, None)
        .download_media(&RemoteMedia::Photo {
            id: 1,
            access_hash: 2,
            file_reference: vec![3],
        })
        .await
        .unwrap();
    assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF, 0xE0]);
}
