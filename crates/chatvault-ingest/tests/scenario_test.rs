//! End-to-end rescans against a scripted account and in-memory storage.

use std::sync::Arc;
use std::time::Duration;

use tracing::Span;

use chatvault_core::{
    DialogsPage, Error, HistoryPage, InputPeer, MessageRepository, ParticipantRepository,
    RemoteDialog, RemoteMedia, RemoteMessage, RemoteMessageBody, RemotePeer, RemoteUser,
};
use chatvault_db::{
    MemoryConversationRepository, MemoryMessageRepository, MemoryObjectStore,
    MemoryParticipantRepository,
};
use chatvault_ingest::{Cancellation, Collaborators, IngestConfig, IngestionDriver, RescanStats};
use chatvault_jobs::{MediaIngestHandler, MediaIngestionPool, MediaPoolConfig, WorkerEvent};
use chatvault_remote::mock::ops;
use chatvault_remote::{MockFailure, MockMessenger};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

fn user(id: i64, username: &str) -> RemoteUser {
    RemoteUser {
        id,
        access_hash: id * 100,
        username: Some(username.to_string()),
        first_name: None,
        last_name: None,
    }
}

fn me() -> RemoteUser {
    user(1, "me")
}

fn alice() -> RemoteUser {
    user(2, "alice")
}

fn bob() -> RemoteUser {
    user(3, "bob")
}

fn peer_of(u: &RemoteUser) -> InputPeer {
    InputPeer::User {
        user_id: u.id,
        access_hash: u.access_hash,
    }
}

fn dialog(user_id: i64, top_message: i64) -> RemoteDialog {
    RemoteDialog::Dialog {
        peer: RemotePeer::User { user_id },
        top_message,
        last_activity: 1_700_000_000 + top_message,
    }
}

fn listing(dialogs: Vec<RemoteDialog>, users: Vec<RemoteUser>) -> DialogsPage {
    DialogsPage::Slice {
        count: dialogs.len() as i64,
        dialogs,
        users,
        chats: vec![],
    }
}

fn text(id: i64, conversation_user: i64, from: Option<i64>, out: bool) -> RemoteMessage {
    RemoteMessage::Message(RemoteMessageBody {
        id,
        from: from.map(|user_id| RemotePeer::User { user_id }),
        peer: RemotePeer::User {
            user_id: conversation_user,
        },
        out,
        date: 1_700_000_000 + id,
        text: format!("message {}", id),
        media: None,
    })
}

fn photo(id: i64, conversation_user: i64, from: i64, photo_id: i64) -> RemoteMessage {
    let RemoteMessage::Message(mut body) = text(id, conversation_user, Some(from), false) else {
        unreachable!()
    };
    body.text = String::new();
    body.media = Some(RemoteMedia::Photo {
        id: photo_id,
        access_hash: 0,
        file_reference: vec![1, 2, 3],
    });
    RemoteMessage::Message(body)
}

fn history(messages: Vec<RemoteMessage>) -> HistoryPage {
    HistoryPage::Slice {
        count: 1000,
        messages,
        users: vec![],
    }
}

struct World {
    remote: Arc<MockMessenger>,
    conversations: Arc<MemoryConversationRepository>,
    participants: Arc<MemoryParticipantRepository>,
    messages: Arc<MemoryMessageRepository>,
    store: Arc<MemoryObjectStore>,
    media: Arc<MediaIngestionPool>,
}

impl World {
    fn new(remote: MockMessenger) -> Self {
        let remote = Arc::new(remote);
        let messages = Arc::new(MemoryMessageRepository::new());
        let store = Arc::new(MemoryObjectStore::default());
        let handler = Arc::new(MediaIngestHandler::new(
            remote.clone(),
            messages.clone(),
            store.clone(),
        ));
        let media = Arc::new(
            MediaIngestionPool::start(
                MediaPoolConfig::default().with_workers(2).with_queue_capacity(4),
                handler,
                &Span::none(),
            )
            .unwrap(),
        );
        Self {
            remote,
            conversations: Arc::new(MemoryConversationRepository::new()),
            participants: Arc::new(MemoryParticipantRepository::new()),
            messages,
            store,
            media,
        }
    }

    async fn driver(&self, config: IngestConfig) -> chatvault_core::Result<IngestionDriver> {
        let collaborators = Collaborators {
            remote: self.remote.clone(),
            conversations: self.conversations.clone(),
            participants: self.participants.clone(),
            messages: self.messages.clone(),
            media: self.media.clone(),
        };
        IngestionDriver::start(collaborators, config, &Span::none()).await
    }
}

/// Two one-to-one conversations, three messages each, one photo.
fn two_conversations() -> MockMessenger {
    MockMessenger::new(me())
        .with_dialog_pages(vec![listing(
            vec![dialog(2, 12), dialog(3, 22)],
            vec![alice(), bob()],
        )])
        .with_history_pages(
            peer_of(&alice()),
            vec![history(vec![
                photo(12, 2, 2, 500),
                text(11, 2, None, true),
                text(10, 2, Some(2), false),
            ])],
        )
        .with_history_pages(
            peer_of(&bob()),
            vec![history(vec![
                text(22, 3, Some(3), false),
                text(21, 3, Some(3), false),
                text(20, 3, Some(1), true),
            ])],
        )
        .with_media(500, JPEG.to_vec())
}

async fn wait_for_completion(
    events: &mut tokio::sync::broadcast::Receiver<WorkerEvent>,
    remote_message_id: i64,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::JobCompleted {
                    remote_message_id: id,
                    ..
                }) if id == remote_message_id => return,
                Ok(WorkerEvent::JobFailed { error, .. }) => panic!("media job failed: {}", error),
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("media job did not complete");
}

#[tokio::test]
async fn test_two_conversation_scenario() {
    let world = World::new(two_conversations());
    let driver = world.driver(IngestConfig::default()).await.unwrap();
    assert_eq!(driver.self_user().id, 1);

    let stats = driver.run_once(&Cancellation::never()).await.unwrap();
    assert_eq!(
        stats,
        RescanStats {
            conversations_seen: 2,
            conversations_skipped: 0,
            conversations_failed: 0,
            messages_recorded: 6,
            messages_duplicate: 0,
            messages_skipped: 0,
            media_jobs_queued: 1,
        }
    );

    // One short listing page, one short history page per conversation.
    assert_eq!(world.remote.call_count(ops::LIST_DIALOGS), 1);
    assert_eq!(world.remote.history_offsets(&peer_of(&alice())), vec![0]);
    assert_eq!(world.remote.history_offsets(&peer_of(&bob())), vec![0]);

    world.media.shutdown().await;

    let conversations = world.conversations.all();
    assert_eq!(conversations.len(), 2);
    let alice_conv = conversations
        .iter()
        .find(|c| c.title == "alice")
        .expect("alice conversation");

    let photo = world
        .messages
        .find(12, alice_conv.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        photo.media_locator.as_deref(),
        Some("mem://chatvault/alice/image/12.jpg")
    );
    let object = world.store.get("alice/image/12.jpg").unwrap();
    assert_eq!(object.data, JPEG);
    assert_eq!(object.content_type, "image/jpeg");
    assert_eq!(world.store.names().len(), 1);

    // Text messages never get a locator.
    let plain = world.messages.find(10, alice_conv.id).await.unwrap().unwrap();
    assert!(plain.media_locator.is_none());

    // Authors: alice, bob and the account owner for outgoing messages.
    assert_eq!(world.participants.len(), 3);
    let owner = world.participants.find_by_remote(1).await.unwrap().unwrap();
    let outgoing = world.messages.find(11, alice_conv.id).await.unwrap().unwrap();
    assert_eq!(outgoing.author_id, owner.id);
}

#[tokio::test]
async fn test_second_rescan_is_idempotent() {
    let world = World::new(two_conversations());
    let driver = world.driver(IngestConfig::default()).await.unwrap();
    let mut events = world.media.events();
    let cancel = Cancellation::never();

    driver.run_once(&cancel).await.unwrap();
    wait_for_completion(&mut events, 12).await;

    let second = driver.run_once(&cancel).await.unwrap();
    assert_eq!(second.messages_recorded, 0);
    assert_eq!(second.messages_duplicate, 6);
    assert_eq!(second.media_jobs_queued, 0);

    world.media.shutdown().await;
    assert_eq!(world.messages.len(), 6);
    assert_eq!(world.conversations.all().len(), 2);
    assert_eq!(world.participants.len(), 3);
    assert_eq!(world.remote.call_count(ops::DOWNLOAD_MEDIA), 1);
}

#[tokio::test]
async fn test_self_dialog_produces_no_records() {
    let remote = MockMessenger::new(me())
        .with_dialog_pages(vec![listing(
            vec![dialog(1, 5), dialog(2, 12)],
            vec![me(), alice()],
        )])
        .with_history_pages(peer_of(&me()), vec![history(vec![text(5, 1, Some(1), true)])])
        .with_history_pages(peer_of(&alice()), vec![history(vec![text(12, 2, Some(2), false)])]);
    let world = World::new(remote);
    let driver = world.driver(IngestConfig::default()).await.unwrap();

    let stats = driver.run_once(&Cancellation::never()).await.unwrap();
    world.media.shutdown().await;

    assert_eq!(stats.conversations_seen, 2);
    assert_eq!(stats.conversations_skipped, 1);
    assert_eq!(stats.messages_recorded, 1);
    assert!(world.remote.history_offsets(&peer_of(&me())).is_empty());

    let conversations = world.conversations.all();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].title, "alice");
    assert!(world
        .messages
        .all()
        .iter()
        .all(|m| m.conversation_id == conversations[0].id));
}

#[tokio::test]
async fn test_history_pagination_termination() {
    let remote = MockMessenger::new(me())
        .with_dialog_pages(vec![listing(
            vec![dialog(2, 4), dialog(3, 9)],
            vec![alice(), bob()],
        )])
        // Only full pages, then an empty one.
        .with_history_pages(
            peer_of(&alice()),
            vec![
                history(vec![text(4, 2, Some(2), false), text(3, 2, Some(2), false)]),
                history(vec![text(2, 2, Some(2), false), text(1, 2, Some(2), false)]),
                history(vec![]),
            ],
        )
        // Last page shorter than the limit.
        .with_history_pages(
            peer_of(&bob()),
            vec![
                history(vec![text(9, 3, Some(3), false), text(8, 3, Some(3), false)]),
                history(vec![text(7, 3, Some(3), false)]),
            ],
        );
    let world = World::new(remote);
    let driver = world
        .driver(IngestConfig::default().with_messages_page_limit(2))
        .await
        .unwrap();

    let stats = driver.run_once(&Cancellation::never()).await.unwrap();
    world.media.shutdown().await;

    assert_eq!(stats.messages_recorded, 7);
    assert_eq!(world.remote.history_offsets(&peer_of(&alice())), vec![0, 3, 1]);
    assert_eq!(world.remote.history_offsets(&peer_of(&bob())), vec![0, 8]);
}

#[tokio::test]
async fn test_history_cursor_uses_minimum_of_unsorted_page() {
    let remote = MockMessenger::new(me())
        .with_dialog_pages(vec![listing(vec![dialog(2, 130)], vec![alice()])])
        .with_history_pages(
            peer_of(&alice()),
            vec![
                history(vec![
                    text(120, 2, Some(2), false),
                    text(95, 2, Some(2), false),
                    text(130, 2, Some(2), false),
                ]),
                history(vec![text(90, 2, Some(2), false)]),
            ],
        );
    let world = World::new(remote);
    let driver = world
        .driver(IngestConfig::default().with_messages_page_limit(3))
        .await
        .unwrap();

    driver.run_once(&Cancellation::never()).await.unwrap();
    world.media.shutdown().await;

    assert_eq!(world.remote.history_offsets(&peer_of(&alice())), vec![0, 95]);
    assert_eq!(world.messages.len(), 4);
}

#[tokio::test]
async fn test_failed_conversation_does_not_stop_rescan() {
    let remote = two_conversations().fail_history_for(
        peer_of(&bob()),
        MockFailure::Remote("CHANNEL_PRIVATE".into()),
    );
    let world = World::new(remote);
    let driver = world.driver(IngestConfig::default()).await.unwrap();

    let stats = driver.run_once(&Cancellation::never()).await.unwrap();
    world.media.shutdown().await;

    assert_eq!(stats.conversations_failed, 1);
    assert_eq!(stats.messages_recorded, 3);
}

#[tokio::test]
async fn test_unauthorized_terminates_driver() {
    let remote = two_conversations().fail_on(ops::LIST_DIALOGS, MockFailure::Unauthorized);
    let world = World::new(remote);
    let driver = world.driver(IngestConfig::default()).await.unwrap();

    let err = driver.run_once(&Cancellation::never()).await.unwrap_err();
    assert!(err.is_fatal());

    let (_stop, cancel) = Cancellation::channel();
    let err = driver.run(cancel).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    world.media.shutdown().await;
}

#[tokio::test]
async fn test_start_requires_authorized_session() {
    let remote = two_conversations().fail_on(ops::CURRENT_USER, MockFailure::Unauthorized);
    let world = World::new(remote);

    let err = world.driver(IngestConfig::default()).await.err().unwrap();
    assert!(err.is_fatal());
    world.media.shutdown().await;
}

#[tokio::test]
async fn test_rate_limited_listing_ends_rescan_quietly() {
    let remote = two_conversations().fail_on(ops::LIST_DIALOGS, MockFailure::RateLimited);
    let world = World::new(remote);
    let driver = world.driver(IngestConfig::default()).await.unwrap();

    let stats = driver.run_once(&Cancellation::never()).await.unwrap();
    world.media.shutdown().await;
    assert_eq!(stats, RescanStats::default());
}

#[tokio::test]
async fn test_run_repeats_until_cancelled() {
    let world = World::new(two_conversations());
    let driver = Arc::new(
        world
            .driver(IngestConfig::default().with_rescan_interval(Duration::from_millis(20)))
            .await
            .unwrap(),
    );
    let (stop, cancel) = Cancellation::channel();

    let runner = driver.clone();
    let task = tokio::spawn(async move { runner.run(cancel).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    stop.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("driver stopped")
        .unwrap()
        .unwrap();
    assert!(world.remote.call_count(ops::LIST_DIALOGS) >= 2);

    world.media.shutdown().await;
    assert_eq!(world.messages.len(), 6);
    let err = world
        .media
        .submit(chatvault_core::MediaJob {
            remote_message_id: 1,
            conversation_id: uuid::Uuid::new_v4(),
            author_id: None,
            media: RemoteMedia::Unsupported,
            naming_hint: "late".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Job(_)));
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let world = World::new(two_conversations());
    let driver = world.driver(IngestConfig::default()).await.unwrap();
    let (stop, cancel) = Cancellation::channel();
    stop.send(true).unwrap();

    driver.run(cancel.clone()).await.unwrap();
    assert_eq!(world.remote.call_count(ops::LIST_DIALOGS), 0);

    let err = driver.run_once(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    world.media.shutdown().await;
}
