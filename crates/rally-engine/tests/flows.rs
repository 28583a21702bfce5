use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

use rally_cache::memory::{MemoryCache, MemoryPresence};
use rally_cache::{Cache, CacheError, Invalidator, KeyValueCache, keys};
use rally_db::Database;
use rally_engine::Engine;
use rally_engine::chat::NewMessage;
use rally_gateway::{Dispatcher, DispatcherConfig, Frame};
use rally_types::error::ErrorKind;
use rally_types::events::{GatewayCommand, GatewayEvent};
use rally_types::models::{Direction, Match, MatchId, MessageType, PartyId};

const A: PartyId = PartyId(1);
const B: PartyId = PartyId(2);
const C: PartyId = PartyId(3);

fn dispatcher() -> Dispatcher {
    Dispatcher::new(
        Arc::new(MemoryPresence::new()),
        DispatcherConfig {
            send_timeout: Duration::from_millis(200),
            channel_capacity: 16,
        },
    )
}

fn engine_with(store: Arc<MemoryCache>) -> Engine {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let cache = Cache::new(store, Duration::from_secs(60));
    Engine::new(db, cache, dispatcher())
}

fn engine() -> Engine {
    engine_with(Arc::new(MemoryCache::new()))
}

async fn next_event(frames: &mut Receiver<Frame>) -> GatewayEvent {
    let frame = tokio::time::timeout(Duration::from_secs(1), frames.recv())
        .await
        .expect("no frame within a second")
        .expect("channel closed");
    serde_json::from_str(&frame).unwrap()
}

fn assert_idle(frames: &mut Receiver<Frame>) {
    if let Ok(frame) = frames.try_recv() {
        panic!("unexpected frame: {}", frame);
    }
}

async fn matched(engine: &Engine, x: PartyId, y: PartyId) -> Match {
    engine.swipe(x, y, Direction::Right).await.unwrap();
    engine
        .swipe(y, x, Direction::Right)
        .await
        .unwrap()
        .matched
        .unwrap()
}

/// Connection with the `ready` greeting already consumed.
async fn session(engine: &Engine, party: PartyId) -> rally_gateway::Connection {
    let mut conn = engine.open_session(party).await;
    assert_eq!(
        next_event(&mut conn.frames).await,
        GatewayEvent::Ready { party_id: party }
    );
    conn
}

#[tokio::test]
async fn mutual_right_swipes_match_once() {
    let engine = engine();
    let mut a = session(&engine, A).await;
    let mut b = session(&engine, B).await;

    let first = engine.swipe(B, A, Direction::Right).await.unwrap();
    assert!(!first.is_match);
    assert!(first.matched.is_none());

    let second = engine.swipe(A, B, Direction::Right).await.unwrap();
    assert!(second.is_match);
    let m = second.matched.unwrap();
    assert_eq!((m.party_a_id, m.party_b_id), (A, B));

    let expected = GatewayEvent::matched(&m);
    assert_eq!(next_event(&mut a.frames).await, expected);
    assert_eq!(next_event(&mut b.frames).await, expected);
    assert_idle(&mut a.frames);
    assert_idle(&mut b.frames);
}

#[tokio::test]
async fn canonical_order_does_not_depend_on_who_swipes_last() {
    let engine = engine();
    let m = matched(&engine, PartyId(9), PartyId(4)).await;
    assert_eq!(m.party_a_id, PartyId(4));
    assert_eq!(m.party_b_id, PartyId(9));
}

#[tokio::test]
async fn left_swipe_never_matches() {
    let engine = engine();
    engine.swipe(A, B, Direction::Right).await.unwrap();
    let response = engine.swipe(B, A, Direction::Left).await.unwrap();
    assert!(!response.is_match);

    let outcome = engine.try_form_match(A, B).await.unwrap();
    assert!(outcome.matched.is_none());
    assert!(engine.matches_for(A).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_and_self_swipes_are_rejected() {
    let engine = engine();
    engine.swipe(A, B, Direction::Left).await.unwrap();

    let err = engine.swipe(A, B, Direction::Right).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let kept = engine.lookup_interest(A, B).await.unwrap().unwrap();
    assert_eq!(kept.direction, Direction::Left);

    let err = engine.swipe(A, A, Direction::Right).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn detector_is_idempotent_after_the_match_exists() {
    let engine = engine();
    let m = matched(&engine, A, B).await;

    let again = engine.try_form_match(B, A).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.matched, Some(m));
}

#[tokio::test]
async fn retried_right_swipe_completes_an_unmatched_mutual_pair() {
    let engine = engine();
    let mut a = session(&engine, A).await;

    // Both right interests stored, no match row.
    engine.swipe(B, A, Direction::Right).await.unwrap();
    engine.record_interest(A, B, Direction::Right).await.unwrap();
    assert!(engine.matches_for(A).await.unwrap().is_empty());

    let retried = engine.swipe(A, B, Direction::Right).await.unwrap();
    assert!(retried.is_match);
    let m = retried.matched.unwrap();
    assert_eq!(next_event(&mut a.frames).await, GatewayEvent::matched(&m));
    assert_eq!(engine.matches_for(A).await.unwrap(), vec![m]);

    let err = engine.swipe(B, A, Direction::Right).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reciprocal_swipes_create_one_match() {
    for _ in 0..20 {
        let engine = engine();
        let mut a = session(&engine, A).await;

        let (x, y) = tokio::join!(
            engine.swipe(A, B, Direction::Right),
            engine.swipe(B, A, Direction::Right)
        );
        let (x, y) = (x.unwrap(), y.unwrap());
        assert!(x.is_match || y.is_match);

        let matches = engine.matches_for(A).await.unwrap();
        assert_eq!(matches.len(), 1);

        // Exactly one match event, from whichever call won.
        assert!(matches!(
            next_event(&mut a.frames).await,
            GatewayEvent::Match { .. }
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_idle(&mut a.frames);
    }
}

#[tokio::test]
async fn match_creation_purges_cached_match_lists() {
    let store = Arc::new(MemoryCache::new());
    let engine = engine_with(store.clone());

    assert!(engine.matches_for(A).await.unwrap().is_empty());
    assert!(store.get(&keys::matches(A)).await.unwrap().is_some());

    matched(&engine, A, B).await;
    assert!(store.get(&keys::matches(A)).await.unwrap().is_none());
    assert!(store.get(&keys::profile(B)).await.unwrap().is_none());

    let list = engine.matches_for(A).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].party_id, B);
}

#[tokio::test]
async fn match_reads_are_limited_to_participants() {
    let engine = engine();
    let m = matched(&engine, A, B).await;

    assert_eq!(engine.get_match(A, m.id).await.unwrap(), m);
    assert_eq!(
        engine.get_match(C, m.id).await.unwrap_err().kind(),
        ErrorKind::NotAuthorized
    );
    assert_eq!(
        engine.get_match(A, MatchId(999)).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn chat_reaches_the_other_party_without_echo() {
    let engine = engine();
    let m = matched(&engine, A, B).await;
    let mut a = session(&engine, A).await;
    let mut b = session(&engine, B).await;
    // B's greeting carries A's presence.
    tokio::time::sleep(Duration::from_millis(20)).await;
    while a.frames.try_recv().is_ok() {}
    while b.frames.try_recv().is_ok() {}

    engine
        .handle_command(
            A,
            GatewayCommand::Chat {
                match_id: m.id,
                content: "hello".into(),
                message_type: MessageType::Text,
                media_url: None,
            },
        )
        .await
        .unwrap();

    match next_event(&mut b.frames).await {
        GatewayEvent::Chat {
            sender_id, content, ..
        } => {
            assert_eq!(sender_id, A);
            assert_eq!(content, "hello");
        }
        other => panic!("expected chat, got {:?}", other),
    }
    assert_idle(&mut a.frames);
    assert_idle(&mut b.frames);
}

#[tokio::test]
async fn outsiders_cannot_chat_type_or_read() {
    let engine = engine();
    let m = matched(&engine, A, B).await;

    let new = NewMessage {
        match_id: m.id,
        content: "hi".into(),
        message_type: MessageType::Text,
        media_url: None,
    };
    let kind = |r: rally_types::error::Error| r.kind();
    assert_eq!(
        kind(engine.send_message(C, new).await.unwrap_err()),
        ErrorKind::NotAuthorized
    );
    assert_eq!(
        kind(engine.typing(C, m.id, true).await.unwrap_err()),
        ErrorKind::NotAuthorized
    );
    assert_eq!(
        kind(engine.list_messages(C, m.id, 0, 0).await.unwrap_err()),
        ErrorKind::NotAuthorized
    );
    assert_eq!(
        kind(engine.unread_count(C, m.id).await.unwrap_err()),
        ErrorKind::NotAuthorized
    );
}

#[tokio::test]
async fn typing_is_relayed_to_the_other_party() {
    let engine = engine();
    let m = matched(&engine, A, B).await;
    let mut b = session(&engine, B).await;

    engine
        .handle_command(
            A,
            GatewayCommand::Typing {
                match_id: m.id,
                is_typing: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut b.frames).await,
        GatewayEvent::Typing {
            match_id: m.id,
            party_id: A,
            is_typing: true,
        }
    );
}

#[tokio::test]
async fn message_pages_and_cache_invalidation() {
    let store = Arc::new(MemoryCache::new());
    let engine = engine_with(store.clone());
    let m = matched(&engine, A, B).await;

    for i in 0..3 {
        let sender = if i % 2 == 0 { A } else { B };
        engine
            .send_message(
                sender,
                NewMessage {
                    match_id: m.id,
                    content: format!("msg {}", i),
                    message_type: MessageType::Text,
                    media_url: None,
                },
            )
            .await
            .unwrap();
    }

    let first = engine.list_messages(B, m.id, 0, 0).await.unwrap();
    assert_eq!(first.count, 3);
    assert!(!first.has_more);
    assert_eq!(first.messages[0].content, "msg 2");
    assert!(store.get(&keys::match_messages(m.id)).await.unwrap().is_some());

    let page = engine.list_messages(B, m.id, 1, 2).await.unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.messages[0].content, "msg 0");

    let top = engine.list_messages(B, m.id, 0, 2).await.unwrap();
    assert!(top.has_more);

    assert_eq!(engine.unread_count(B, m.id).await.unwrap(), 2);
    let latest = engine.latest_message(A, m.id).await.unwrap().unwrap();
    assert_eq!(latest.content, "msg 2");

    // Only the sender may delete; deleting purges the cached first page.
    assert_eq!(
        engine.delete_message(B, latest.id).await.unwrap_err().kind(),
        ErrorKind::NotAuthorized
    );
    engine.delete_message(A, latest.id).await.unwrap();
    assert!(store.get(&keys::match_messages(m.id)).await.unwrap().is_none());
    assert_eq!(engine.list_messages(B, m.id, 0, 0).await.unwrap().count, 2);
    assert_eq!(
        engine.delete_message(A, latest.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn empty_and_oversized_messages_are_invalid() {
    let engine = engine();
    let m = matched(&engine, A, B).await;

    for content in [String::new(), "x".repeat(1001)] {
        let err = engine
            .send_message(
                A,
                NewMessage {
                    match_id: m.id,
                    content,
                    message_type: MessageType::Text,
                    media_url: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}

#[tokio::test]
async fn presence_is_announced_to_matched_partners() {
    let engine = engine();
    tokio::spawn(engine.presence_fanout());
    matched(&engine, A, B).await;

    let mut b = session(&engine, B).await;
    let a = engine.open_session(A).await;

    assert_eq!(
        next_event(&mut b.frames).await,
        GatewayEvent::Presence {
            party_id: A,
            online: true,
        }
    );
    assert!(engine.is_online(A).await.unwrap());

    engine.close_session(A, a.channel).await;
    assert_eq!(
        next_event(&mut b.frames).await,
        GatewayEvent::Presence {
            party_id: A,
            online: false,
        }
    );
    assert!(!engine.is_online(A).await.unwrap());
    assert!(!engine.dispatcher().registry().is_connected(A));
}

#[tokio::test]
async fn new_session_learns_which_partners_are_online() {
    let engine = engine();
    matched(&engine, A, B).await;
    let _b = session(&engine, B).await;

    let mut a = session(&engine, A).await;
    assert_eq!(
        next_event(&mut a.frames).await,
        GatewayEvent::Presence {
            party_id: B,
            online: true,
        }
    );
}

#[tokio::test]
async fn rejected_command_gets_an_error_event() {
    let engine = engine();
    let mut a = session(&engine, A).await;

    let err = engine
        .handle_command(
            A,
            GatewayCommand::Typing {
                match_id: MatchId(404),
                is_typing: true,
            },
        )
        .await
        .unwrap_err();
    engine.reject_command(A, a.channel, &err).await;

    match next_event(&mut a.frames).await {
        GatewayEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotFound),
        other => panic!("expected error, got {:?}", other),
    }
}

struct DownCache;

#[async_trait]
impl KeyValueCache for DownCache {
    async fn set(&self, _: &str, _: &[u8], _: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn delete(&self, _: &[String]) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }
}

#[tokio::test]
async fn writes_succeed_while_the_cache_is_down() {
    let store: Arc<dyn KeyValueCache> = Arc::new(DownCache);
    let engine = Engine::with_invalidator(
        Arc::new(Database::open_in_memory().unwrap()),
        Cache::new(store.clone(), Duration::from_secs(60)),
        Invalidator::new(store).with_retry(2, Duration::from_millis(1)),
        dispatcher(),
    );

    let m = matched(&engine, A, B).await;
    assert_eq!(engine.matches_for(A).await.unwrap().len(), 1);
    engine
        .send_message(
            A,
            NewMessage {
                match_id: m.id,
                content: "still works".into(),
                message_type: MessageType::Text,
                media_url: None,
            },
        )
        .await
        .unwrap();
}
