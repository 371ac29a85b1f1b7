#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Session-level tests for the Scrawly client.
//!
//! Each test drives a [`GameSession`] against the in-process `MockServer`
//! from `tests/common`, checking the frames the session puts on the wire and
//! the callbacks it fires for what the server sends back.

mod common;

use std::time::Duration;

use scrawly_client::protocol::{
    HEARTBEAT, PHOENIX_TOPIC, PHX_CLOSE, PHX_JOIN, PHX_LEAVE, PRESENCE_DIFF, PRESENCE_STATE,
};
use scrawly_client::{GameSession, PresenceList, ScrawlyError, SessionConfig};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use common::{
    joined_session, new_session, next_value, payload_sink, stays_empty, MockConnector,
};

/// Poll `cond` until it holds or the wait budget runs out.
async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_passes_token_to_connector() {
    let (mut session, mut queue, tokens) = new_session();
    session.connect("player-token").await.unwrap();
    let _server = queue.accept().await;

    assert!(session.is_connected());
    assert!(!session.is_in_room());
    assert_eq!(*tokens.lock().unwrap(), vec!["player-token".to_string()]);
}

#[tokio::test]
async fn reconnect_leaves_room_and_closes_old_transport() {
    let (mut session, mut queue, tokens) = new_session();
    session.connect("first").await.unwrap();
    let mut first = queue.accept().await;

    let pending = session.join_room("ROOM1").unwrap();
    let join = first.next_frame().await;
    first.reply(&join, "ok", json!({}));
    pending.await.unwrap();

    session.connect("second").await.unwrap();
    let _second = queue.accept().await;

    let leave = first.next_frame().await;
    assert_eq!(leave.event, PHX_LEAVE);
    assert_eq!(leave.topic, "game:ROOM1");
    assert!(first.closed.load(std::sync::atomic::Ordering::Acquire));
    assert_eq!(
        *tokens.lock().unwrap(),
        vec!["first".to_string(), "second".to_string()]
    );
    assert!(session.is_connected());
    assert!(session.room_code().is_none());
}

#[tokio::test]
async fn disconnect_leaves_room_and_clears_state() {
    let (mut session, mut server, _queue) = joined_session("ROOM1", json!({})).await;
    server.broadcast(
        "game:ROOM1",
        PRESENCE_STATE,
        json!({"alice": {"metas": [{"phx_ref": "a1"}]}}),
    );
    assert!(eventually(|| !session.presence().is_empty()).await);

    session.disconnect().await;

    let leave = server.next_frame().await;
    assert_eq!(leave.event, PHX_LEAVE);
    assert_eq!(leave.topic, "game:ROOM1");
    assert!(server.closed.load(std::sync::atomic::Ordering::Acquire));

    assert!(!session.is_connected());
    assert!(!session.is_in_room());
    assert!(session.room_code().is_none());
    assert!(session.presence().is_empty());
}

#[tokio::test]
async fn server_closing_socket_marks_session_disconnected() {
    let (mut session, server, _queue) = joined_session("ROOM1", json!({})).await;
    drop(server);

    assert!(eventually(|| !session.is_connected()).await);
    assert!(!session.is_in_room());
    assert!(matches!(
        session.join_room("ROOM2"),
        Err(ScrawlyError::NotConnected)
    ));
    assert!(matches!(
        session.send_drawing_stop(),
        Err(ScrawlyError::NotInRoom)
    ));
}

#[tokio::test]
async fn pending_reply_fails_when_socket_drops() {
    let (session, mut server, _queue) = joined_session("ROOM1", json!({})).await;

    let pending = session.send_chat_message("hello?").unwrap();
    let _push = server.next_frame().await;
    drop(server);

    assert!(matches!(pending.await, Err(ScrawlyError::ReplyDropped)));
}

// ════════════════════════════════════════════════════════════════════
// Joining and leaving rooms
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_room_sends_phx_join_and_fires_success() {
    let (mut session, mut queue, _tokens) = new_session();
    let (cb, mut joined) = payload_sink();
    let _sub = session.on_join_success(cb);

    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    let pending = session.join_room("ROOM1").unwrap();
    assert_eq!(pending.event(), PHX_JOIN);
    assert!(session.is_in_room());
    assert_eq!(session.room_code().as_deref(), Some("ROOM1"));
    assert_eq!(session.topic().as_deref(), Some("game:ROOM1"));

    let join = server.next_frame().await;
    assert_eq!(join.topic, "game:ROOM1");
    assert_eq!(join.event, PHX_JOIN);
    assert_eq!(join.payload, json!({}));
    assert!(join.join_ref.is_some());
    assert_eq!(join.join_ref, join.msg_ref);

    server.reply(&join, "ok", json!({"score": 0}));
    assert_eq!(pending.await.unwrap(), json!({"score": 0}));
    assert_eq!(next_value(&mut joined).await, json!({"score": 0}));
    assert_eq!(session.room_code().as_deref(), Some("ROOM1"));
}

#[tokio::test]
async fn join_error_rolls_back_room() {
    let (mut session, mut queue, _tokens) = new_session();
    let (ok_cb, mut ok_rx) = payload_sink();
    let (err_cb, mut err_rx) = payload_sink();
    let _ok = session.on_join_success(ok_cb);
    let _err = session.on_join_error(err_cb);

    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    let pending = session.join_room("FULL").unwrap();
    let join = server.next_frame().await;
    server.reply(&join, "error", json!({"reason": "room full"}));

    match pending.await {
        Err(ScrawlyError::Rejected { event, response }) => {
            assert_eq!(event, PHX_JOIN);
            assert_eq!(response, json!({"reason": "room full"}));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert_eq!(next_value(&mut err_rx).await, json!({"reason": "room full"}));
    assert!(stays_empty(&mut ok_rx).await);

    assert!(!session.is_in_room());
    assert!(session.room_code().is_none());
    assert!(matches!(
        session.send_chat_message("hi"),
        Err(ScrawlyError::NotInRoom)
    ));
    assert!(session.is_connected());
}

#[tokio::test]
async fn join_room_while_disconnected_sends_nothing() {
    let (mut session, mut queue, tokens) = new_session();
    assert!(matches!(
        session.join_room("ROOM1"),
        Err(ScrawlyError::NotConnected)
    ));
    assert!(!session.is_in_room());
    assert!(tokens.lock().unwrap().is_empty());

    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;
    assert!(server
        .try_next_frame(Duration::from_millis(100))
        .await
        .is_none());
}

#[tokio::test]
async fn switching_rooms_leaves_before_joining() {
    let (mut session, mut server, _queue) = joined_session("WXYZ", json!({})).await;
    let (cb, mut joined) = payload_sink();
    let _sub = session.on_join_success(cb);

    let pending = session.join_room("ABCD").unwrap();
    assert_eq!(session.room_code().as_deref(), Some("ABCD"));

    let leave = server.next_frame().await;
    assert_eq!(leave.event, PHX_LEAVE);
    assert_eq!(leave.topic, "game:WXYZ");

    let join = server.next_frame().await;
    assert_eq!(join.event, PHX_JOIN);
    assert_eq!(join.topic, "game:ABCD");
    assert_ne!(join.join_ref, leave.join_ref);

    server.reply(&leave, "ok", json!({}));
    server.reply(&join, "ok", json!({"room": "ABCD"}));
    pending.await.unwrap();
    assert_eq!(next_value(&mut joined).await, json!({"room": "ABCD"}));
}

#[tokio::test]
async fn reply_to_superseded_join_fires_no_callbacks() {
    let (mut session, mut queue, _tokens) = new_session();
    let (cb, mut joined) = payload_sink();
    let _sub = session.on_join_success(cb);

    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    let first = session.join_room("OLD").unwrap();
    let old_join = server.next_frame().await;
    let second = session.join_room("NEW").unwrap();
    let _leave = server.next_frame().await;
    let new_join = server.next_frame().await;

    server.reply(&old_join, "ok", json!({"room": "OLD"}));
    first.await.unwrap();
    assert!(stays_empty(&mut joined).await);

    server.reply(&new_join, "ok", json!({"room": "NEW"}));
    second.await.unwrap();
    assert_eq!(next_value(&mut joined).await, json!({"room": "NEW"}));
    assert_eq!(session.room_code().as_deref(), Some("NEW"));
}

#[tokio::test]
async fn leave_room_stops_room_events() {
    let (mut session, mut server, _queue) = joined_session("ROOM1", json!({})).await;
    let (cb, mut chat) = payload_sink();
    let _sub = session.on_chat_message(cb);

    session.leave_room();
    assert!(!session.is_in_room());
    assert!(session.is_connected());

    let leave = server.next_frame().await;
    assert_eq!(leave.event, PHX_LEAVE);
    assert_eq!(leave.topic, "game:ROOM1");

    server.broadcast("game:ROOM1", "chat_message", json!({"message": "late"}));
    assert!(stays_empty(&mut chat).await);

    // A second leave is a no-op.
    session.leave_room();
    assert!(server
        .try_next_frame(Duration::from_millis(100))
        .await
        .is_none());
}

#[tokio::test]
async fn server_phx_close_clears_room() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    server.broadcast("game:ROOM1", PHX_CLOSE, json!({}));

    assert!(eventually(|| !session.is_in_room()).await);
    assert!(session.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Outbound pushes
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pushes_use_current_channel_and_wire_names() {
    let (session, mut server, _queue) = joined_session("ROOM1", json!({})).await;
    let sends: Vec<(&str, Value)> = vec![
        ("drawing_start", json!({"x": 10.0, "y": 20.0})),
        ("drawing_move", json!({"x": 11.5, "y": 21.5})),
        ("drawing_stop", json!({})),
        ("chat_message", json!({"message": "hi"})),
        ("start_game", json!({})),
        ("end_game", json!({})),
        ("round_start", json!({"round_number": 2})),
        ("round_end", json!({"round_number": 2})),
        ("turn_change", json!({"drawer_id": 42})),
    ];

    session.send_drawing_start(10.0, 20.0).unwrap();
    session.send_drawing_move(11.5, 21.5).unwrap();
    session.send_drawing_stop().unwrap();
    session.send_chat_message("hi").unwrap();
    session.start_game().unwrap();
    session.end_game().unwrap();
    session.start_round(2).unwrap();
    session.end_round(2).unwrap();
    session.change_turn(42).unwrap();

    let mut refs = Vec::new();
    for (event, payload) in sends {
        let frame = server.next_frame().await;
        assert_eq!(frame.topic, "game:ROOM1");
        assert_eq!(frame.event, event);
        assert_eq!(frame.payload, payload, "payload for {event}");
        assert!(frame.join_ref.is_some());
        refs.push(frame.msg_ref.clone().unwrap());
    }
    refs.sort();
    refs.dedup();
    assert_eq!(refs.len(), 9, "every push carries a distinct ref");
}

#[tokio::test]
async fn push_carries_join_ref_of_current_channel() {
    let (mut session, mut queue, _tokens) = new_session();
    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    let pending = session.join_room("ROOM1").unwrap();
    let join = server.next_frame().await;
    server.reply(&join, "ok", json!({}));
    pending.await.unwrap();

    session.send_chat_message("hi").unwrap();
    let push = server.next_frame().await;
    assert_eq!(push.join_ref, join.join_ref);
    assert_ne!(push.msg_ref, join.msg_ref);
}

#[tokio::test]
async fn push_reply_resolves_pending() {
    let (session, mut server, _queue) = joined_session("ROOM1", json!({})).await;

    let pending = session.send_chat_message("guess").unwrap();
    assert_eq!(pending.event(), "chat_message");
    let push = server.next_frame().await;
    server.reply(&push, "ok", json!({"correct": true}));

    assert_eq!(pending.await.unwrap(), json!({"correct": true}));
}

#[tokio::test]
async fn push_error_resolves_rejected_without_callbacks() {
    let (session, mut server, _queue) = joined_session("ROOM1", json!({})).await;
    let (err_cb, mut join_errors) = payload_sink();
    let (chat_cb, mut chat) = payload_sink();
    let _err = session.on_join_error(err_cb);
    let _chat = session.on_chat_message(chat_cb);

    let pending = session.start_game().unwrap();
    let push = server.next_frame().await;
    server.reply(&push, "error", json!({"reason": "not host"}));

    match pending.await {
        Err(ScrawlyError::Rejected { event, response }) => {
            assert_eq!(event, "start_game");
            assert_eq!(response, json!({"reason": "not host"}));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(stays_empty(&mut join_errors).await);
    assert!(stays_empty(&mut chat).await);
    assert!(session.is_in_room());
}

#[tokio::test]
async fn leaving_room_drops_unanswered_pushes() {
    let (mut session, mut server, _queue) = joined_session("ROOM1", json!({})).await;

    let pending = session.send_drawing_move(3.0, 4.0).unwrap();
    let push = server.next_frame().await;
    assert_eq!(push.event, "drawing_move");

    session.leave_room();
    let outcome = tokio::time::timeout(common::WAIT, pending).await.unwrap();
    assert!(matches!(outcome, Err(ScrawlyError::ReplyDropped)));
}

#[tokio::test]
async fn unanswered_push_is_dropped_after_push_timeout() {
    let (connector, mut queue, _tokens) = MockConnector::new();
    let config = SessionConfig::default()
        .with_heartbeat_interval(Duration::ZERO)
        .with_push_timeout(Duration::from_millis(50));
    let mut session = GameSession::new(connector, config);
    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    let joining = session.join_room("ROOM1").unwrap();
    let join = server.next_frame().await;
    server.reply(&join, "ok", json!({}));
    joining.await.unwrap();

    let pending = session.end_round(1).unwrap();
    let push = server.next_frame().await;
    assert_eq!(push.event, "round_end");

    let outcome = tokio::time::timeout(common::WAIT, pending).await.unwrap();
    assert!(matches!(outcome, Err(ScrawlyError::ReplyDropped)));
    assert!(session.is_in_room());
}

#[tokio::test]
async fn push_without_room_sends_nothing() {
    let (mut session, mut queue, _tokens) = new_session();
    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    assert!(matches!(
        session.send_drawing_move(1.0, 2.0),
        Err(ScrawlyError::NotInRoom)
    ));
    assert!(matches!(
        session.change_turn("u7"),
        Err(ScrawlyError::NotInRoom)
    ));
    assert!(server
        .try_next_frame(Duration::from_millis(100))
        .await
        .is_none());
}

// ════════════════════════════════════════════════════════════════════
// Inbound events and callbacks
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn every_inbound_event_reaches_its_callbacks() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<(&'static str, Value)>();

    let events = [
        "drawing_start",
        "drawing_move",
        "drawing_stop",
        "chat_message",
        "game_started",
        "game_ended",
        "round_started",
        "round_ended",
        "turn_changed",
    ];

    let mut subs = Vec::new();
    for event in events {
        let tx = tx.clone();
        let cb = move |payload: &Value| {
            let _ = tx.send((event, payload.clone()));
        };
        subs.push(match event {
            "drawing_start" => session.on_drawing_start(cb),
            "drawing_move" => session.on_drawing_move(cb),
            "drawing_stop" => session.on_drawing_stop(cb),
            "chat_message" => session.on_chat_message(cb),
            "game_started" => session.on_game_started(cb),
            "game_ended" => session.on_game_ended(cb),
            "round_started" => session.on_round_started(cb),
            "round_ended" => session.on_round_ended(cb),
            "turn_changed" => session.on_turn_changed(cb),
            other => panic!("no registration for {other}"),
        });
    }

    for (i, event) in events.iter().enumerate() {
        server.broadcast("game:ROOM1", event, json!({ "seq": i }));
    }
    for (i, event) in events.iter().enumerate() {
        let (got, payload) = next_value(&mut rx).await;
        assert_eq!(got, *event);
        assert_eq!(payload, json!({ "seq": i }));
    }
    assert!(stays_empty(&mut rx).await);
}

#[tokio::test]
async fn callbacks_fire_in_registration_order() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();

    let first_tx = tx.clone();
    let _first = session.on_drawing_move(move |_: &Value| {
        let _ = first_tx.send("first");
    });
    let second_tx = tx.clone();
    let _second = session.on_drawing_move(move |_: &Value| {
        let _ = second_tx.send("second");
    });

    server.broadcast("game:ROOM1", "drawing_move", json!({"x": 1, "y": 2}));

    assert_eq!(next_value(&mut rx).await, "first");
    assert_eq!(next_value(&mut rx).await, "second");
}

#[tokio::test]
async fn same_callback_registered_twice_fires_twice() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    let (cb, mut rx) = payload_sink();
    let cb = std::sync::Arc::new(cb);

    let a = std::sync::Arc::clone(&cb);
    let _one = session.on_game_ended(move |p: &Value| (*a)(p));
    let b = std::sync::Arc::clone(&cb);
    let _two = session.on_game_ended(move |p: &Value| (*b)(p));

    server.broadcast("game:ROOM1", "game_ended", json!({"winner": "bob"}));
    assert_eq!(next_value(&mut rx).await, json!({"winner": "bob"}));
    assert_eq!(next_value(&mut rx).await, json!({"winner": "bob"}));
}

#[tokio::test]
async fn dropped_subscription_stops_delivery() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    let (dropped_cb, mut dropped_rx) = payload_sink();
    let (kept_cb, mut kept_rx) = payload_sink();

    let dropped = session.on_round_started(dropped_cb);
    session.on_round_started(kept_cb).detach();
    drop(dropped);

    server.broadcast("game:ROOM1", "round_started", json!({"round": 1}));

    assert_eq!(next_value(&mut kept_rx).await, json!({"round": 1}));
    assert!(stays_empty(&mut dropped_rx).await);
}

#[tokio::test]
async fn unsubscribe_removes_only_that_callback() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    let (a_cb, mut a_rx) = payload_sink();
    let (b_cb, mut b_rx) = payload_sink();

    let a = session.on_turn_changed(a_cb);
    let _b = session.on_turn_changed(b_cb);
    a.unsubscribe();

    server.broadcast("game:ROOM1", "turn_changed", json!({"drawer_id": 3}));

    assert_eq!(next_value(&mut b_rx).await, json!({"drawer_id": 3}));
    assert!(stays_empty(&mut a_rx).await);
}

#[tokio::test]
async fn callbacks_survive_room_switch() {
    let (mut session, mut server, _queue) = joined_session("ROOM1", json!({})).await;
    let (cb, mut chat) = payload_sink();
    let _sub = session.on_chat_message(cb);

    let pending = session.join_room("ROOM2").unwrap();
    let _leave = server.next_frame().await;
    let join = server.next_frame().await;
    server.reply(&join, "ok", json!({}));
    pending.await.unwrap();

    server.broadcast("game:ROOM1", "chat_message", json!({"message": "old room"}));
    server.broadcast("game:ROOM2", "chat_message", json!({"message": "new room"}));

    assert_eq!(next_value(&mut chat).await, json!({"message": "new room"}));
    assert!(stays_empty(&mut chat).await);
}

#[tokio::test]
async fn unknown_events_and_garbage_are_ignored() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    let (cb, mut chat) = payload_sink();
    let _sub = session.on_chat_message(cb);

    server.broadcast("game:ROOM1", "mystery_event", json!({}));
    server.send_raw("not json".to_string());
    server.send_raw(r#"{"topic":"game:ROOM1"}"#.to_string());
    server.broadcast("game:ROOM1", "chat_message", json!({"message": "still here"}));

    assert_eq!(next_value(&mut chat).await, json!({"message": "still here"}));
    assert!(session.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Presence
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn presence_state_and_diff_update_roster() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    let (tx, mut rosters) = mpsc::unbounded_channel::<PresenceList>();
    let _sub = session.on_presence_update(move |roster: &PresenceList| {
        let _ = tx.send(roster.clone());
    });

    server.broadcast(
        "game:ROOM1",
        PRESENCE_STATE,
        json!({
            "alice": {"metas": [{"phx_ref": "a1", "name": "Alice"}]},
            "bob": {"metas": [{"phx_ref": "b1", "name": "Bob"}]}
        }),
    );
    let roster = next_value(&mut rosters).await;
    assert_eq!(roster.keys().collect::<Vec<_>>(), vec!["alice", "bob"]);

    server.broadcast(
        "game:ROOM1",
        PRESENCE_DIFF,
        json!({
            "joins": {"carol": {"metas": [{"phx_ref": "c1"}]}},
            "leaves": {"bob": {"metas": [{"phx_ref": "b1"}]}}
        }),
    );
    let roster = next_value(&mut rosters).await;
    assert_eq!(roster.keys().collect::<Vec<_>>(), vec!["alice", "carol"]);
    assert_eq!(session.presence(), roster);
}

#[tokio::test]
async fn presence_diff_before_state_is_applied_after_it() {
    let (session, server, _queue) = joined_session("ROOM1", json!({})).await;
    let (tx, mut rosters) = mpsc::unbounded_channel::<PresenceList>();
    let _sub = session.on_presence_update(move |roster: &PresenceList| {
        let _ = tx.send(roster.clone());
    });

    server.broadcast(
        "game:ROOM1",
        PRESENCE_DIFF,
        json!({"joins": {"bob": {"metas": [{"phx_ref": "b1"}]}}, "leaves": {}}),
    );
    assert!(stays_empty(&mut rosters).await);

    server.broadcast(
        "game:ROOM1",
        PRESENCE_STATE,
        json!({"alice": {"metas": [{"phx_ref": "a1"}]}}),
    );
    let roster = next_value(&mut rosters).await;
    assert_eq!(roster.keys().collect::<Vec<_>>(), vec!["alice", "bob"]);
    assert!(stays_empty(&mut rosters).await);
}

#[tokio::test]
async fn presence_is_reset_on_room_switch() {
    let (mut session, mut server, _queue) = joined_session("ROOM1", json!({})).await;
    server.broadcast(
        "game:ROOM1",
        PRESENCE_STATE,
        json!({"alice": {"metas": [{"phx_ref": "a1"}]}}),
    );
    assert!(eventually(|| !session.presence().is_empty()).await);

    let _pending = session.join_room("ROOM2").unwrap();
    assert!(session.presence().is_empty());

    // Presence for the room that was left no longer applies.
    let _leave = server.next_frame().await;
    let _join = server.next_frame().await;
    server.broadcast(
        "game:ROOM1",
        PRESENCE_DIFF,
        json!({"joins": {"zed": {"metas": [{"phx_ref": "z1"}]}}, "leaves": {}}),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.presence().is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Heartbeats
// ════════════════════════════════════════════════════════════════════

fn heartbeat_session(interval: Duration) -> (GameSession<MockConnector>, common::ServerQueue) {
    let (connector, queue, _tokens) = MockConnector::new();
    let config = SessionConfig::default()
        .with_heartbeat_interval(interval)
        .with_shutdown_timeout(Duration::from_millis(500));
    (GameSession::new(connector, config), queue)
}

#[tokio::test]
async fn heartbeats_are_sent_on_phoenix_topic() {
    let (mut session, mut queue) = heartbeat_session(Duration::from_millis(50));
    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    for _ in 0..3 {
        let beat = server.next_frame().await;
        assert_eq!(beat.topic, PHOENIX_TOPIC);
        assert_eq!(beat.event, HEARTBEAT);
        assert_eq!(beat.payload, json!({}));
        assert!(beat.join_ref.is_none());
        assert!(beat.msg_ref.is_some());
        server.reply(&beat, "ok", json!({}));
    }
    assert!(session.is_connected());
}

#[tokio::test]
async fn unanswered_heartbeat_closes_socket() {
    let (mut session, mut queue) = heartbeat_session(Duration::from_millis(50));
    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    let beat = server.next_frame().await;
    assert_eq!(beat.event, HEARTBEAT);

    assert!(eventually(|| !session.is_connected()).await);
    assert!(server.closed.load(std::sync::atomic::Ordering::Acquire));
}

#[tokio::test]
async fn zero_interval_disables_heartbeats() {
    let (mut session, mut queue, _tokens) = new_session();
    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    assert!(server
        .try_next_frame(Duration::from_millis(200))
        .await
        .is_none());
    assert!(session.is_connected());
}
