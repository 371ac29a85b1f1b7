//! Background socket loop and the state it shares with [`GameSession`](crate::GameSession).
//!
//! The loop owns the [`Transport`] and multiplexes, via `tokio::select!`:
//! outgoing frames queued by the session handle, a shutdown signal, the
//! heartbeat timer and incoming frames. Inbound frames are routed to the
//! callback registry on this task, one at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::presence::{Presence, PresenceDiff, PresenceList};
use crate::protocol::{
    is_lifecycle_event, Frame, InboundEvent, Reply, PHOENIX_TOPIC, PHX_CLOSE, PHX_ERROR,
    PHX_LEAVE, PHX_REPLY, PRESENCE_DIFF, PRESENCE_STATE,
};
use crate::registry::{CallbackRegistry, EventKind};
use crate::transport::Transport;

// ── Shared state ────────────────────────────────────────────────────

/// The joined room: channel identity plus its presence view.
///
/// Keeping the three together makes "channel ⇔ room code ⇔ presence" hold
/// by construction.
#[derive(Debug, Clone)]
pub(crate) struct RoomState {
    pub(crate) code: String,
    pub(crate) topic: String,
    pub(crate) join_ref: String,
    pub(crate) presence: Presence,
}

/// State shared between the session handle and the socket loop.
///
/// The room lock is only held for field access; it is never held across an
/// `.await` or while callbacks run.
pub(crate) struct SharedState {
    pub(crate) connected: AtomicBool,
    next_ref: AtomicU64,
    room: Mutex<Option<RoomState>>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            next_ref: AtomicU64::new(0),
            room: Mutex::new(None),
        }
    }

    /// Allocate the next message reference. References are unique per session.
    pub(crate) fn next_ref(&self) -> String {
        (self.next_ref.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    pub(crate) fn room(&self) -> MutexGuard<'_, Option<RoomState>> {
        self.room.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `(topic, join_ref)` of the current channel.
    pub(crate) fn channel(&self) -> Option<(String, String)> {
        self.room()
            .as_ref()
            .map(|room| (room.topic.clone(), room.join_ref.clone()))
    }

    pub(crate) fn take_room(&self) -> Option<RoomState> {
        self.room().take()
    }

    fn is_current(&self, join_ref: &str) -> bool {
        self.room()
            .as_ref()
            .is_some_and(|room| room.join_ref == join_ref)
    }

    /// Clear the room only if it is still the channel instance `join_ref`.
    fn clear_room_if(&self, join_ref: &str) -> bool {
        let mut room = self.room();
        if room.as_ref().is_some_and(|r| r.join_ref == join_ref) {
            *room = None;
            true
        } else {
            false
        }
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        if let Some(room) = self.take_room() {
            debug!(room = %room.code, "state: room dropped with the socket");
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// What a pending reply was requested for; decides how the reply is handled.
#[derive(Debug, Clone)]
pub(crate) enum ReplyPurpose {
    Join { room: String, join_ref: String },
    Push { event: String },
    Leave { room: String },
}

pub(crate) struct AwaitingReply {
    pub(crate) purpose: ReplyPurpose,
    pub(crate) tx: Option<oneshot::Sender<Reply>>,
}

/// A reply the loop is still waiting for.
struct Tracked {
    /// Channel instance the request was sent on; `None` for socket-level frames.
    join_ref: Option<String>,
    /// When the request is given up on; `None` if it never expires.
    deadline: Option<Instant>,
    awaiting: AwaitingReply,
}

/// A frame queued by the session handle.
pub(crate) struct Outgoing {
    pub(crate) frame: Frame,
    pub(crate) awaiting: Option<AwaitingReply>,
}

// ── Loop ────────────────────────────────────────────────────────────

/// Outcome of a loop iteration that decides whether the loop keeps running.
enum Flow {
    Continue,
    Stop,
}

/// Bookkeeping owned by the loop task.
///
/// Dropping a tracked entry drops its reply sender, which resolves the
/// caller's `PendingReply` as `ReplyDropped`.
pub(crate) struct Dispatcher {
    state: Arc<SharedState>,
    registry: Arc<CallbackRegistry>,
    pending: HashMap<String, Tracked>,
    heartbeat_ref: Option<String>,
    push_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        state: Arc<SharedState>,
        registry: Arc<CallbackRegistry>,
        push_timeout: Duration,
    ) -> Self {
        Self {
            state,
            registry,
            pending: HashMap::new(),
            heartbeat_ref: None,
            push_timeout,
        }
    }

    /// Record an outgoing frame. A `phx_leave` first discards every reply
    /// still awaited on the channel instance it leaves.
    fn track(&mut self, frame: &Frame, awaiting: Option<AwaitingReply>) {
        if frame.event == PHX_LEAVE {
            if let Some(join_ref) = &frame.join_ref {
                self.purge_channel(join_ref);
            }
        }
        if let (Some(msg_ref), Some(awaiting)) = (&frame.msg_ref, awaiting) {
            let deadline =
                (!self.push_timeout.is_zero()).then(|| Instant::now() + self.push_timeout);
            self.pending.insert(
                msg_ref.clone(),
                Tracked {
                    join_ref: frame.join_ref.clone(),
                    deadline,
                    awaiting,
                },
            );
        }
    }

    /// Drop every awaited reply of the channel instance `join_ref`.
    fn purge_channel(&mut self, join_ref: &str) {
        let before = self.pending.len();
        self.pending
            .retain(|_, tracked| tracked.join_ref.as_deref() != Some(join_ref));
        let purged = before - self.pending.len();
        if purged > 0 {
            debug!(join_ref = %join_ref, purged, "dropped replies for a closed channel");
        }
    }

    /// Drop every awaited reply whose deadline is at or before `now`.
    fn expire(&mut self, now: Instant) {
        let before = self.pending.len();
        self.pending
            .retain(|_, tracked| tracked.deadline.is_none_or(|deadline| deadline > now));
        let expired = before - self.pending.len();
        if expired > 0 {
            debug!(expired, "gave up waiting for replies");
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Route one decoded inbound frame.
    pub(crate) fn handle_frame(&mut self, frame: Frame) {
        if frame.event == PHX_REPLY {
            self.handle_reply(frame);
            return;
        }

        let Some((topic, join_ref)) = self.state.channel() else {
            debug!(topic = %frame.topic, event = %frame.event, "no room joined, dropping frame");
            return;
        };
        if frame.topic != topic {
            debug!(topic = %frame.topic, event = %frame.event, "frame for another topic, dropping");
            return;
        }
        if is_lifecycle_event(&frame.event)
            && frame.join_ref.as_deref().is_some_and(|r| r != join_ref)
        {
            debug!(event = %frame.event, "lifecycle frame for a stale channel, dropping");
            return;
        }

        match frame.event.as_str() {
            PRESENCE_STATE => match serde_json::from_value::<PresenceList>(frame.payload) {
                Ok(list) => self.sync_presence(&join_ref, |p| {
                    p.sync_state(list);
                    true
                }),
                Err(e) => warn!("malformed presence_state payload: {e}"),
            },
            PRESENCE_DIFF => match serde_json::from_value::<PresenceDiff>(frame.payload) {
                Ok(diff) => self.sync_presence(&join_ref, |p| p.sync_diff(diff)),
                Err(e) => warn!("malformed presence_diff payload: {e}"),
            },
            PHX_ERROR => warn!(topic = %topic, "room channel crashed on the server"),
            PHX_CLOSE => {
                if self.state.clear_room_if(&join_ref) {
                    info!(topic = %topic, "room channel closed by the server");
                    self.purge_channel(&join_ref);
                }
            }
            event => match InboundEvent::from_name(event) {
                Some(inbound) => self.registry.emit(inbound.into(), &frame.payload),
                None => debug!(event = %event, "unhandled room event"),
            },
        }
    }

    /// Apply a presence update; callbacks fire only if `apply` changed the roster.
    fn sync_presence(&self, join_ref: &str, apply: impl FnOnce(&mut Presence) -> bool) {
        let roster = {
            let mut room = self.state.room();
            let Some(room) = room.as_mut().filter(|r| r.join_ref == join_ref) else {
                return;
            };
            if !apply(&mut room.presence) {
                debug!("presence diff buffered until the first presence_state");
                return;
            }
            room.presence.list().clone()
        };
        self.registry.emit_presence(&roster);
    }

    fn handle_reply(&mut self, frame: Frame) {
        let Some(msg_ref) = frame.msg_ref.as_deref() else {
            debug!(topic = %frame.topic, "reply without ref, dropping");
            return;
        };

        if frame.topic == PHOENIX_TOPIC && self.heartbeat_ref.as_deref() == Some(msg_ref) {
            self.heartbeat_ref = None;
            return;
        }

        let Some(Tracked { awaiting, .. }) = self.pending.remove(msg_ref) else {
            debug!(msg_ref = %msg_ref, "reply for unknown or expired ref, dropping");
            return;
        };
        let Some(reply) = frame.reply() else {
            warn!(msg_ref = %msg_ref, "malformed phx_reply payload: {}", frame.payload);
            return;
        };
        self.settle(awaiting, reply);
    }

    fn settle(&mut self, awaiting: AwaitingReply, reply: Reply) {
        match &awaiting.purpose {
            ReplyPurpose::Join { room, join_ref } => {
                if !self.state.is_current(join_ref) {
                    debug!(room = %room, "join reply for a channel that is no longer current");
                } else if reply.is_ok() {
                    info!(room = %room, response = %reply.response, "joined room");
                    self.registry.emit(EventKind::JoinSuccess, &reply.response);
                } else {
                    error!(room = %room, response = %reply.response, "unable to join room");
                    self.state.clear_room_if(join_ref);
                    self.purge_channel(join_ref);
                    self.registry.emit(EventKind::JoinError, &reply.response);
                }
            }
            ReplyPurpose::Push { event } => {
                if reply.is_ok() {
                    debug!(event = %event, response = %reply.response, "event sent");
                } else {
                    warn!(event = %event, response = %reply.response, "failed to send event");
                }
            }
            ReplyPurpose::Leave { room } => {
                debug!(room = %room, ok = reply.is_ok(), "leave acknowledged");
            }
        }
        if let Some(tx) = awaiting.tx {
            // The caller may have dropped its `PendingReply`.
            let _ = tx.send(reply);
        }
    }
}

/// A delayed-tick interval of `period`, or `None` when `period` is zero.
fn periodic_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_frame(transport: &mut impl Transport, frame: &Frame) -> Flow {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize frame: {e}");
            return Flow::Continue;
        }
    };
    match transport.send(json).await {
        Ok(()) => Flow::Continue,
        Err(e) => {
            error!("transport send error: {e}");
            Flow::Stop
        }
    }
}

/// Background loop driving one connection.
///
/// Exits when:
/// - The command channel closes (session handle dropped)
/// - The shutdown signal fires (`disconnect`)
/// - A heartbeat goes unanswered for a whole interval
/// - The transport returns `None` or an error
///
/// Awaited replies older than the dispatcher's push timeout are swept once
/// per timeout period.
pub(crate) async fn socket_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<Outgoing>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut dispatcher: Dispatcher,
    heartbeat_interval: Duration,
) {
    debug!("socket loop started");
    let mut heartbeat = periodic_timer(heartbeat_interval);
    let mut sweep = periodic_timer(dispatcher.push_timeout);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Outgoing { frame, awaiting }) => {
                        debug!(topic = %frame.topic, event = %frame.event, "sending frame");
                        dispatcher.track(&frame, awaiting);
                        if let Flow::Stop = send_frame(&mut transport, &frame).await {
                            break;
                        }
                    }
                    None => {
                        debug!("command channel closed, shutting down socket loop");
                        let _ = transport.close().await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                // Flush frames queued before the signal, e.g. a final phx_leave.
                while let Ok(Outgoing { frame, awaiting }) = cmd_rx.try_recv() {
                    dispatcher.track(&frame, awaiting);
                    if let Flow::Stop = send_frame(&mut transport, &frame).await {
                        break;
                    }
                }
                let _ = transport.close().await;
                break;
            }

            _ = next_tick(&mut sweep) => dispatcher.expire(Instant::now()),

            _ = next_tick(&mut heartbeat) => {
                if let Some(missed) = dispatcher.heartbeat_ref.take() {
                    warn!(msg_ref = %missed, "heartbeat timeout, closing socket");
                    let _ = transport.close().await;
                    break;
                }
                let msg_ref = dispatcher.state.next_ref();
                let frame = Frame::heartbeat(msg_ref.clone());
                dispatcher.heartbeat_ref = Some(msg_ref);
                if let Flow::Stop = send_frame(&mut transport, &frame).await {
                    break;
                }
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<Frame>(&text) {
                        Ok(frame) => dispatcher.handle_frame(frame),
                        Err(e) => warn!("failed to decode frame: {e}, raw: {text}"),
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        break;
                    }
                }
            }
        }
    }

    dispatcher.state.mark_disconnected();
    debug!("socket loop exited");
}

/// Build the `phx_reply` answering `to`.
#[cfg(test)]
pub(crate) fn reply_frame(to: &Frame, status: &str, response: serde_json::Value) -> Frame {
    let mut frame = Frame::new(
        to.topic.clone(),
        PHX_REPLY,
        serde_json::json!({ "status": status, "response": response }),
    );
    frame.join_ref = to.join_ref.clone();
    frame.msg_ref = to.msg_ref.clone();
    frame
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{empty_payload, PHX_JOIN};
    use serde_json::{json, Value};

    fn joined(code: &str, join_ref: &str) -> (Arc<SharedState>, Arc<CallbackRegistry>, Frame) {
        let state = Arc::new(SharedState::new());
        let topic = format!("game:{code}");
        *state.room() = Some(RoomState {
            code: code.into(),
            topic: topic.clone(),
            join_ref: join_ref.into(),
            presence: Presence::new(),
        });
        let join = Frame::new(topic, PHX_JOIN, empty_payload())
            .with_join_ref(join_ref)
            .with_ref(join_ref);
        (state, CallbackRegistry::new(), join)
    }

    fn dispatcher_for(state: &Arc<SharedState>, registry: &Arc<CallbackRegistry>) -> Dispatcher {
        Dispatcher::new(Arc::clone(state), Arc::clone(registry), Duration::ZERO)
    }

    fn collect(
        registry: &Arc<CallbackRegistry>,
        kind: EventKind,
    ) -> (crate::Subscription, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = registry.subscribe(
            kind,
            Arc::new(move |v: &Value| sink.lock().unwrap().push(v.clone())),
        );
        (sub, seen)
    }

    fn join_awaiting(code: &str, join_ref: &str) -> (AwaitingReply, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let awaiting = AwaitingReply {
            purpose: ReplyPurpose::Join {
                room: code.into(),
                join_ref: join_ref.into(),
            },
            tx: Some(tx),
        };
        (awaiting, rx)
    }

    #[test]
    fn next_ref_is_monotonic() {
        let state = SharedState::new();
        assert_eq!(state.next_ref(), "1");
        assert_eq!(state.next_ref(), "2");
    }

    #[test]
    fn join_ok_fires_success_callbacks() {
        let (state, registry, join) = joined("ROOM1", "1");
        let (_ok, ok_seen) = collect(&registry, EventKind::JoinSuccess);
        let (_err, err_seen) = collect(&registry, EventKind::JoinError);
        let mut dispatcher = dispatcher_for(&state, &registry);

        let (awaiting, mut rx) = join_awaiting("ROOM1", "1");
        dispatcher.track(&join, Some(awaiting));
        dispatcher.handle_frame(reply_frame(&join, "ok", json!({"score": 0})));

        assert_eq!(*ok_seen.lock().unwrap(), vec![json!({"score": 0})]);
        assert!(err_seen.lock().unwrap().is_empty());
        assert!(rx.try_recv().unwrap().is_ok());
        assert!(state.channel().is_some());
    }

    #[test]
    fn join_error_rolls_back_and_fires_error_callbacks() {
        let (state, registry, join) = joined("ROOM1", "1");
        let (_err, err_seen) = collect(&registry, EventKind::JoinError);
        let mut dispatcher = dispatcher_for(&state, &registry);

        let (awaiting, mut rx) = join_awaiting("ROOM1", "1");
        dispatcher.track(&join, Some(awaiting));
        dispatcher.handle_frame(reply_frame(&join, "error", json!({"reason": "full"})));

        assert_eq!(*err_seen.lock().unwrap(), vec![json!({"reason": "full"})]);
        assert!(state.channel().is_none());
        assert!(!rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn stale_join_reply_resolves_without_callbacks() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let (_ok, ok_seen) = collect(&registry, EventKind::JoinSuccess);
        let mut dispatcher = dispatcher_for(&state, &registry);

        let (awaiting, mut rx) = join_awaiting("OLD", "0");
        let old_join = Frame::new("game:OLD", PHX_JOIN, empty_payload())
            .with_join_ref("0")
            .with_ref("0");
        dispatcher.track(&old_join, Some(awaiting));
        dispatcher.handle_frame(reply_frame(&old_join, "ok", json!({})));

        assert!(ok_seen.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_ok());
        assert!(state.channel().is_some());
    }

    #[test]
    fn inbound_events_on_current_topic_are_dispatched() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let (_sub, seen) = collect(&registry, EventKind::DrawingMove);
        let mut dispatcher = Dispatcher::new(state, Arc::clone(&registry), Duration::ZERO);

        dispatcher.handle_frame(Frame::new("game:ROOM1", "drawing_move", json!({"x": 3, "y": 4})));
        dispatcher.handle_frame(Frame::new("game:OTHER", "drawing_move", json!({"x": 9, "y": 9})));

        assert_eq!(*seen.lock().unwrap(), vec![json!({"x": 3, "y": 4})]);
    }

    #[test]
    fn outbound_only_names_are_not_dispatched() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let (_sub, seen) = collect(&registry, EventKind::GameStarted);
        let mut dispatcher = Dispatcher::new(state, Arc::clone(&registry), Duration::ZERO);

        dispatcher.handle_frame(Frame::new("game:ROOM1", "start_game", json!({})));
        dispatcher.handle_frame(Frame::new("game:ROOM1", "game_started", json!({"round": 1})));

        assert_eq!(*seen.lock().unwrap(), vec![json!({"round": 1})]);
    }

    #[test]
    fn stale_phx_close_is_ignored() {
        let (state, registry, _join) = joined("ROOM1", "5");
        let mut dispatcher = Dispatcher::new(Arc::clone(&state), registry, Duration::ZERO);

        dispatcher.handle_frame(Frame::new("game:ROOM1", PHX_CLOSE, json!({})).with_join_ref("4"));
        assert!(state.channel().is_some());

        dispatcher.handle_frame(Frame::new("game:ROOM1", PHX_CLOSE, json!({})).with_join_ref("5"));
        assert!(state.channel().is_none());
    }

    #[test]
    fn presence_frames_update_roster_and_notify() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        let _sub = registry.subscribe_presence(Arc::new(move |roster: &PresenceList| {
            sink.lock().unwrap().push(roster.len());
        }));
        let mut dispatcher = dispatcher_for(&state, &registry);

        dispatcher.handle_frame(Frame::new(
            "game:ROOM1",
            PRESENCE_STATE,
            json!({"u1": {"metas": [{"phx_ref": "a"}]}}),
        ));
        dispatcher.handle_frame(Frame::new(
            "game:ROOM1",
            PRESENCE_DIFF,
            json!({"joins": {"u2": {"metas": [{"phx_ref": "b"}]}}, "leaves": {}}),
        ));

        assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
        let roster = state.room().as_ref().unwrap().presence.list().clone();
        assert!(roster.contains_key("u1") && roster.contains_key("u2"));
    }

    #[test]
    fn heartbeat_reply_clears_outstanding_ref() {
        let state = Arc::new(SharedState::new());
        let mut dispatcher = Dispatcher::new(state, CallbackRegistry::new(), Duration::ZERO);
        dispatcher.heartbeat_ref = Some("9".into());

        let beat = Frame::heartbeat("9");
        dispatcher.handle_frame(reply_frame(&beat, "ok", json!({})));

        assert!(dispatcher.heartbeat_ref.is_none());
    }

    #[test]
    fn push_reply_is_not_routed_to_callbacks() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let (_sub, seen) = collect(&registry, EventKind::ChatMessage);
        let mut dispatcher = Dispatcher::new(state, Arc::clone(&registry), Duration::ZERO);

        let push = Frame::new("game:ROOM1", "chat_message", json!({"message": "hi"}))
            .with_join_ref("1")
            .with_ref("2");
        let (tx, mut rx) = oneshot::channel();
        dispatcher.track(
            &push,
            Some(AwaitingReply {
                purpose: ReplyPurpose::Push {
                    event: "chat_message".into(),
                },
                tx: Some(tx),
            }),
        );
        dispatcher.handle_frame(reply_frame(&push, "error", json!({"reason": "muted"})));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(rx.try_recv().unwrap().response, json!({"reason": "muted"}));
    }

    fn push_awaiting(event: &str) -> (AwaitingReply, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let awaiting = AwaitingReply {
            purpose: ReplyPurpose::Push {
                event: event.into(),
            },
            tx: Some(tx),
        };
        (awaiting, rx)
    }

    fn push_frame(join_ref: &str, msg_ref: u64) -> Frame {
        Frame::new("game:ROOM1", "drawing_move", json!({"x": msg_ref, "y": 0}))
            .with_join_ref(join_ref)
            .with_ref(msg_ref.to_string())
    }

    fn leave_frame(join_ref: &str, msg_ref: &str) -> (Frame, AwaitingReply) {
        let frame = Frame::new("game:ROOM1", PHX_LEAVE, empty_payload())
            .with_join_ref(join_ref)
            .with_ref(msg_ref);
        let awaiting = AwaitingReply {
            purpose: ReplyPurpose::Leave {
                room: "ROOM1".into(),
            },
            tx: None,
        };
        (frame, awaiting)
    }

    #[test]
    fn leave_drops_unanswered_pushes_of_that_channel() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let mut dispatcher = dispatcher_for(&state, &registry);

        let (first, mut first_rx) = push_awaiting("drawing_move");
        dispatcher.track(&push_frame("1", 2), Some(first));
        for msg_ref in 3..10_002 {
            let (awaiting, _rx) = push_awaiting("drawing_move");
            dispatcher.track(&push_frame("1", msg_ref), Some(awaiting));
        }
        assert_eq!(dispatcher.pending_len(), 10_000);

        let (leave, awaiting) = leave_frame("1", "leave");
        dispatcher.track(&leave, Some(awaiting));

        assert_eq!(dispatcher.pending_len(), 1, "only the leave itself is awaited");
        assert!(matches!(
            first_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn leave_keeps_replies_of_other_channels() {
        let (state, registry, _join) = joined("ROOM1", "5");
        let mut dispatcher = dispatcher_for(&state, &registry);

        let (old, _old_rx) = push_awaiting("chat_message");
        dispatcher.track(&push_frame("4", 10), Some(old));
        let (current, _current_rx) = push_awaiting("chat_message");
        dispatcher.track(&push_frame("5", 11), Some(current));

        let (leave, awaiting) = leave_frame("4", "12");
        dispatcher.track(&leave, Some(awaiting));

        assert_eq!(dispatcher.pending_len(), 2);
        assert!(dispatcher.pending.contains_key("11"));
    }

    #[test]
    fn server_close_drops_unanswered_pushes() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let mut dispatcher = dispatcher_for(&state, &registry);
        let (awaiting, mut rx) = push_awaiting("drawing_move");
        dispatcher.track(&push_frame("1", 2), Some(awaiting));

        dispatcher.handle_frame(Frame::new("game:ROOM1", PHX_CLOSE, json!({})).with_join_ref("1"));

        assert_eq!(dispatcher.pending_len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn join_rejection_drops_pushes_sent_meanwhile() {
        let (state, registry, join) = joined("ROOM1", "1");
        let mut dispatcher = dispatcher_for(&state, &registry);
        let (pending_join, _join_rx) = join_awaiting("ROOM1", "1");
        dispatcher.track(&join, Some(pending_join));
        let (push, _push_rx) = push_awaiting("chat_message");
        dispatcher.track(&push_frame("1", 2), Some(push));

        dispatcher.handle_frame(reply_frame(&join, "error", json!({"reason": "full"})));

        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[test]
    fn replies_expire_after_push_timeout() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let timeout = Duration::from_secs(10);
        let mut dispatcher = Dispatcher::new(state, registry, timeout);
        let (awaiting, mut rx) = push_awaiting("drawing_move");
        dispatcher.track(&push_frame("1", 2), Some(awaiting));

        dispatcher.expire(Instant::now());
        assert_eq!(dispatcher.pending_len(), 1);

        dispatcher.expire(Instant::now() + timeout + Duration::from_millis(1));
        assert_eq!(dispatcher.pending_len(), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn zero_push_timeout_never_expires() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let mut dispatcher = dispatcher_for(&state, &registry);
        let (awaiting, _rx) = push_awaiting("drawing_move");
        dispatcher.track(&push_frame("1", 2), Some(awaiting));

        dispatcher.expire(Instant::now() + Duration::from_secs(3600));
        assert_eq!(dispatcher.pending_len(), 1);
    }

    #[test]
    fn early_presence_diff_waits_for_state() {
        let (state, registry, _join) = joined("ROOM1", "1");
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        let _sub = registry.subscribe_presence(Arc::new(move |roster: &PresenceList| {
            sink.lock().unwrap().push(roster.len());
        }));
        let mut dispatcher = dispatcher_for(&state, &registry);

        dispatcher.handle_frame(Frame::new(
            "game:ROOM1",
            PRESENCE_DIFF,
            json!({"joins": {"u2": {"metas": [{"phx_ref": "b"}]}}, "leaves": {}}),
        ));
        assert!(counts.lock().unwrap().is_empty());

        dispatcher.handle_frame(Frame::new(
            "game:ROOM1",
            PRESENCE_STATE,
            json!({"u1": {"metas": [{"phx_ref": "a"}]}}),
        ));

        assert_eq!(*counts.lock().unwrap(), vec![2]);
        let roster = state.room().as_ref().unwrap().presence.list().clone();
        assert_eq!(roster.keys().collect::<Vec<_>>(), vec!["u1", "u2"]);
    }

    #[test]
    fn mark_disconnected_clears_room() {
        let (state, _registry, _join) = joined("ROOM1", "1");
        state.connected.store(true, Ordering::Release);
        state.mark_disconnected();
        assert!(!state.connected.load(Ordering::Acquire));
        assert!(state.channel().is_none());
    }
}
