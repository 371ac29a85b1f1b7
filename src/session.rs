//! Room session for the Scrawly drawing game.
//!
//! [`GameSession`] is an explicit session object owned by the caller. It opens
//! a socket through a [`Connector`], joins at most one `game:<code>` channel at
//! a time and fans inbound room events out to registered callbacks.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:4000/socket");
//! let mut session = GameSession::new(connector, SessionConfig::default());
//!
//! session
//!     .on_chat_message(|payload| println!("chat: {payload}"))
//!     .detach();
//!
//! session.connect("player-token").await?;
//! session.join_room("ROOM1")?.await?;
//! session.send_chat_message("hello")?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScrawlyError};
use crate::presence::{Presence, PresenceList};
use crate::protocol::{
    empty_payload, DrawingPoint, Frame, GameAction, Reply, PHX_JOIN, PHX_LEAVE,
};
use crate::registry::{CallbackRegistry, EventKind, Subscription};
use crate::socket::{
    socket_loop, AwaitingReply, Dispatcher, Outgoing, ReplyPurpose, RoomState, SharedState,
};
use crate::transport::Connector;

/// Default interval between socket heartbeats.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default time to wait for the reply to a join, push or leave.
const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default prefix joined with a room code to form its topic.
const DEFAULT_TOPIC_PREFIX: &str = "game:";

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`GameSession`].
///
/// # Example
///
/// ```
/// use scrawly_client::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::default()
///     .with_heartbeat_interval(Duration::from_secs(15))
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.topic_prefix, "game:");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between heartbeats on the `phoenix` topic.
    ///
    /// A heartbeat still unanswered when the next one is due closes the
    /// socket. Defaults to **30 seconds**; zero disables heartbeats.
    pub heartbeat_interval: Duration,
    /// Timeout for the graceful shutdown performed by
    /// [`GameSession::disconnect`]. If it expires the socket task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// How long the socket waits for the reply to a join, push or leave
    /// before giving up on it; the [`PendingReply`] then resolves to
    /// [`ScrawlyError::ReplyDropped`].
    ///
    /// Defaults to **10 seconds**; zero waits forever.
    pub push_timeout: Duration,
    /// Prefix for room topics. Defaults to `"game:"`.
    pub topic_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
        }
    }
}

impl SessionConfig {
    /// Set the heartbeat interval. Zero disables heartbeats.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set how long replies are awaited. Zero waits forever.
    #[must_use]
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    /// Set the topic prefix used to derive a room's channel topic.
    #[must_use]
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }
}

// ── PendingReply ────────────────────────────────────────────────────

/// The server's answer to a join or push, resolved asynchronously.
///
/// Awaiting yields the reply's `response` on an `"ok"` status,
/// [`ScrawlyError::Rejected`] on `"error"`, and
/// [`ScrawlyError::ReplyDropped`] if the socket closed first. Dropping the
/// value is fine: the outcome is still logged by the socket loop. A reply
/// that never arrives within [`SessionConfig::push_timeout`], or that belongs
/// to a room left in the meantime, is also reported as `ReplyDropped`.
#[derive(Debug)]
pub struct PendingReply {
    event: String,
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    /// The event this reply answers (`phx_join` for room joins).
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Await the reply for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrawlyError::Timeout`] if the deadline elapses, or any
    /// error awaiting the reply directly may return.
    pub async fn timeout(self, timeout: Duration) -> Result<Value> {
        tokio::time::timeout(timeout, self)
            .await
            .map_err(|_| ScrawlyError::Timeout)?
    }
}

impl Future for PendingReply {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(reply)) if reply.is_ok() => Poll::Ready(Ok(reply.response)),
            Poll::Ready(Ok(reply)) => Poll::Ready(Err(ScrawlyError::Rejected {
                event: this.event.clone(),
                response: reply.response,
            })),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ScrawlyError::ReplyDropped)),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Handle to the background socket loop of one connection.
struct SocketHandle {
    cmd_tx: mpsc::UnboundedSender<Outgoing>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

/// Client session for Scrawly game rooms.
///
/// `connect` / `disconnect` and `join_room` / `leave_room` toggle the socket
/// and the room channel within the same session value; callbacks registered
/// through the `on_*` methods survive both.
pub struct GameSession<C: Connector> {
    connector: C,
    config: SessionConfig,
    state: Arc<SharedState>,
    registry: Arc<CallbackRegistry>,
    socket: Option<SocketHandle>,
}

impl<C: Connector> GameSession<C> {
    /// Create a disconnected session.
    pub fn new(connector: C, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            state: Arc::new(SharedState::new()),
            registry: CallbackRegistry::new(),
            socket: None,
        }
    }

    /// The session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// Open a socket authenticated with `token`.
    ///
    /// An existing connection is torn down first, including leaving the
    /// current room.
    ///
    /// # Errors
    ///
    /// Returns the error the [`Connector`] produced if the socket could not
    /// be opened. The session is left disconnected in that case.
    pub async fn connect(&mut self, token: &str) -> Result<()> {
        if self.socket.is_some() {
            self.disconnect().await;
        }

        let transport = self.connector.connect(token).await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.state),
            Arc::clone(&self.registry),
            self.config.push_timeout,
        );

        self.state.connected.store(true, Ordering::Release);
        let task = tokio::spawn(socket_loop(
            transport,
            cmd_rx,
            shutdown_rx,
            dispatcher,
            self.config.heartbeat_interval,
        ));

        self.socket = Some(SocketHandle {
            cmd_tx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        });
        info!("game socket connected");
        Ok(())
    }

    /// Leave the current room, then close the socket.
    ///
    /// The socket loop gets [`SessionConfig::shutdown_timeout`] to flush the
    /// leave and close the transport before it is aborted.
    pub async fn disconnect(&mut self) {
        self.leave_room();

        let Some(mut socket) = self.socket.take() else {
            return;
        };
        debug!("GameSession: disconnect requested");

        if let Some(tx) = socket.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = socket.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("socket loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("socket loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("socket loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
        info!("game socket disconnected");
    }

    // ── Room lifecycle ──────────────────────────────────────────────

    /// Join the room `room_code`, leaving the current room first.
    ///
    /// The join reply is fanned out to the `on_join_success` or
    /// `on_join_error` callbacks and also resolves the returned
    /// [`PendingReply`]. A rejected join clears the room again.
    ///
    /// # Errors
    ///
    /// Returns [`ScrawlyError::NotConnected`] without sending anything if
    /// the socket is not connected.
    pub fn join_room(&mut self, room_code: impl Into<String>) -> Result<PendingReply> {
        let room_code = room_code.into();
        if !self.is_connected() {
            error!(room = %room_code, "socket not connected, call connect() first");
            return Err(ScrawlyError::NotConnected);
        }

        if self.is_in_room() {
            self.leave_room();
        }

        let join_ref = self.state.next_ref();
        let topic = format!("{}{room_code}", self.config.topic_prefix);
        *self.state.room() = Some(RoomState {
            code: room_code.clone(),
            topic: topic.clone(),
            join_ref: join_ref.clone(),
            presence: Presence::new(),
        });

        let frame = Frame::new(topic, PHX_JOIN, empty_payload())
            .with_join_ref(join_ref.clone())
            .with_ref(join_ref.clone());
        let purpose = ReplyPurpose::Join {
            room: room_code,
            join_ref,
        };
        self.request(frame, purpose).inspect_err(|_| {
            self.state.take_room();
        })
    }

    /// Leave the current room. Does nothing when no room is joined.
    pub fn leave_room(&mut self) {
        let Some(room) = self.state.take_room() else {
            return;
        };

        let frame = Frame::new(room.topic, PHX_LEAVE, empty_payload())
            .with_join_ref(room.join_ref)
            .with_ref(self.state.next_ref());
        let awaiting = AwaitingReply {
            purpose: ReplyPurpose::Leave {
                room: room.code.clone(),
            },
            tx: None,
        };
        if let Err(e) = self.queue(Outgoing {
            frame,
            awaiting: Some(awaiting),
        }) {
            debug!(room = %room.code, "leave not sent: {e}");
        }
        info!(room = %room.code, "left room");
    }

    // ── Outbound game actions ───────────────────────────────────────

    /// Push `event` with `payload` on the current room channel.
    ///
    /// # Errors
    ///
    /// Returns [`ScrawlyError::NotInRoom`] without sending anything if no
    /// room is joined, or [`ScrawlyError::NotConnected`] if the socket has
    /// gone away.
    pub fn push_event(&self, event: &str, payload: Value) -> Result<PendingReply> {
        let Some((topic, join_ref)) = self.state.channel() else {
            error!(event = %event, "not connected to a room");
            return Err(ScrawlyError::NotInRoom);
        };

        let frame = Frame::new(topic, event, payload)
            .with_join_ref(join_ref)
            .with_ref(self.state.next_ref());
        self.request(
            frame,
            ReplyPurpose::Push {
                event: event.to_string(),
            },
        )
    }

    /// Push a typed [`GameAction`].
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn perform(&self, action: GameAction) -> Result<PendingReply> {
        self.push_event(action.event_name(), action.payload())
    }

    /// Pen down at `(x, y)`.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn send_drawing_start(&self, x: f64, y: f64) -> Result<PendingReply> {
        self.perform(GameAction::DrawingStart(DrawingPoint { x, y }))
    }

    /// Pen moved to `(x, y)`.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn send_drawing_move(&self, x: f64, y: f64) -> Result<PendingReply> {
        self.perform(GameAction::DrawingMove(DrawingPoint { x, y }))
    }

    /// Pen lifted.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn send_drawing_stop(&self) -> Result<PendingReply> {
        self.perform(GameAction::DrawingStop {})
    }

    /// Send a chat line.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn send_chat_message(&self, message: impl Into<String>) -> Result<PendingReply> {
        self.perform(GameAction::ChatMessage {
            message: message.into(),
        })
    }

    /// Ask the server to start the game.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn start_game(&self) -> Result<PendingReply> {
        self.perform(GameAction::StartGame {})
    }

    /// Ask the server to end the game.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn end_game(&self) -> Result<PendingReply> {
        self.perform(GameAction::EndGame {})
    }

    /// Start round `round_number`.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn start_round(&self, round_number: u32) -> Result<PendingReply> {
        self.perform(GameAction::StartRound { round_number })
    }

    /// End round `round_number`.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn end_round(&self, round_number: u32) -> Result<PendingReply> {
        self.perform(GameAction::EndRound { round_number })
    }

    /// Hand the pen to `drawer_id`.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub fn change_turn(&self, drawer_id: impl Into<Value>) -> Result<PendingReply> {
        self.perform(GameAction::ChangeTurn {
            drawer_id: drawer_id.into(),
        })
    }

    // ── Callback registration ───────────────────────────────────────

    fn on(
        &self,
        kind: EventKind,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.registry.subscribe(kind, Arc::new(callback))
    }

    /// Another player put the pen down.
    pub fn on_drawing_start(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::DrawingStart, cb)
    }

    /// Another player's pen moved.
    pub fn on_drawing_move(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::DrawingMove, cb)
    }

    /// Another player lifted the pen.
    pub fn on_drawing_stop(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::DrawingStop, cb)
    }

    /// A chat line arrived.
    pub fn on_chat_message(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::ChatMessage, cb)
    }

    /// The room's presence roster changed; receives the full snapshot.
    pub fn on_presence_update(
        &self,
        cb: impl Fn(&PresenceList) + Send + Sync + 'static,
    ) -> Subscription {
        self.registry.subscribe_presence(Arc::new(cb))
    }

    /// The server accepted a join; receives the reply's response.
    pub fn on_join_success(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::JoinSuccess, cb)
    }

    /// The server rejected a join; receives the reply's response.
    pub fn on_join_error(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::JoinError, cb)
    }

    pub fn on_game_started(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::GameStarted, cb)
    }

    pub fn on_game_ended(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::GameEnded, cb)
    }

    pub fn on_round_started(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::RoundStarted, cb)
    }

    pub fn on_round_ended(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::RoundEnded, cb)
    }

    pub fn on_turn_changed(&self, cb: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.on(EventKind::TurnChanged, cb)
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the socket is believed to be open.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` if a room channel is currently joined.
    pub fn is_in_room(&self) -> bool {
        self.state.room().is_some()
    }

    /// The code of the current room.
    pub fn room_code(&self) -> Option<String> {
        self.state.room().as_ref().map(|room| room.code.clone())
    }

    /// The channel topic of the current room.
    pub fn topic(&self) -> Option<String> {
        self.state.room().as_ref().map(|room| room.topic.clone())
    }

    /// The current presence roster; empty when no room is joined.
    pub fn presence(&self) -> PresenceList {
        self.state
            .room()
            .as_ref()
            .map(|room| room.presence.list().clone())
            .unwrap_or_default()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue `frame` and hand back a reply future for it.
    fn request(&self, frame: Frame, purpose: ReplyPurpose) -> Result<PendingReply> {
        let (tx, rx) = oneshot::channel();
        let event = frame.event.clone();
        self.queue(Outgoing {
            frame,
            awaiting: Some(AwaitingReply {
                purpose,
                tx: Some(tx),
            }),
        })?;
        Ok(PendingReply { event, rx })
    }

    fn queue(&self, outgoing: Outgoing) -> Result<()> {
        if !self.is_connected() {
            return Err(ScrawlyError::NotConnected);
        }
        let Some(socket) = &self.socket else {
            return Err(ScrawlyError::NotConnected);
        };
        socket
            .cmd_tx
            .send(outgoing)
            .map_err(|_| ScrawlyError::NotConnected)
    }
}

impl<C: Connector> std::fmt::Debug for GameSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("connected", &self.is_connected())
            .field("room_code", &self.room_code())
            .field("has_task", &self.socket.is_some())
            .finish()
    }
}

impl<C: Connector> Drop for GameSession<C> {
    fn drop(&mut self) {
        // No executor is available to drive a graceful close here.
        if let Some(task) = self.socket.as_mut().and_then(|s| s.task.take()) {
            task.abort();
        }
    }
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
    use crate::protocol::ReplyStatus;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Connector that refuses every connection and counts attempts.
    struct RefusingConnector {
        calls: Arc<AtomicUsize>,
    }

    struct NeverTransport;

    #[async_trait]
    impl Transport for NeverTransport {
        async fn send(&mut self, _message: String) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        type Transport = NeverTransport;

        async fn connect(&self, _token: &str) -> Result<NeverTransport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ScrawlyError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        }
    }

    fn session() -> (GameSession<RefusingConnector>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let connector = RefusingConnector {
            calls: Arc::clone(&calls),
        };
        (GameSession::new(connector, SessionConfig::default()), calls)
    }

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.push_timeout, Duration::from_secs(10));
        assert_eq!(config.topic_prefix, "game:");
    }

    #[test]
    fn config_builder_methods() {
        let config = SessionConfig::default()
            .with_heartbeat_interval(Duration::ZERO)
            .with_shutdown_timeout(Duration::from_millis(250))
            .with_push_timeout(Duration::from_secs(2))
            .with_topic_prefix("lobby:");
        assert!(config.heartbeat_interval.is_zero());
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
        assert_eq!(config.push_timeout, Duration::from_secs(2));
        assert_eq!(config.topic_prefix, "lobby:");
    }

    #[test]
    fn join_room_while_disconnected_fails_without_connecting() {
        let (mut session, calls) = session();
        let result = session.join_room("ROOM1");
        assert!(matches!(result, Err(ScrawlyError::NotConnected)));
        assert!(!session.is_in_room());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn push_without_room_is_rejected() {
        let (session, _calls) = session();
        assert!(matches!(
            session.send_chat_message("hi"),
            Err(ScrawlyError::NotInRoom)
        ));
        assert!(matches!(
            session.push_event("drawing_stop", json!({})),
            Err(ScrawlyError::NotInRoom)
        ));
    }

    #[test]
    fn accessors_are_empty_when_idle() {
        let (session, _calls) = session();
        assert!(!session.is_connected());
        assert!(session.room_code().is_none());
        assert!(session.topic().is_none());
        assert!(session.presence().is_empty());
    }

    #[tokio::test]
    async fn failed_connect_surfaces_connector_error() {
        let (mut session, calls) = session();
        let err = session.connect("tok").await.unwrap_err();
        assert!(matches!(err, ScrawlyError::Io(_)));
        assert!(!session.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_a_no_op() {
        let (mut session, _calls) = session();
        session.disconnect().await;
        session.leave_room();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn pending_reply_resolves_ok_response() {
        let (tx, rx) = oneshot::channel();
        let pending = PendingReply {
            event: "chat_message".into(),
            rx,
        };
        tx.send(Reply {
            status: ReplyStatus::Ok,
            response: json!({"id": 1}),
        })
        .unwrap();
        assert_eq!(pending.await.unwrap(), json!({"id": 1}));
    }

    #[test]
    fn pending_reply_wakes_when_reply_arrives() {
        let (tx, rx) = oneshot::channel();
        let mut pending = tokio_test::task::spawn(PendingReply {
            event: "drawing_stop".into(),
            rx,
        });
        tokio_test::assert_pending!(pending.poll());

        tx.send(Reply {
            status: ReplyStatus::Ok,
            response: json!({}),
        })
        .unwrap();
        assert!(pending.is_woken());
        match pending.poll() {
            Poll::Ready(Ok(response)) => assert_eq!(response, json!({})),
            other => panic!("expected a ready ok reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pending_reply_maps_error_status_to_rejected() {
        let (tx, rx) = oneshot::channel();
        let pending = PendingReply {
            event: "phx_join".into(),
            rx,
        };
        assert_eq!(pending.event(), "phx_join");
        tx.send(Reply {
            status: ReplyStatus::Error,
            response: json!({"reason": "unauthorized"}),
        })
        .unwrap();
        match pending.await {
            Err(ScrawlyError::Rejected { event, response }) => {
                assert_eq!(event, "phx_join");
                assert_eq!(response, json!({"reason": "unauthorized"}));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pending_reply_reports_dropped_socket() {
        let (tx, rx) = oneshot::channel::<Reply>();
        let pending = PendingReply {
            event: "drawing_move".into(),
            rx,
        };
        drop(tx);
        assert!(matches!(pending.await, Err(ScrawlyError::ReplyDropped)));
    }

    #[tokio::test]
    async fn pending_reply_timeout() {
        let (_tx, rx) = oneshot::channel::<Reply>();
        let pending = PendingReply {
            event: "end_game".into(),
            rx,
        };
        let result = pending.timeout(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ScrawlyError::Timeout)));
    }

    #[test]
    fn debug_impl_for_session() {
        let (session, _calls) = session();
        let debug_str = format!("{session:?}");
        assert!(debug_str.contains("GameSession"));
        assert!(debug_str.contains("connected"));
    }
}
