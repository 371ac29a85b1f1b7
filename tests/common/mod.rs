#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Scrawly client integration tests.
//!
//! [`MockConnector`] hands every connection's server half to the test as a
//! [`MockServer`], which reads the frames the session sent and injects
//! replies, broadcasts and presence updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use scrawly_client::protocol::{Frame, PHX_REPLY};
use scrawly_client::{Connector, GameSession, ScrawlyError, SessionConfig, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// How long a test waits for a frame or callback before failing.
pub const WAIT: Duration = Duration::from_secs(2);

// ── MockTransport ───────────────────────────────────────────────────

/// Client half of an in-process connection.
pub struct MockTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ScrawlyError> {
        self.tx
            .send(message)
            .map_err(|e| ScrawlyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ScrawlyError>> {
        // `None` once the server half is dropped.
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ScrawlyError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── MockServer ──────────────────────────────────────────────────────

/// Server half of an in-process connection.
pub struct MockServer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
    /// Whether the client closed its transport.
    pub closed: Arc<AtomicBool>,
}

impl MockServer {
    /// Wait for the next frame the client sent.
    pub async fn next_frame(&mut self) -> Frame {
        let text = tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport dropped");
        serde_json::from_str(&text).expect("client sent an invalid frame")
    }

    /// Returns the next frame if one arrives within `wait`.
    pub async fn try_next_frame(&mut self, wait: Duration) -> Option<Frame> {
        match tokio::time::timeout(wait, self.from_client.recv()).await {
            Ok(Some(text)) => Some(serde_json::from_str(&text).expect("invalid frame")),
            _ => None,
        }
    }

    /// Inject a frame as if the server sent it.
    pub fn send_frame(&self, frame: &Frame) {
        self.send_raw(serde_json::to_string(frame).unwrap());
    }

    /// Inject raw text.
    pub fn send_raw(&self, text: String) {
        self.to_client.send(text).expect("client transport dropped");
    }

    /// Reply to `request` with `status` and `response`.
    pub fn reply(&self, request: &Frame, status: &str, response: Value) {
        let mut frame = Frame::new(
            request.topic.clone(),
            PHX_REPLY,
            json!({ "status": status, "response": response }),
        );
        frame.join_ref = request.join_ref.clone();
        frame.msg_ref = request.msg_ref.clone();
        self.send_frame(&frame);
    }

    /// Broadcast `event` on `topic` without refs, like a Phoenix broadcast.
    pub fn broadcast(&self, topic: &str, event: &str, payload: Value) {
        self.send_frame(&Frame::new(topic, event, payload));
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Connector producing in-process connections.
pub struct MockConnector {
    servers: mpsc::UnboundedSender<MockServer>,
    /// Tokens passed to every `connect` call, in order.
    pub tokens: Arc<StdMutex<Vec<String>>>,
}

/// Receives the server half of each connection the session opens.
pub struct ServerQueue {
    rx: mpsc::UnboundedReceiver<MockServer>,
}

impl ServerQueue {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> MockServer {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }
}

impl MockConnector {
    pub fn new() -> (Self, ServerQueue, Arc<StdMutex<Vec<String>>>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let tokens = Arc::new(StdMutex::new(Vec::new()));
        let connector = Self {
            servers,
            tokens: Arc::clone(&tokens),
        };
        (connector, ServerQueue { rx }, tokens)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, token: &str) -> Result<MockTransport, ScrawlyError> {
        self.tokens.lock().unwrap().push(token.to_string());

        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let server = MockServer {
            from_client,
            to_client,
            closed: Arc::clone(&closed),
        };
        self.servers
            .send(server)
            .map_err(|_| ScrawlyError::TransportClosed)?;

        Ok(MockTransport {
            tx: client_tx,
            rx: client_rx,
            closed,
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// A session with heartbeats disabled so tests only see the frames they cause.
pub fn new_session() -> (
    GameSession<MockConnector>,
    ServerQueue,
    Arc<StdMutex<Vec<String>>>,
) {
    let (connector, queue, tokens) = MockConnector::new();
    let config = SessionConfig::default()
        .with_heartbeat_interval(Duration::ZERO)
        .with_shutdown_timeout(Duration::from_millis(500));
    (GameSession::new(connector, config), queue, tokens)
}

/// Forward every payload a callback receives into a channel.
pub fn payload_sink() -> (
    impl Fn(&Value) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Value>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb = move |payload: &Value| {
        let _ = tx.send(payload.clone());
    };
    (cb, rx)
}

/// Wait for the next value delivered to a sink.
pub async fn next_value<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("sink dropped")
}

/// Returns `true` if nothing arrives on `rx` within a short grace period.
pub async fn stays_empty<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> bool {
    tokio::time::timeout(Duration::from_millis(100), rx.recv())
        .await
        .is_err()
}

/// Connect, join `room` and acknowledge the join with `response`.
pub async fn joined_session(
    room: &str,
    response: Value,
) -> (GameSession<MockConnector>, MockServer, ServerQueue) {
    let (mut session, mut queue, _tokens) = new_session();
    session.connect("tok").await.unwrap();
    let mut server = queue.accept().await;

    let pending = session.join_room(room).unwrap();
    let join = server.next_frame().await;
    server.reply(&join, "ok", response);
    pending.await.unwrap();

    (session, server, queue)
}
