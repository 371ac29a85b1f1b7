//! # Loopback Session Example
//!
//! Shows how to implement [`Connector`] and [`Transport`] with an in-process
//! channel pair and a tiny fake room server. This is useful for:
//!
//! - **Testing**: exercise game logic without a Phoenix server
//! - **Custom backends**: adapt any I/O layer that moves text frames
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_session
//! ```

use std::time::Duration;

use async_trait::async_trait;
use scrawly_client::protocol::{Frame, PHX_JOIN, PHX_LEAVE, PHX_REPLY, PRESENCE_STATE};
use scrawly_client::{Connector, GameSession, ScrawlyError, SessionConfig, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), ScrawlyError> {
        self.tx
            .send(message)
            .map_err(|e| ScrawlyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ScrawlyError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ScrawlyError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that spawns a fake room server per connection
// ─────────────────────────────────────────────────────────────────────

/// Opens loopback connections answered by [`fake_room_server`].
pub struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&self, token: &str) -> Result<LoopbackTransport, ScrawlyError> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_room_server(token.to_string(), server_rx, server_tx));
        Ok(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        })
    }
}

fn reply(to: &Frame, response: Value) -> Frame {
    let mut frame = Frame::new(
        to.topic.clone(),
        PHX_REPLY,
        json!({ "status": "ok", "response": response }),
    );
    frame.join_ref = to.join_ref.clone();
    frame.msg_ref = to.msg_ref.clone();
    frame
}

/// Accepts every join, echoes chat lines as broadcasts, acks everything else.
async fn fake_room_server(
    token: String,
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
) {
    let send = |frame: &Frame| match serde_json::to_string(frame) {
        Ok(text) => tx.send(text).is_ok(),
        Err(_) => false,
    };

    while let Some(text) = rx.recv().await {
        let Ok(frame) = serde_json::from_str::<Frame>(&text) else {
            continue;
        };
        let ok = match frame.event.as_str() {
            PHX_JOIN => {
                let mut roster = serde_json::Map::new();
                roster.insert(token.clone(), json!({ "metas": [{ "phx_ref": "p1" }] }));
                send(&reply(&frame, json!({ "player": token })))
                    && send(&Frame::new(
                        frame.topic.clone(),
                        PRESENCE_STATE,
                        Value::Object(roster),
                    ))
            }
            PHX_LEAVE => send(&reply(&frame, json!({}))),
            "chat_message" => {
                send(&reply(&frame, json!({})))
                    && send(&Frame::new(
                        frame.topic.clone(),
                        "chat_message",
                        frame.payload.clone(),
                    ))
            }
            _ => send(&reply(&frame, json!({}))),
        };
        if !ok {
            break;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Drive a session against it
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut session = GameSession::new(LoopbackConnector, SessionConfig::default());

    let (chat_tx, mut chat_rx) = mpsc::unbounded_channel::<Value>();
    let _chat = session.on_chat_message(move |payload: &Value| {
        let _ = chat_tx.send(payload.clone());
    });
    session
        .on_presence_update(|roster| println!("[presence] {} player(s)", roster.len()))
        .detach();

    session.connect("loopback-player").await?;
    let joined = session.join_room("DEMO")?.await?;
    println!("[join] {joined}");

    session.send_chat_message("is it a cat?")?.await?;
    if let Ok(Some(echo)) = tokio::time::timeout(Duration::from_secs(1), chat_rx.recv()).await {
        println!("[chat] {echo}");
    }

    session.disconnect().await;
    println!("done");
    Ok(())
}
