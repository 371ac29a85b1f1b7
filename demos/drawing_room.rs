//! # Drawing Room Example
//!
//! Connects to a Scrawly server over WebSocket, joins a room, logs what the
//! other players do and draws a short stroke once the join is accepted.
//!
//! ## Running
//!
//! ```sh
//! # Start the Scrawly Phoenix app on localhost:4000, then:
//! SCRAWLY_TOKEN=<player token> cargo run --example drawing_room
//!
//! # Override the endpoint or the room:
//! SCRAWLY_URL=ws://my-host:4000/socket SCRAWLY_ROOM=ABCD cargo run --example drawing_room
//! ```

use scrawly_client::{GameSession, PresenceList, SessionConfig, WebSocketConnector};
use serde_json::Value;

/// Default endpoint when `SCRAWLY_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:4000/socket";

/// Default room when `SCRAWLY_ROOM` is not set.
const DEFAULT_ROOM: &str = "ROOM1";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` to see every frame.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("SCRAWLY_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let token = std::env::var("SCRAWLY_TOKEN").unwrap_or_default();
    let room = std::env::var("SCRAWLY_ROOM").unwrap_or_else(|_| DEFAULT_ROOM.to_string());

    let connector = WebSocketConnector::new(&url);
    let mut session = GameSession::new(connector, SessionConfig::default());

    // ── Callbacks ───────────────────────────────────────────────────
    session
        .on_join_success(|resp: &Value| tracing::info!("joined: {resp}"))
        .detach();
    session
        .on_join_error(|resp: &Value| tracing::error!("join rejected: {resp}"))
        .detach();
    session
        .on_drawing_start(|p: &Value| tracing::info!("pen down at {p}"))
        .detach();
    session
        .on_drawing_move(|p: &Value| tracing::debug!("pen moved to {p}"))
        .detach();
    session
        .on_drawing_stop(|_: &Value| tracing::info!("pen up"))
        .detach();
    session
        .on_chat_message(|p: &Value| tracing::info!("chat: {p}"))
        .detach();
    session
        .on_turn_changed(|p: &Value| tracing::info!("turn changed: {p}"))
        .detach();
    session
        .on_presence_update(|roster: &PresenceList| {
            let names: Vec<&str> = roster.keys().map(String::as_str).collect();
            tracing::info!("players online: {}", names.join(", "));
        })
        .detach();

    // ── Connect and join ────────────────────────────────────────────
    tracing::info!("connecting to {url}");
    session.connect(&token).await?;

    match session.join_room(room.as_str())?.await {
        Ok(_) => {
            session.send_chat_message("hello from Rust")?;
            session.send_drawing_start(10.0, 10.0)?;
            for step in 1..=5 {
                let offset = f64::from(step) * 10.0;
                session.send_drawing_move(10.0 + offset, 10.0 + offset)?;
            }
            session.send_drawing_stop()?;
        }
        Err(e) => tracing::error!("could not join {room}: {e}"),
    }

    // ── Wait for Ctrl+C or a dropped socket ────────────────────────
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {
                if !session.is_connected() {
                    tracing::warn!("socket closed");
                    break;
                }
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
