//! # Scrawly Client
//!
//! Async Rust client for the rooms of the Scrawly multiplayer drawing game.
//!
//! A [`GameSession`] opens a Phoenix socket, joins one `game:<code>` channel at
//! a time and maps the game's events (drawing strokes, chat, round and turn
//! changes, presence) onto typed send methods and ordered callbacks.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//! - **Scoped callbacks**: every `on_*` registration returns a [`Subscription`]
//! - **Awaitable sends**: pushes return a [`PendingReply`] carrying the server's answer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), scrawly_client::ScrawlyError> {
//! use scrawly_client::{GameSession, SessionConfig, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:4000/socket");
//! let mut session = GameSession::new(connector, SessionConfig::default());
//!
//! session
//!     .on_drawing_move(|stroke| println!("stroke: {stroke}"))
//!     .detach();
//!
//! session.connect("player-token").await?;
//! session.join_room("ROOM1")?.await?;
//! session.send_drawing_start(10.0, 20.0)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod session;
mod socket;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use error::ScrawlyError;
pub use presence::{PresenceEntry, PresenceList};
pub use protocol::{DrawingPoint, Frame, GameAction, InboundEvent};
pub use registry::{EventKind, Subscription};
pub use session::{GameSession, PendingReply, SessionConfig};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
