//! Transport and connection-provider abstractions.
//!
//! The [`Transport`] trait is a bidirectional text message channel between the
//! client and a Phoenix endpoint. Each message is one serialized channel frame,
//! so every implementation must handle framing internally (WebSocket frames,
//! long-poll bodies, an in-process queue in tests).
//!
//! Opening a transport is the job of a [`Connector`]. The session hands the
//! connector the player's authentication token and gets back a connected
//! transport; everything the connector needs beyond the token (endpoint URL,
//! TLS setup, timeouts) lives on the connector itself.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use scrawly_client::error::ScrawlyError;
//! use scrawly_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ScrawlyError> {
//!         // Send the JSON frame over your transport
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ScrawlyError>> {
//!         // Receive the next JSON frame.
//!         // Return None when the connection is closed cleanly
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ScrawlyError> {
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ScrawlyError;

/// A bidirectional text message transport carrying Phoenix channel frames.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data. Channel-based implementations (e.g., wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one serialized frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ScrawlyError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), ScrawlyError>;

    /// Receive the next serialized frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, ScrawlyError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ScrawlyError>;
}

/// Opens authenticated transports on behalf of a [`GameSession`](crate::GameSession).
///
/// A connector is reusable: the session calls [`connect`](Connector::connect)
/// again every time [`GameSession::connect`](crate::GameSession::connect) runs.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Open a connection authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns whatever error prevented the connection from being established.
    async fn connect(&self, token: &str) -> Result<Self::Transport, ScrawlyError>;
}
