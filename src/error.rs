//! Error types for the Scrawly client.

use thiserror::Error;

/// Errors that can occur when using the Scrawly client.
#[derive(Debug, Error)]
pub enum ScrawlyError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a channel frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open socket, but the session is not connected.
    #[error("socket not connected")]
    NotConnected,

    /// Attempted to push an event but the session has not joined a room.
    #[error("not connected to a room")]
    NotInRoom,

    /// The server answered a join or push with an `"error"` reply.
    #[error("server rejected {event}: {response}")]
    Rejected {
        /// The event that was rejected (`phx_join` for room joins).
        event: String,
        /// The `response` object the server attached to the reply.
        response: serde_json::Value,
    },

    /// The socket went away before the server replied.
    #[error("reply dropped before the server answered")]
    ReplyDropped,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The socket endpoint could not be turned into a connection URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Scrawly client operations.
pub type Result<T> = std::result::Result<T, ScrawlyError>;
