//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries channel frames over a WebSocket connection;
//! both `ws://` and `wss://` URLs are supported through
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//! [`WebSocketConnector`] turns a socket endpoint such as
//! `wss://scrawly.example/socket` into the full Phoenix socket URL
//! (`.../socket/websocket?token=…&vsn=2.0.0`) and opens a transport for it.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), scrawly_client::ScrawlyError> {
//! use scrawly_client::{Connector, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:4000/socket");
//! let transport = connector.connect("player-token").await?;
//! # drop(transport);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::error::ScrawlyError;
use crate::protocol::PROTOCOL_VSN;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] implementation backed by a WebSocket connection.
///
/// For advanced use-cases (custom TLS, proxy, headers) construct the stream
/// yourself and use [`WebSocketTransport::from_stream`].
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe: dropping its future
/// before completion does not lose any message.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`ScrawlyError::Io`] if the URL is invalid or the connection
    /// cannot be established. When the underlying error is an I/O error its
    /// [`ErrorKind`](std::io::ErrorKind) is preserved; all other errors are
    /// mapped to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, ScrawlyError> {
        tracing::debug!("connecting to WebSocket server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            ScrawlyError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!("WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Establish a new WebSocket connection with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ScrawlyError::Timeout`] if the deadline elapses, or any
    /// error that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, ScrawlyError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| ScrawlyError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ScrawlyError> {
        if self.closed {
            return Err(ScrawlyError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| ScrawlyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ScrawlyError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(ScrawlyError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ScrawlyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ScrawlyError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens [`WebSocketTransport`]s against a Phoenix socket endpoint.
///
/// ```
/// use scrawly_client::WebSocketConnector;
///
/// let connector = WebSocketConnector::new("https://scrawly.example/socket");
/// let url = connector.socket_url("abc").unwrap();
/// assert_eq!(url, "wss://scrawly.example/socket/websocket?token=abc&vsn=2.0.0");
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// Create a connector for `endpoint`, e.g. `ws://localhost:4000/socket`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: None,
        }
    }

    /// Fail connection attempts that take longer than `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build the WebSocket URL for `token`.
    ///
    /// `http`/`https` endpoints are mapped to `ws`/`wss`, and `/websocket`
    /// is appended unless the path already ends with it.
    ///
    /// # Errors
    ///
    /// Returns [`ScrawlyError::InvalidEndpoint`] if the endpoint does not
    /// parse or uses an unsupported scheme.
    pub fn socket_url(&self, token: &str) -> Result<String, ScrawlyError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ScrawlyError::InvalidEndpoint(format!("{}: {e}", self.endpoint)))?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(ScrawlyError::InvalidEndpoint(format!(
                    "unsupported scheme {other:?}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| ScrawlyError::InvalidEndpoint(format!("cannot use scheme {scheme}")))?;

        if !url.path().ends_with("/websocket") {
            let path = format!("{}/websocket", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }

        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("vsn", PROTOCOL_VSN);

        Ok(url.into())
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, token: &str) -> Result<WebSocketTransport, ScrawlyError> {
        let url = self.socket_url(token)?;
        match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(&url, timeout).await,
            None => WebSocketTransport::connect(&url).await,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[test]
    fn socket_url_appends_websocket_token_and_vsn() {
        let connector = WebSocketConnector::new("ws://localhost:4000/socket");
        assert_eq!(
            connector.socket_url("tok").unwrap(),
            "ws://localhost:4000/socket/websocket?token=tok&vsn=2.0.0"
        );
    }

    #[test]
    fn socket_url_encodes_token() {
        let connector = WebSocketConnector::new("ws://localhost:4000/socket/");
        let url = connector.socket_url("a b&c=d").unwrap();
        assert_eq!(
            url,
            "ws://localhost:4000/socket/websocket?token=a+b%26c%3Dd&vsn=2.0.0"
        );
    }

    #[test]
    fn socket_url_keeps_existing_websocket_suffix() {
        let connector = WebSocketConnector::new("wss://scrawly.example/socket/websocket");
        assert_eq!(
            connector.socket_url("t").unwrap(),
            "wss://scrawly.example/socket/websocket?token=t&vsn=2.0.0"
        );
    }

    #[test]
    fn socket_url_rejects_bad_endpoints() {
        let relative = WebSocketConnector::new("/socket");
        assert!(matches!(
            relative.socket_url("t"),
            Err(ScrawlyError::InvalidEndpoint(_))
        ));

        let ftp = WebSocketConnector::new("ftp://scrawly.example/socket");
        assert!(matches!(
            ftp.socket_url("t"),
            Err(ScrawlyError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:1").await;
        assert!(matches!(result.unwrap_err(), ScrawlyError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address guarantees the deadline is hit first.
        let result =
            WebSocketTransport::connect_with_timeout("ws://192.0.2.1:1", Duration::from_millis(50))
                .await;
        assert!(matches!(result.unwrap_err(), ScrawlyError::Timeout));
    }

    // ── Mock-server helpers ─────────────────────────────────────────

    /// Start a local WebSocket server that records the request URI, runs
    /// `handler` on the accepted connection and returns `(ws://addr, uri)`.
    async fn start_mock_server<F, Fut>(handler: F) -> (String, Arc<StdMutex<String>>)
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let uri = Arc::new(StdMutex::new(String::new()));
        let uri_slot = Arc::clone(&uri);

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let record = move |req: &Request, resp: Response| {
                *uri_slot.lock().unwrap() = req.uri().to_string();
                Ok::<_, ErrorResponse>(resp)
            };
            let ws = tokio_tungstenite::accept_hdr_async(tcp, record)
                .await
                .unwrap();
            handler(ws).await;
        });

        (format!("ws://{addr}"), uri)
    }

    #[tokio::test]
    async fn connector_sends_token_and_vsn() {
        let (url, uri) = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(format!("{url}/socket"))
            .with_connect_timeout(Duration::from_secs(5));
        let mut transport = connector.connect("tok").await.unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
        assert_eq!(
            *uri.lock().unwrap(),
            "/socket/websocket?token=tok&vsn=2.0.0"
        );
    }

    #[tokio::test]
    async fn recv_skips_binary_frames_and_ends_on_close() {
        let (url, _uri) = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "after_binary");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let (url, _uri) =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Second close is a no-op.
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, ScrawlyError::TransportClosed));
    }

    #[tokio::test]
    async fn send_round_trip() {
        let (url, _uri) = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"[null,"1","phoenix","heartbeat",{}]"#.to_string())
            .await
            .unwrap();

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"[null,"1","phoenix","heartbeat",{}]"#);
    }
}
