//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries the JSON envelope frames as WebSocket text
//! messages. [`WebSocketConnector`] opens one per connect attempt and maps the
//! `http`/`https` endpoints users type into `ws`/`wss`. TLS is handled
//! transparently via [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), imposter_client::SessionError> {
//! use imposter_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:5050/").await?;
//! transport.send(r#"{"event":"join","data":{"name":"Alice"}}"#.to_string()).await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::endpoint::Endpoint;
use crate::error::SessionError;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
///
/// Made public so that callers can construct a [`WebSocketTransport`] from an
/// existing stream via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] implementation backed by a WebSocket connection.
///
/// For advanced use-cases (custom TLS, proxy, headers) construct the stream
/// yourself and use [`WebSocketTransport::from_stream`].
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe. Dropping the future
/// returned by `recv` before it completes will not consume or lose any messages,
/// making it safe to use inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectionFailed`] if the handshake or the
    /// underlying TCP/TLS connection fails.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        tracing::debug!(url = %url, "connecting to WebSocket server");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Create a [`WebSocketTransport`] from an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectionTimeout`] if the deadline elapses, or
    /// any error that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, SessionError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| SessionError::ConnectionTimeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(SessionError::TransportReceive(e.to_string())));
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

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens a [`WebSocketTransport`] for each connect attempt.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    handshake_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every handshake. Without it an unreachable host is only limited
    /// by the OS connect timeout and the session's connect window.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, SessionError> {
        let url = endpoint.websocket_url();
        let transport = match self.handshake_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(url.as_str(), timeout).await?,
            None => WebSocketTransport::connect(url.as_str()).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::config::{ReconnectPolicy, SessionConfig};
    use crate::connection::{ConnectionManager, ConnectionOutcome};
    use crate::event::TransportEvent;
    use crate::protocol::{ClientCommand, EventName, ServerEvent};
    use std::sync::{Arc, Mutex};

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::ConnectionTimeout));
    }

    // ── Mock server ─────────────────────────────────────────────────

    use tokio::net::TcpListener;

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection. Returns the bound `host:port`.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        addr.to_string()
    }

    #[tokio::test]
    async fn recv_skips_binary_frames_and_ends_on_close() {
        let addr = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&format!("ws://{addr}"))
            .await
            .unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "after_binary");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let addr =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&format!("ws://{addr}"))
            .await
            .unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_maps_http_endpoint_to_ws() {
        let addr = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let endpoint = Endpoint::parse(&format!("http://{addr}")).unwrap();
        let mut transport = WebSocketConnector::new()
            .with_handshake_timeout(Duration::from_secs(5))
            .open(&endpoint)
            .await
            .unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
    }

    #[tokio::test]
    async fn manager_round_trip_over_websocket() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let server_seen = Arc::clone(&received);
        let addr = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                server_seen.lock().unwrap().push(text.to_string());
            }
            let frame = serde_json::to_string(&ServerEvent::GameError {
                msg: "room full".into(),
            })
            .unwrap();
            ws.send(Message::Text(frame.into())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let config = SessionConfig::default().with_reconnect(ReconnectPolicy::disabled());
        let mut manager = ConnectionManager::new(WebSocketConnector::new(), &config);
        let errors = Arc::new(Mutex::new(Vec::new()));
        manager
            .connect(&format!("http://{addr}"))
            .await
            .unwrap();
        let sink = Arc::clone(&errors);
        manager.subscribe(EventName::GameError, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        assert_eq!(
            manager
                .await_connection_outcome(Duration::from_secs(5))
                .await,
            ConnectionOutcome::Connected
        );
        manager
            .send(ClientCommand::Join {
                name: "Alice".into(),
            })
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), manager.pump())
            .await
            .unwrap();
        assert_eq!(
            *errors.lock().unwrap(),
            [TransportEvent::Server(ServerEvent::GameError {
                msg: "room full".into()
            })]
        );
        assert_eq!(
            *received.lock().unwrap(),
            [r#"{"event":"join","data":{"name":"Alice"}}"#]
        );
        manager.disconnect().await;
    }
}
