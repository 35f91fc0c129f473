//! Transport abstraction for the Imposter game protocol.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and server. Every message is one complete JSON frame; framing is
//! the implementation's concern.
//!
//! Opening a transport is the job of a [`Connector`]. The connection manager
//! holds one connector for its whole lifetime and asks it for a fresh
//! transport on every connect and on every automatic reconnect attempt.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use imposter_client::endpoint::Endpoint;
//! use imposter_client::error::SessionError;
//! use imposter_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SessionError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SessionError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, SessionError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::SessionError;

/// A bidirectional text message transport.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data. Channel-based implementations (e.g., wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), SessionError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, SessionError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), SessionError>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        (**self).send(message).await
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        (**self).close().await
    }
}

/// Opens transports for an endpoint.
///
/// Called once per connect and once per automatic reconnect attempt. A failed
/// open surfaces to subscribers as a `connect_error` signal.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new transport to `endpoint`.
    ///
    /// # Errors
    ///
    /// Any error is reported as a connect error; its display text becomes the
    /// signal's message.
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, SessionError>;
}
