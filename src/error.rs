//! Error types for the Imposter session client.

use thiserror::Error;

use crate::dispatcher::Rejection;

/// Remediation text shown alongside connection-class alerts.
const CONNECTION_HINT: &str = "Make sure the server is running, you are on the same network, \
                               and the server address is correct.";

/// Errors that can occur when using the session client.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The endpoint string is not a well-formed absolute URL. Rejected before
    /// any network attempt.
    #[error("invalid endpoint {input:?}: {reason}")]
    InvalidEndpoint {
        /// The raw input as entered.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The transport reported an explicit connect error.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Neither a connect nor a connect-error signal arrived within the window.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// A local guard refused the command; nothing was sent.
    #[error("command rejected locally: {0}")]
    CommandRejectedLocally(Rejection),

    /// The server pushed a `game_error`.
    #[error("server error: {0}")]
    ServerReported(String),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Attempted an operation that requires a live connection.
    #[error("not connected to server")]
    NotConnected,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Returns `true` for errors that surface as a user-facing connection alert
    /// rather than a log entry.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint { .. } | Self::ConnectionFailed(_) | Self::ConnectionTimeout
        )
    }

    /// Human-readable remediation for connection-class errors.
    ///
    /// Returns `None` for errors that are reported through the message log.
    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidEndpoint { .. } => {
                Some("Please enter a valid URL (e.g., http://192.168.1.100:5050).")
            }
            Self::ConnectionFailed(_) => Some(CONNECTION_HINT),
            Self::ConnectionTimeout => Some(
                "Please check the server URL and ensure the server is running.",
            ),
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for session client operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
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

    #[test]
    fn connection_errors_carry_hints() {
        let errors = [
            SessionError::InvalidEndpoint {
                input: "nope".into(),
                reason: "relative URL without a base".into(),
            },
            SessionError::ConnectionFailed("refused".into()),
            SessionError::ConnectionTimeout,
        ];
        for err in &errors {
            assert!(err.is_connection_error(), "{err} should be an alert");
            assert!(err.remediation_hint().is_some());
        }
    }

    #[test]
    fn log_surfaced_errors_have_no_hint() {
        let err = SessionError::ServerReported("not your turn".into());
        assert!(!err.is_connection_error());
        assert!(err.remediation_hint().is_none());

        let err = SessionError::CommandRejectedLocally(Rejection::EmptyName);
        assert!(err.remediation_hint().is_none());
    }

    #[test]
    fn display_includes_input() {
        let err = SessionError::InvalidEndpoint {
            input: "ftp//x".into(),
            reason: "bad".into(),
        };
        assert!(err.to_string().contains("ftp//x"));
    }
}
