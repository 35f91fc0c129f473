//! Events delivered from a connection to its subscribers.

use crate::protocol::{EventName, ServerEvent};

/// Monotonic connection generation. Bumped by every
/// [`ConnectionManager::connect`](crate::connection::ConnectionManager::connect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Connection-level signals synthesized by the link task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSignal {
    /// The transport opened successfully.
    Connected,
    /// An open transport went away, or the link was torn down.
    Disconnected {
        /// Human-readable reason, if known.
        reason: Option<String>,
    },
    /// An attempt to open the transport failed.
    ConnectError {
        /// Error reported by the connector.
        message: String,
    },
}

/// Anything a subscriber can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Signal(ConnectionSignal),
    Server(ServerEvent),
}

impl TransportEvent {
    /// The subscription name this event is delivered under.
    pub fn name(&self) -> EventName {
        match self {
            Self::Signal(ConnectionSignal::Connected) => EventName::Connect,
            Self::Signal(ConnectionSignal::Disconnected { .. }) => EventName::Disconnect,
            Self::Signal(ConnectionSignal::ConnectError { .. }) => EventName::ConnectError,
            Self::Server(event) => event.name(),
        }
    }
}

impl From<ServerEvent> for TransportEvent {
    fn from(event: ServerEvent) -> Self {
        Self::Server(event)
    }
}

impl From<ConnectionSignal> for TransportEvent {
    fn from(signal: ConnectionSignal) -> Self {
        Self::Signal(signal)
    }
}

/// A [`TransportEvent`] stamped with the generation of the link that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub generation: Generation,
    pub event: TransportEvent,
}
