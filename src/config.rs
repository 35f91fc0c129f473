//! Tunables for a game session.

use std::time::Duration;

/// Default capacity of the bounded delivery channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful link teardown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default window for [`ConnectionManager::await_connection_outcome`](crate::connection::ConnectionManager::await_connection_outcome).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Smallest roster allowed to start a round or open voting.
pub const MIN_PLAYERS: usize = 3;

/// Bounded automatic reconnect policy applied by the link task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed opens tolerated before giving up.
    pub max_attempts: u32,
    /// Fixed pause before each retry.
    pub delay: Duration,
}

impl ReconnectPolicy {
    /// Never retry: a failed open or a dropped transport ends the link.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(500),
        }
    }
}

/// Configuration for a [`GameSession`](crate::client::GameSession) and its
/// [`ConnectionManager`](crate::connection::ConnectionManager).
///
/// # Example
///
/// ```
/// use imposter_client::config::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::default()
///     .with_connect_timeout(Duration::from_secs(2))
///     .with_event_channel_capacity(64);
/// assert_eq!(config.reconnect.max_attempts, 5);
/// assert_eq!(config.min_players, 3);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Window for the connect / connect-error race after `connect`.
    ///
    /// Defaults to **5000 ms**.
    pub connect_timeout: Duration,
    /// Automatic reconnect policy. Defaults to 5 attempts at 500 ms.
    pub reconnect: ReconnectPolicy,
    /// Capacity of the bounded delivery channel between link tasks and the
    /// manager. A full channel applies backpressure to the link task.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the link task is given to close its transport on teardown before
    /// it is aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Roster size required by the host-only commands. Defaults to **3**.
    pub min_players: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            min_players: MIN_PLAYERS,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_min_players(mut self, min_players: usize) -> Self {
        self.min_players = min_players;
        self
    }
}

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
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_millis(5000));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay, Duration::from_millis(500));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.min_players, 3);
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = SessionConfig::default().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn disabled_policy_never_retries() {
        assert_eq!(ReconnectPolicy::disabled().max_attempts, 0);
    }
}
