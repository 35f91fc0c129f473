//! Owned session handle wiring the connection, the phase machine and the
//! command dispatcher together.
//!
//! [`GameSession`] is constructed with an injected [`Connector`] and
//! [`PreferenceStore`]; there is no process-wide connection. After every
//! connect it re-registers one forwarding subscription per [`EventName`]
//! under the new generation. Forwarded events land in an inbox that is
//! drained into the [`SessionStateMachine`] on the caller's task, so all
//! state mutation happens one event at a time.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut session = GameSession::new(WebSocketConnector::new(), MemoryStore::new(), SessionConfig::default());
//! if let Err(e) = session.connect_preferred().await {
//!     eprintln!("{e}. {}", e.remediation_hint().unwrap_or_default());
//! }
//! session.join("Alice")?;
//! while let Some(update) = session.process_next().await {
//!     println!("{} -> {:?} (phase {})", update.event, update.applied, session.phase());
//! }
//! ```

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::{ConnectionManager, SubscriptionId};
use crate::dispatcher::CommandDispatcher;
use crate::endpoint::{Endpoint, EndpointPreference, PreferenceStore};
use crate::error::{Result, SessionError};
use crate::event::{Generation, TransportEvent};
use crate::message_log::MessageLog;
use crate::protocol::{EventName, ServerEvent};
use crate::session::{Applied, Phase, SessionStateMachine};
use crate::transport::Connector;

/// One event applied to the session.
#[derive(Debug)]
pub struct SessionUpdate {
    pub event: EventName,
    pub applied: Applied,
    /// [`SessionError::ServerReported`] for a `game_error`, which is also
    /// in the log.
    pub server_error: Option<SessionError>,
}

/// A single player's session with an Imposter server.
pub struct GameSession {
    connection: ConnectionManager,
    state: SessionStateMachine,
    dispatcher: CommandDispatcher,
    preference: EndpointPreference,
    config: SessionConfig,
    inbox_tx: mpsc::UnboundedSender<TransportEvent>,
    inbox_rx: mpsc::UnboundedReceiver<TransportEvent>,
    forwarders: Vec<SubscriptionId>,
}

impl GameSession {
    /// Create a disconnected session.
    pub fn new(
        connector: impl Connector,
        store: impl PreferenceStore + 'static,
        config: SessionConfig,
    ) -> Self {
        Self::with_preference(connector, EndpointPreference::new(store), config)
    }

    /// Like [`new`](Self::new), with a preconfigured [`EndpointPreference`].
    pub fn with_preference(
        connector: impl Connector,
        preference: EndpointPreference,
        config: SessionConfig,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            connection: ConnectionManager::new(connector, &config),
            state: SessionStateMachine::new(),
            dispatcher: CommandDispatcher::new(config.min_players),
            preference,
            config,
            inbox_tx,
            inbox_rx,
            forwarders: Vec::new(),
        }
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Connect to the preferred endpoint (persisted, build-time, or default).
    ///
    /// # Errors
    ///
    /// [`InvalidEndpoint`](crate::SessionError::InvalidEndpoint),
    /// [`ConnectionFailed`](crate::SessionError::ConnectionFailed) or
    /// [`ConnectionTimeout`](crate::SessionError::ConnectionTimeout).
    pub async fn connect_preferred(&mut self) -> Result<()> {
        let endpoint = self.preference.resolve()?;
        self.connect_endpoint(endpoint).await
    }

    /// Connect to `raw` without persisting it.
    ///
    /// # Errors
    ///
    /// As for [`connect_preferred`](Self::connect_preferred). A malformed
    /// `raw` leaves the current connection untouched.
    pub async fn connect(&mut self, raw: &str) -> Result<()> {
        let endpoint = Endpoint::parse(raw)?;
        self.connect_endpoint(endpoint).await
    }

    /// Validate `raw`, remember it as the preferred endpoint and connect.
    ///
    /// Session state survives the switch; the new server is expected to push
    /// a fresh roster.
    ///
    /// # Errors
    ///
    /// As for [`connect`](Self::connect). Nothing is persisted for malformed
    /// input; a failing store is logged and does not block the connect.
    pub async fn change_endpoint(&mut self, raw: &str) -> Result<()> {
        let endpoint = Endpoint::parse(raw)?;
        if let Err(e) = self.preference.remember(&endpoint) {
            warn!(endpoint = %endpoint, "failed to persist endpoint preference: {e}");
        }
        info!(endpoint = %endpoint, "changing server endpoint");
        self.connect_endpoint(endpoint).await
    }

    /// Close the connection. The final `disconnect` signal is applied before
    /// this returns.
    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
        self.process_ready();
    }

    async fn connect_endpoint(&mut self, endpoint: Endpoint) -> Result<()> {
        // Apply whatever the old generation already delivered.
        self.drain_inbox();
        for id in self.forwarders.drain(..) {
            self.connection.unsubscribe(id);
        }

        let generation = self.connection.connect_to(endpoint).await;
        self.attach_forwarders();

        let outcome = self
            .connection
            .await_connection_outcome(self.config.connect_timeout)
            .await;
        self.drain_inbox();
        debug!(%generation, ?outcome, "connection outcome");
        outcome.into_result()
    }

    fn attach_forwarders(&mut self) {
        for name in EventName::ALL {
            let inbox = self.inbox_tx.clone();
            let id = self.connection.subscribe(name, move |event| {
                // The receiver lives as long as the session.
                let _ = inbox.send(event.clone());
            });
            self.forwarders.push(id);
        }
    }

    // ── Event processing ────────────────────────────────────────────

    /// Wait for the next current-generation event and apply it.
    ///
    /// Deliveries from superseded links are skipped. Waits indefinitely
    /// while the connection is idle; bound it with `tokio::time::timeout`.
    pub async fn process_next(&mut self) -> Option<SessionUpdate> {
        loop {
            self.connection.pump().await?;
            if let Some(update) = self.drain_inbox().pop() {
                return Some(update);
            }
        }
    }

    /// Apply every event that has already arrived, without waiting.
    pub fn process_ready(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while self.connection.try_pump().is_some() {
            updates.extend(self.drain_inbox());
        }
        updates
    }

    fn drain_inbox(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.inbox_rx.try_recv() {
            let applied = self.state.apply(&event);
            let server_error = match &event {
                TransportEvent::Server(ServerEvent::GameError { msg }) => {
                    Some(SessionError::ServerReported(msg.clone()))
                }
                _ => None,
            };
            updates.push(SessionUpdate {
                event: event.name(),
                applied,
                server_error,
            });
        }
        updates
    }

    /// Register an extra handler under the current generation. It is dropped
    /// on the next connect.
    pub fn subscribe<F>(&mut self, event: EventName, handler: F) -> SubscriptionId
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        self.connection.subscribe(event, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.connection.unsubscribe(id)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// # Errors
    ///
    /// See [`CommandDispatcher::join`].
    pub fn join(&mut self, name: &str) -> Result<()> {
        self.dispatcher.join(&mut self.state, &self.connection, name)
    }

    /// # Errors
    ///
    /// See [`CommandDispatcher::chat`].
    pub fn chat(&mut self, text: &str) -> Result<()> {
        self.dispatcher.chat(&mut self.state, &self.connection, text)
    }

    /// # Errors
    ///
    /// See [`CommandDispatcher::start_game`].
    pub fn start_game(&mut self) -> Result<()> {
        self.dispatcher.start_game(&mut self.state, &self.connection)
    }

    /// # Errors
    ///
    /// See [`CommandDispatcher::start_voting`].
    pub fn start_voting(&mut self) -> Result<()> {
        self.dispatcher.start_voting(&mut self.state, &self.connection)
    }

    /// # Errors
    ///
    /// See [`CommandDispatcher::submit_clue`].
    pub fn submit_clue(&mut self, clue: &str) -> Result<()> {
        self.dispatcher
            .submit_clue(&mut self.state, &self.connection, clue)
    }

    /// # Errors
    ///
    /// See [`CommandDispatcher::cast_vote`].
    pub fn cast_vote(&mut self, target_id: &str) -> Result<()> {
        self.dispatcher.cast_vote(&self.connection, target_id)
    }

    /// # Errors
    ///
    /// See [`CommandDispatcher::leave_room`].
    pub fn leave_room(&mut self) -> Result<()> {
        self.dispatcher.leave_room(&mut self.state, &self.connection)
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn state(&self) -> &SessionStateMachine {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn log(&self) -> &MessageLog {
        self.state.log()
    }

    /// Current transport liveness.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.connection.endpoint()
    }

    pub fn generation(&self) -> Generation {
        self.connection.generation()
    }

    /// The endpoint string a connection form should be pre-filled with.
    pub fn preferred_endpoint(&self) -> String {
        self.preference.current()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("connection", &self.connection)
            .field("phase", &self.state.phase())
            .field("local_name", &self.state.local_name())
            .field("forwarders", &self.forwarders.len())
            .finish()
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
    use crate::endpoint::{MemoryStore, DEFAULT_SERVER_URL};
    use crate::error::SessionError;
    use crate::transport::Transport;
    use async_trait::async_trait;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn open(
            &self,
            _endpoint: &Endpoint,
        ) -> std::result::Result<Box<dyn Transport>, SessionError> {
            Err(SessionError::ConnectionFailed("connection refused".into()))
        }
    }

    fn session() -> GameSession {
        let preference = EndpointPreference::new(MemoryStore::new()).with_build_default(None);
        let config = SessionConfig::default().with_reconnect(crate::config::ReconnectPolicy::disabled());
        GameSession::with_preference(RefusingConnector, preference, config)
    }

    #[tokio::test]
    async fn malformed_endpoint_is_not_persisted() {
        let mut session = session();
        let err = session.change_endpoint("192.168.1.100:5050").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidEndpoint { .. }));
        assert_eq!(session.preferred_endpoint(), DEFAULT_SERVER_URL);
        assert_eq!(session.generation(), Generation::default());
    }

    #[tokio::test]
    async fn refused_connect_surfaces_as_connection_failed() {
        let mut session = session();
        let err = session.change_endpoint("http://10.0.0.7:5050").await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionFailed(ref m) if m.contains("refused")));
        assert!(err.remediation_hint().is_some());
        // Persisted even though the server was unreachable.
        assert_eq!(
            session.preferred_endpoint(),
            Endpoint::parse("http://10.0.0.7:5050").unwrap().as_str()
        );
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn forwarders_are_reattached_per_connect() {
        let mut session = session();
        let _ = session.connect("http://10.0.0.7:5050").await;
        assert_eq!(session.forwarders.len(), EventName::ALL.len());
        let _ = session.connect("http://10.0.0.8:5050").await;
        assert_eq!(session.forwarders.len(), EventName::ALL.len());
        assert_eq!(session.generation(), Generation(2));
    }

    #[tokio::test]
    async fn commands_require_a_connection() {
        let mut session = session();
        assert!(matches!(
            session.join("Alice"),
            Err(SessionError::NotConnected)
        ));
        assert!(session.state().local_name().is_none());
    }
}
