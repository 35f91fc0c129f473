//! Ownership of the single live transport handle.
//!
//! [`ConnectionManager`] owns at most one *link*: a background task that opens
//! a transport through the injected [`Connector`], reconnects it under the
//! configured [`ReconnectPolicy`], writes queued commands and decodes incoming
//! frames. Every link is spawned under a fresh [`Generation`]; everything it
//! produces is stamped with that generation and travels through one bounded
//! delivery channel back to the manager.
//!
//! Deliveries are handed to subscribers by [`ConnectionManager::pump`]. A
//! delivery is dispatched only when its generation is the current one, and a
//! handler is invoked only when it was subscribed under the current
//! generation, so a superseded link can never reach a subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut manager = ConnectionManager::new(WebSocketConnector::new(), &SessionConfig::default());
//! manager.connect("http://192.168.1.100:5050").await?;
//! manager.subscribe(EventName::PlayerList, |event| println!("{event:?}"));
//! manager.await_connection_outcome(DEFAULT_CONNECT_TIMEOUT).await.into_result()?;
//! loop {
//!     manager.pump().await;
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{ReconnectPolicy, SessionConfig};
use crate::endpoint::Endpoint;
use crate::error::{Result, SessionError};
use crate::event::{ConnectionSignal, Delivery, Generation, TransportEvent};
use crate::protocol::{ClientCommand, EventName, ServerEvent};
use crate::transport::{Connector, Transport};

/// Subscriber callback.
pub type Handler = Box<dyn FnMut(&TransportEvent) + Send>;

/// Handle returned by [`ConnectionManager::subscribe`], tagged with the
/// generation that was current when the subscription was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    id: u64,
    generation: Generation,
}

impl SubscriptionId {
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

struct Subscription {
    id: SubscriptionId,
    event: EventName,
    handler: Handler,
}

/// Why a connection attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionFailure {
    /// The transport reported a connect error.
    Rejected(String),
    /// No outcome arrived within the window.
    Timeout,
}

/// Result of [`ConnectionManager::await_connection_outcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Connected,
    Failed(ConnectionFailure),
}

impl ConnectionOutcome {
    /// Map the outcome onto the crate error taxonomy.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConnectionFailed`] or [`SessionError::ConnectionTimeout`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Connected => Ok(()),
            Self::Failed(ConnectionFailure::Rejected(reason)) => {
                Err(SessionError::ConnectionFailed(reason))
            }
            Self::Failed(ConnectionFailure::Timeout) => Err(SessionError::ConnectionTimeout),
        }
    }
}

/// What a single [`pump`](ConnectionManager::pump) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pumped {
    /// The delivery belonged to the current generation and was handed to
    /// `handlers` subscribers.
    Dispatched { event: EventName, handlers: usize },
    /// The delivery came from a superseded link and was discarded.
    Stale { generation: Generation },
}

// ── Link ────────────────────────────────────────────────────────────

struct LinkState {
    connected: AtomicBool,
}

/// The live handle of one generation.
struct Link {
    generation: Generation,
    endpoint: Endpoint,
    cmd_tx: mpsc::UnboundedSender<ClientCommand>,
    state: Arc<LinkState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        // No executor context here to drive a graceful close; dropping the
        // task future is the only safe action.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// Owns exactly one live transport handle and mediates subscription and
/// command emission through it.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    reconnect: ReconnectPolicy,
    shutdown_timeout: Duration,
    generation: Generation,
    link: Option<Link>,
    delivery_tx: mpsc::Sender<Delivery>,
    delivery_rx: mpsc::Receiver<Delivery>,
    subscriptions: Vec<Subscription>,
    next_subscription: u64,
}

impl ConnectionManager {
    /// Create a manager with no live handle.
    pub fn new(connector: impl Connector, config: &SessionConfig) -> Self {
        let (delivery_tx, delivery_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        Self {
            connector: Arc::new(connector),
            reconnect: config.reconnect,
            shutdown_timeout: config.shutdown_timeout,
            generation: Generation::default(),
            link: None,
            delivery_tx,
            delivery_rx,
            subscriptions: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Validate `url` and switch the live handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidEndpoint`] for a malformed URL, in which
    /// case the existing handle, generation and subscriptions are untouched.
    pub async fn connect(&mut self, url: &str) -> Result<Generation> {
        let endpoint = Endpoint::parse(url)?;
        Ok(self.connect_to(endpoint).await)
    }

    /// Tear down the current handle (if any), start a new generation and open
    /// `endpoint` under it.
    ///
    /// Subscriptions from earlier generations are dropped; callers must
    /// subscribe again.
    pub async fn connect_to(&mut self, endpoint: Endpoint) -> Generation {
        self.teardown().await;

        self.generation = self.generation.next();
        let generation = self.generation;

        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|sub| sub.id.generation == generation);
        let pruned = before - self.subscriptions.len();
        if pruned > 0 {
            debug!(%generation, pruned, "dropped subscriptions of superseded generation");
        }

        info!(%generation, endpoint = %endpoint, "opening link");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let state = Arc::new(LinkState {
            connected: AtomicBool::new(false),
        });
        let context = LinkContext {
            connector: Arc::clone(&self.connector),
            endpoint: endpoint.clone(),
            generation,
            policy: self.reconnect,
            deliveries: self.delivery_tx.clone(),
            state: Arc::clone(&state),
        };
        let task = tokio::spawn(run_link(context, cmd_rx, shutdown_rx));

        self.link = Some(Link {
            generation,
            endpoint,
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        });
        generation
    }

    /// Tear down the current handle without opening a new one.
    ///
    /// The generation is kept, so the link's final `disconnect` signal still
    /// reaches current subscribers on the next pump.
    pub async fn disconnect(&mut self) {
        self.teardown().await;
    }

    /// Wait for the current link to connect or fail.
    ///
    /// Deliveries that arrive meanwhile are dispatched as usual. Resolves to
    /// the first of: a `connect` signal, a `connect_error` signal, or the
    /// timeout. The losing branches are dropped on return, so a late signal
    /// cannot change an already resolved outcome.
    pub async fn await_connection_outcome(&mut self, timeout: Duration) -> ConnectionOutcome {
        let Some(link) = self.link.as_ref() else {
            return ConnectionOutcome::Failed(ConnectionFailure::Rejected(
                "no endpoint to connect to".into(),
            ));
        };
        if link.state.connected.load(Ordering::Acquire) {
            return ConnectionOutcome::Connected;
        }
        let generation = self.generation;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!(%generation, ?timeout, "no connection outcome within window");
                    return ConnectionOutcome::Failed(ConnectionFailure::Timeout);
                }
                delivery = self.delivery_rx.recv() => {
                    let Some(delivery) = delivery else {
                        return ConnectionOutcome::Failed(ConnectionFailure::Rejected(
                            "delivery channel closed".into(),
                        ));
                    };
                    let outcome = if delivery.generation == generation {
                        match &delivery.event {
                            TransportEvent::Signal(ConnectionSignal::Connected) => {
                                Some(ConnectionOutcome::Connected)
                            }
                            TransportEvent::Signal(ConnectionSignal::ConnectError { message }) => {
                                Some(ConnectionOutcome::Failed(ConnectionFailure::Rejected(
                                    message.clone(),
                                )))
                            }
                            _ => None,
                        }
                    } else {
                        None
                    };
                    self.dispatch(delivery);
                    if let Some(outcome) = outcome {
                        return outcome;
                    }
                }
            }
        }
    }

    /// Register `handler` for `event` under the current generation.
    pub fn subscribe<F>(&mut self, event: EventName, handler: F) -> SubscriptionId
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        self.next_subscription = self.next_subscription.wrapping_add(1);
        let id = SubscriptionId {
            id: self.next_subscription,
            generation: self.generation,
        };
        self.subscriptions.push(Subscription {
            id,
            event,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered (for
    /// example because its generation was superseded).
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        self.subscriptions.len() != before
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Await the next delivery and dispatch it.
    ///
    /// Waits indefinitely while nothing arrives; wrap in
    /// `tokio::time::timeout` or `select!` to bound it.
    pub async fn pump(&mut self) -> Option<Pumped> {
        let delivery = self.delivery_rx.recv().await?;
        Some(self.dispatch(delivery))
    }

    /// Dispatch one already queued delivery, if any, without waiting.
    pub fn try_pump(&mut self) -> Option<Pumped> {
        let delivery = self.delivery_rx.try_recv().ok()?;
        Some(self.dispatch(delivery))
    }

    /// Queue `command` on the current handle. Fire-and-forget: there is no
    /// acknowledgement and no retry.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] when there is no live, connected
    /// handle.
    pub fn send(&self, command: ClientCommand) -> Result<()> {
        let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
        if !link.state.connected.load(Ordering::Acquire) {
            return Err(SessionError::NotConnected);
        }
        debug!(command = command.name(), generation = %link.generation, "queueing command");
        link.cmd_tx
            .send(command)
            .map_err(|_| SessionError::NotConnected)
    }

    /// Current transport liveness.
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.state.connected.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Endpoint of the current handle.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.link.as_ref().map(|link| &link.endpoint)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn dispatch(&mut self, delivery: Delivery) -> Pumped {
        let current = self.generation;
        if delivery.generation != current {
            debug!(
                stale = %delivery.generation,
                %current,
                event = %delivery.event.name(),
                "discarding delivery from superseded link"
            );
            return Pumped::Stale {
                generation: delivery.generation,
            };
        }

        let name = delivery.event.name();
        let mut handlers = 0;
        for sub in self
            .subscriptions
            .iter_mut()
            .filter(|sub| sub.event == name && sub.id.generation == current)
        {
            (sub.handler)(&delivery.event);
            handlers += 1;
        }
        if handlers == 0 {
            debug!(event = %name, "no subscribers for delivery");
        }
        Pumped::Dispatched {
            event: name,
            handlers,
        }
    }

    async fn teardown(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        debug!(generation = %link.generation, "tearing down link");

        if let Some(tx) = link.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the link task with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = link.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("link task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("link task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("link task aborted: {join_err}");
                    }
                }
            }
        }

        link.state.connected.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("generation", &self.generation)
            .field("endpoint", &self.endpoint().map(Endpoint::as_str))
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

// ── Link task ───────────────────────────────────────────────────────

struct LinkContext {
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    generation: Generation,
    policy: ReconnectPolicy,
    deliveries: mpsc::Sender<Delivery>,
    state: Arc<LinkState>,
}

impl LinkContext {
    /// Deliver an event, waiting for channel capacity. Returns `false` once
    /// the manager is gone.
    async fn emit(&self, event: impl Into<TransportEvent>) -> bool {
        let delivery = Delivery {
            generation: self.generation,
            event: event.into(),
        };
        if self.deliveries.send(delivery).await.is_err() {
            debug!(generation = %self.generation, "delivery channel closed, manager dropped");
            return false;
        }
        true
    }

    /// Deliver without waiting; used on teardown where nobody is draining.
    fn emit_now(&self, event: impl Into<TransportEvent>) {
        let delivery = Delivery {
            generation: self.generation,
            event: event.into(),
        };
        match self.deliveries.try_send(delivery) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    event = %dropped.event.name(),
                    "delivery channel full, dropping final signal"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("delivery channel closed, manager dropped");
            }
        }
    }
}

enum SessionEnd {
    /// Teardown requested, or the manager went away.
    Shutdown,
    /// The transport failed or the server closed it.
    Dropped(Option<String>),
    /// Nobody is listening for deliveries anymore.
    Abandoned,
}

/// Background task of one generation: open, drive, reconnect.
///
/// Exits when:
/// - teardown is requested
/// - the manager is dropped
/// - reconnect attempts are exhausted (after a final `disconnect`)
async fn run_link(
    link: LinkContext,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientCommand>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let generation = link.generation;
    debug!(%generation, endpoint = %link.endpoint, "link task started");

    let mut retries: u32 = 0;
    let mut wait_before_open = false;

    loop {
        if wait_before_open {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                () = tokio::time::sleep(link.policy.delay) => {}
            }
        }

        // Shutdown is polled first so a link torn down before it ever ran
        // never touches the connector.
        let opened = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            opened = link.connector.open(&link.endpoint) => opened,
        };

        let mut transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                warn!(%generation, retries, "connect attempt failed: {e}");
                if !link
                    .emit(ConnectionSignal::ConnectError {
                        message: e.to_string(),
                    })
                    .await
                {
                    break;
                }
                if retries >= link.policy.max_attempts {
                    error!(%generation, "reconnect attempts exhausted");
                    link.emit(ConnectionSignal::Disconnected {
                        reason: Some("reconnect attempts exhausted".into()),
                    })
                    .await;
                    break;
                }
                retries += 1;
                wait_before_open = true;
                continue;
            }
        };

        retries = 0;
        link.state.connected.store(true, Ordering::Release);
        info!(%generation, endpoint = %link.endpoint, "transport connected");
        if !link.emit(ConnectionSignal::Connected).await {
            let _ = transport.close().await;
            break;
        }

        let end = drive(&link, transport.as_mut(), &mut cmd_rx, &mut shutdown_rx).await;
        link.state.connected.store(false, Ordering::Release);

        let mut discarded = 0usize;
        while cmd_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(%generation, discarded, "discarded commands queued for closed transport");
        }

        match end {
            SessionEnd::Shutdown => {
                let _ = transport.close().await;
                link.emit_now(ConnectionSignal::Disconnected {
                    reason: Some("client shut down".into()),
                });
                break;
            }
            SessionEnd::Abandoned => {
                let _ = transport.close().await;
                break;
            }
            SessionEnd::Dropped(reason) => {
                if !link.emit(ConnectionSignal::Disconnected { reason }).await {
                    break;
                }
                if link.policy.max_attempts == 0 {
                    debug!(%generation, "reconnect disabled, link finished");
                    break;
                }
                retries = 1;
                wait_before_open = true;
            }
        }
    }

    link.state.connected.store(false, Ordering::Release);
    debug!(%generation, "link task exited");
}

/// Multiplex outgoing commands and incoming frames on an open transport.
async fn drive(
    link: &LinkContext,
    transport: &mut dyn Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientCommand>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(command) = cmd else {
                    debug!("command channel closed, shutting down link");
                    return SessionEnd::Shutdown;
                };
                match serde_json::to_string(&command) {
                    Ok(json) => {
                        if let Err(e) = transport.send(json).await {
                            error!(command = command.name(), "transport send error: {e}");
                            return SessionEnd::Dropped(Some(format!("transport send error: {e}")));
                        }
                    }
                    Err(e) => {
                        error!("failed to serialize command: {e}");
                    }
                }
            }

            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return SessionEnd::Shutdown;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if !link.emit(event).await {
                                return SessionEnd::Abandoned;
                            }
                        }
                        Err(e) => {
                            warn!("failed to deserialize server event: {e}, raw: {text}");
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return SessionEnd::Dropped(Some(format!("transport receive error: {e}")));
                    }
                    None => {
                        debug!("transport closed by server");
                        return SessionEnd::Dropped(None);
                    }
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    // ── Mock connector ──────────────────────────────────────────────

    /// Transport fed by a channel; dropping the sender closes it.
    struct ChannelTransport {
        rx: mpsc::UnboundedReceiver<String>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), SessionError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SessionError>> {
            self.rx.recv().await.map(Ok)
        }

        async fn close(&mut self) -> std::result::Result<(), SessionError> {
            Ok(())
        }
    }

    enum Open {
        Fail(&'static str),
        Accept(ChannelTransport),
        Hang,
    }

    /// Connector that replays scripted open results; runs out into failures.
    #[derive(Clone)]
    struct ScriptConnector {
        script: Arc<StdMutex<VecDeque<Open>>>,
        attempts: Arc<AtomicUsize>,
    }

    impl ScriptConnector {
        fn new(script: Vec<Open>) -> Self {
            Self {
                script: Arc::new(StdMutex::new(script.into())),
                attempts: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptConnector {
        async fn open(
            &self,
            _endpoint: &Endpoint,
        ) -> std::result::Result<Box<dyn Transport>, SessionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Open::Accept(transport)) => Ok(Box::new(transport)),
                Some(Open::Fail(reason)) => Err(SessionError::ConnectionFailed(reason.into())),
                Some(Open::Hang) => std::future::pending().await,
                None => Err(SessionError::ConnectionFailed("script exhausted".into())),
            }
        }
    }

    fn channel_transport() -> (
        ChannelTransport,
        mpsc::UnboundedSender<String>,
        Arc<StdMutex<Vec<String>>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport = ChannelTransport {
            rx,
            sent: Arc::clone(&sent),
        };
        (transport, tx, sent)
    }

    fn recorder(
        manager: &mut ConnectionManager,
        event: EventName,
    ) -> Arc<StdMutex<Vec<TransportEvent>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.subscribe(event, move |e| sink.lock().unwrap().push(e.clone()));
        seen
    }

    fn player_list_frame(names: &[&str]) -> String {
        let list: Vec<_> = names
            .iter()
            .map(|n| crate::protocol::PlayerInfo::new(*n))
            .collect();
        serde_json::to_string(&ServerEvent::PlayerList(list)).unwrap()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_url_leaves_existing_connection_untouched() {
        let (transport, _server, _sent) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(transport)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        let generation = manager.connect("http://localhost:5050").await.unwrap();
        let outcome = manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;
        assert_eq!(outcome, ConnectionOutcome::Connected);

        let err = manager.connect("not a url").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidEndpoint { .. }));
        assert_eq!(manager.generation(), generation);
        assert!(manager.is_connected());
        assert_eq!(
            manager.endpoint().map(Endpoint::as_str),
            Some("http://localhost:5050/")
        );
    }

    #[tokio::test]
    async fn connect_signal_resolves_outcome_and_reaches_subscribers() {
        let (transport, _server, _sent) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(transport)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://localhost:5050").await.unwrap();
        let connects = recorder(&mut manager, EventName::Connect);

        let outcome = manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;
        assert_eq!(outcome, ConnectionOutcome::Connected);
        assert_eq!(connects.lock().unwrap().len(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn connect_error_resolves_failed() {
        let connector = ScriptConnector::new(vec![Open::Fail("refused")]);
        let config = SessionConfig::default().with_reconnect(ReconnectPolicy::disabled());
        let mut manager = ConnectionManager::new(connector, &config);

        manager.connect("http://10.0.0.1:5050").await.unwrap();
        let outcome = manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;
        match outcome {
            ConnectionOutcome::Failed(ConnectionFailure::Rejected(reason)) => {
                assert!(reason.contains("refused"), "unexpected reason {reason}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connector_times_out() {
        let connector = ScriptConnector::new(vec![Open::Hang]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://10.0.0.1:5050").await.unwrap();
        let outcome = manager
            .await_connection_outcome(Duration::from_millis(5000))
            .await;
        assert_eq!(outcome, ConnectionOutcome::Failed(ConnectionFailure::Timeout));
        assert!(matches!(
            outcome.into_result(),
            Err(SessionError::ConnectionTimeout)
        ));
    }

    #[tokio::test]
    async fn outcome_without_link_fails() {
        let connector = ScriptConnector::new(vec![]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());
        let outcome = manager
            .await_connection_outcome(Duration::from_millis(10))
            .await;
        assert!(matches!(
            outcome,
            ConnectionOutcome::Failed(ConnectionFailure::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn server_events_are_dispatched_by_name() {
        let (transport, server, _sent) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(transport)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://localhost:5050").await.unwrap();
        let rosters = recorder(&mut manager, EventName::PlayerList);
        let errors = recorder(&mut manager, EventName::GameError);
        manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;

        server.send(player_list_frame(&["Alice", "Bob"])).unwrap();
        let pumped = manager.pump().await.unwrap();
        assert_eq!(
            pumped,
            Pumped::Dispatched {
                event: EventName::PlayerList,
                handlers: 1
            }
        );
        assert_eq!(rosters.lock().unwrap().len(), 1);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let (transport, server, _sent) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(transport)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://localhost:5050").await.unwrap();
        let rosters = recorder(&mut manager, EventName::PlayerList);
        manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;

        server.send("{not json".into()).unwrap();
        server
            .send(r#"{"event":"mystery","data":{}}"#.into())
            .unwrap();
        server.send(player_list_frame(&["Alice"])).unwrap();

        let pumped = manager.pump().await.unwrap();
        assert!(matches!(
            pumped,
            Pumped::Dispatched {
                event: EventName::PlayerList,
                ..
            }
        ));
        assert_eq!(rosters.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsubscribed_handler_is_not_invoked() {
        let (transport, server, _sent) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(transport)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://localhost:5050").await.unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = manager.subscribe(EventName::PlayerList, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;

        assert!(manager.unsubscribe(id));
        assert!(!manager.unsubscribe(id));

        server.send(player_list_frame(&["Alice"])).unwrap();
        let pumped = manager.pump().await.unwrap();
        assert_eq!(
            pumped,
            Pumped::Dispatched {
                event: EventName::PlayerList,
                handlers: 0
            }
        );
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn new_generation_prunes_old_subscriptions() {
        let (first, _server_a, _) = channel_transport();
        let (second, _server_b, _) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(first), Open::Accept(second)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://10.0.0.1:5050").await.unwrap();
        let old = manager.subscribe(EventName::PlayerList, |_| {});
        assert_eq!(manager.subscription_count(), 1);

        let generation = manager.connect("http://10.0.0.2:5050").await.unwrap();
        assert_eq!(generation, Generation(2));
        assert_eq!(old.generation(), Generation(1));
        assert_eq!(manager.subscription_count(), 0);
        assert!(!manager.unsubscribe(old));
    }

    #[tokio::test]
    async fn stale_delivery_never_reaches_handlers() {
        let (first, _server_a, _) = channel_transport();
        let (second, _server_b, _) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(first), Open::Accept(second)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://10.0.0.1:5050").await.unwrap();
        manager.connect("http://10.0.0.2:5050").await.unwrap();
        let rosters = recorder(&mut manager, EventName::PlayerList);

        let pumped = manager.dispatch(Delivery {
            generation: Generation(1),
            event: ServerEvent::PlayerList(vec![]).into(),
        });
        assert_eq!(
            pumped,
            Pumped::Stale {
                generation: Generation(1)
            }
        );
        assert!(rosters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_requires_live_connection() {
        let connector = ScriptConnector::new(vec![]);
        let manager = ConnectionManager::new(connector, &SessionConfig::default());
        let err = manager.send(ClientCommand::StartGame {}).unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test]
    async fn send_writes_json_to_transport() {
        let (transport, _server, sent) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(transport)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://localhost:5050").await.unwrap();
        manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;
        manager
            .send(ClientCommand::Join {
                name: "Alice".into(),
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let command: ClientCommand = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(
            command,
            ClientCommand::Join {
                name: "Alice".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_transport_reconnects() {
        let (first, server_a, _) = channel_transport();
        let (second, _server_b, _) = channel_transport();
        let connector =
            ScriptConnector::new(vec![Open::Accept(first), Open::Fail("blip"), Open::Accept(second)]);
        let attempts = Arc::clone(&connector.attempts);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://localhost:5050").await.unwrap();
        let connects = recorder(&mut manager, EventName::Connect);
        let drops = recorder(&mut manager, EventName::Disconnect);
        let errors = recorder(&mut manager, EventName::ConnectError);
        manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;

        drop(server_a);
        // disconnect, connect_error, connect
        for _ in 0..3 {
            manager.pump().await.unwrap();
        }

        assert_eq!(connects.lock().unwrap().len(), 2);
        assert_eq!(drops.lock().unwrap().len(), 1);
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_gives_up_after_policy_attempts() {
        let connector = ScriptConnector::new(vec![]);
        let attempts = Arc::clone(&connector.attempts);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://localhost:5050").await.unwrap();
        let errors = recorder(&mut manager, EventName::ConnectError);
        let drops = recorder(&mut manager, EventName::Disconnect);

        // 1 initial open + 5 retries, each a connect_error, then one disconnect.
        for _ in 0..7 {
            manager.pump().await.unwrap();
        }
        assert_eq!(errors.lock().unwrap().len(), 6);
        assert_eq!(drops.lock().unwrap().len(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn disconnect_delivers_final_signal_to_current_generation() {
        let (transport, _server, _sent) = channel_transport();
        let connector = ScriptConnector::new(vec![Open::Accept(transport)]);
        let mut manager = ConnectionManager::new(connector, &SessionConfig::default());

        manager.connect("http://localhost:5050").await.unwrap();
        let drops = recorder(&mut manager, EventName::Disconnect);
        manager
            .await_connection_outcome(Duration::from_secs(1))
            .await;

        manager.disconnect().await;
        assert!(!manager.is_connected());
        assert!(manager.try_pump().is_some());
        let drops = drops.lock().unwrap();
        assert_eq!(
            drops.as_slice(),
            &[TransportEvent::Signal(ConnectionSignal::Disconnected {
                reason: Some("client shut down".into())
            })]
        );
    }
}
