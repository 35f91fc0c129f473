#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Imposter client integration tests.
//!
//! Provides an in-process [`ScriptedConnector`] whose accepted connections
//! are [`ChannelTransport`]s driven from the test through a [`ServerHandle`],
//! plus helpers for building server events and sessions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use imposter_client::endpoint::EndpointPreference;
use imposter_client::{
    ClientCommand, Connector, Endpoint, GameSession, MemoryStore, PlayerInfo, ReconnectPolicy,
    ServerEvent, SessionConfig, SessionError, SessionUpdate, Transport,
};
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(2);

// ── ChannelTransport ────────────────────────────────────────────────

enum Frame {
    Text(String),
    Fail(String),
}

/// Client side of an in-process connection.
///
/// `recv` yields whatever the paired [`ServerHandle`] pushes and returns
/// `None` once the handle is dropped.
pub struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        self.outgoing
            .send(message)
            .map_err(|_| SessionError::TransportSend("server gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        match self.incoming.recv().await? {
            Frame::Text(text) => Some(Ok(text)),
            Frame::Fail(reason) => Some(Err(SessionError::TransportReceive(reason))),
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Server side of one accepted connection.
pub struct ServerHandle {
    frames: mpsc::UnboundedSender<Frame>,
    commands: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Push a typed event to the client.
    pub fn push(&self, event: &ServerEvent) {
        self.push_raw(&serde_json::to_string(event).expect("serialize server event"));
    }

    /// Push a raw text frame, valid or not.
    pub fn push_raw(&self, text: &str) {
        // The client may already have hung up; tests assert on effects.
        let _ = self.frames.send(Frame::Text(text.to_string()));
    }

    /// Make the client's next `recv` fail.
    pub fn fail(&self, reason: &str) {
        let _ = self.frames.send(Frame::Fail(reason.to_string()));
    }

    /// Close the connection from the server side.
    pub fn hang_up(self) {
        drop(self);
    }

    /// Wait for the next command the client wrote.
    pub async fn next_command(&mut self) -> ClientCommand {
        let text = tokio::time::timeout(WAIT, self.commands.recv())
            .await
            .expect("timed out waiting for a client command")
            .expect("client transport dropped");
        serde_json::from_str(&text).unwrap_or_else(|e| panic!("bad command {text}: {e}"))
    }

    /// The next already-written command, if any.
    pub fn try_next_command(&mut self) -> Option<ClientCommand> {
        let text = self.commands.try_recv().ok()?;
        Some(serde_json::from_str(&text).expect("parse client command"))
    }

    /// Whether the client closed its transport gracefully.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn channel_pair() -> (ChannelTransport, ServerHandle) {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let transport = ChannelTransport {
        incoming: frames_rx,
        outgoing: commands_tx,
        closed: Arc::clone(&closed),
    };
    let server = ServerHandle {
        frames: frames_tx,
        commands: commands_rx,
        closed,
    };
    (transport, server)
}

// ── ScriptedConnector ───────────────────────────────────────────────

enum Step {
    Accept(ChannelTransport),
    Refuse(String),
    Hang,
}

/// Connector that replays scripted open results in order. Once the script
/// runs out every open is refused.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<StdMutex<VecDeque<Step>>>,
    attempts: Arc<AtomicUsize>,
    endpoints: Arc<StdMutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful open; returns the server side of it.
    pub fn accept(&self) -> ServerHandle {
        let (transport, server) = channel_pair();
        self.script.lock().unwrap().push_back(Step::Accept(transport));
        server
    }

    /// Script a failed open.
    pub fn refuse(&self, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Step::Refuse(reason.to_string()));
    }

    /// Script an open that never completes.
    pub fn hang(&self) {
        self.script.lock().unwrap().push_back(Step::Hang);
    }

    /// Number of opens attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Endpoints opened so far, in order.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.endpoints
            .lock()
            .unwrap()
            .push(endpoint.as_str().to_string());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Accept(transport)) => Ok(Box::new(transport)),
            Some(Step::Refuse(reason)) => Err(SessionError::ConnectionFailed(reason)),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(SessionError::ConnectionFailed("connection refused".into())),
        }
    }
}

// ── Session helpers ─────────────────────────────────────────────────

/// Fast reconnects so drop/recover flows finish quickly.
pub fn test_config() -> SessionConfig {
    SessionConfig::default().with_reconnect(ReconnectPolicy {
        max_attempts: 5,
        delay: Duration::from_millis(10),
    })
}

/// A session over `connector` with an empty in-memory preference store.
pub fn session_over(connector: &ScriptedConnector) -> GameSession {
    GameSession::with_preference(
        connector.clone(),
        EndpointPreference::new(MemoryStore::new()).with_build_default(None),
        test_config(),
    )
}

/// Connect `session` to an accepted connection, join as `name` and consume
/// the `join` command on the server side.
pub async fn joined(
    connector: &ScriptedConnector,
    session: &mut GameSession,
    name: &str,
) -> ServerHandle {
    let mut server = connector.accept();
    session
        .connect("http://127.0.0.1:5050")
        .await
        .expect("connect");
    session.join(name).expect("join");
    assert_eq!(
        server.next_command().await,
        ClientCommand::Join { name: name.into() }
    );
    server
}

/// Apply the next event, failing the test if none arrives in time.
pub async fn next_update(session: &mut GameSession) -> SessionUpdate {
    tokio::time::timeout(WAIT, session.process_next())
        .await
        .expect("timed out waiting for a session update")
        .expect("delivery channel closed")
}

/// Push `event` and apply it.
pub async fn deliver(server: &ServerHandle, session: &mut GameSession, event: ServerEvent) -> SessionUpdate {
    server.push(&event);
    next_update(session).await
}

// ── Event builders ──────────────────────────────────────────────────

/// Roster where every player's server id is `sid-<name>`.
pub fn roster(names: &[&str]) -> ServerEvent {
    ServerEvent::PlayerList(
        names
            .iter()
            .map(|name| PlayerInfo {
                name: (*name).to_string(),
                sid: Some(format!("sid-{name}")),
            })
            .collect(),
    )
}

pub fn clues(pairs: &[(&str, &str)]) -> ServerEvent {
    ServerEvent::AllCluesRevealed {
        clues: pairs
            .iter()
            .map(|(name, clue)| ((*name).to_string(), (*clue).to_string()))
            .collect(),
    }
}

pub fn voting_update(voters: &[&str], votes_count: u32, alive_count: u32) -> ServerEvent {
    ServerEvent::VotingUpdate {
        voters: voters.iter().map(|v| (*v).to_string()).collect(),
        votes_count,
        alive_count,
    }
}

/// Log entries rendered as plain text.
pub fn log_texts(session: &GameSession) -> Vec<String> {
    session.log().all().map(|m| m.text()).collect()
}
