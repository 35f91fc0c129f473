//! # Loopback Round Example
//!
//! Plays one complete Imposter round against an in-process fake server:
//!
//! 1. Implement [`Connector`] and [`Transport`] over tokio channels
//! 2. Join, start the game, submit a clue, open voting and vote
//! 3. Watch the phase machine move LOBBY → … → GAME_OVER
//! 4. Print the message log
//!
//! No network is involved, which makes this a template for testing UIs
//! built on [`GameSession`].
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_round
//! RUST_LOG=imposter_client=debug cargo run --example loopback_round
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use imposter_client::{
    Applied, ClientCommand, Connector, Endpoint, GameSession, MemoryStore, Phase, PlayerInfo, Role,
    ServerEvent, SessionConfig, SessionError, Transport,
};
use tokio::sync::mpsc;

const BOTS: [&str; 2] = ["Bob", "Carol"];

// ── Loopback transport ──────────────────────────────────────────────

/// Client side of the in-process connection.
struct LoopbackTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        self.to_server
            .send(message)
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Spawns a fresh fake server for every open.
struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, SessionError> {
        tracing::info!(%endpoint, "opening loopback connection");
        let (to_server, server_rx) = mpsc::unbounded_channel();
        let (server_tx, from_server) = mpsc::unbounded_channel();
        tokio::spawn(fake_server(server_rx, server_tx));
        Ok(Box::new(LoopbackTransport {
            to_server,
            from_server,
        }))
    }
}

// ── Fake server ─────────────────────────────────────────────────────

/// A minimal stand-in for the game server. The joining player is host and
/// Carol is always the imposter.
async fn fake_server(
    mut commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<String>,
) {
    let push = |event: ServerEvent| {
        if let Ok(json) = serde_json::to_string(&event) {
            let _ = events.send(json);
        }
    };

    let mut host = String::new();
    let mut host_clue = String::new();

    while let Some(text) = commands.recv().await {
        let Ok(command) = serde_json::from_str::<ClientCommand>(&text) else {
            continue;
        };
        match command {
            ClientCommand::Join { name } => {
                host = name;
                let roster = std::iter::once(host.as_str())
                    .chain(BOTS)
                    .map(|n| PlayerInfo {
                        name: n.to_string(),
                        sid: Some(format!("sid-{n}")),
                    })
                    .collect();
                push(ServerEvent::PlayerList(roster));
                push(ServerEvent::SystemMessage {
                    text: format!("{host} joined"),
                    time: None,
                });
            }
            ClientCommand::StartGame {} => {
                push(ServerEvent::GameStarted { num_players: 3 });
                push(ServerEvent::YourRole {
                    role: Role::Civilian,
                });
                push(ServerEvent::YourWord {
                    word: "volcano".into(),
                });
                for bot in BOTS {
                    push(ServerEvent::ClueSubmitted { name: bot.into() });
                }
            }
            ClientCommand::SubmitClue { clue } => {
                host_clue = clue;
                push(ServerEvent::ClueSubmitted { name: host.clone() });
                let clues: BTreeMap<String, String> = [
                    (host.clone(), host_clue.clone()),
                    ("Bob".to_string(), "hot".to_string()),
                    ("Carol".to_string(), "island".to_string()),
                ]
                .into_iter()
                .collect();
                push(ServerEvent::AllCluesRevealed { clues });
            }
            ClientCommand::StartVoting {} => {
                push(ServerEvent::VotingStarted { alive_count: 3 });
            }
            ClientCommand::CastVote { target_id } => {
                let target = target_id.trim_start_matches("sid-").to_string();
                let ballots = [
                    (host.clone(), target),
                    ("Bob".to_string(), "Carol".to_string()),
                    ("Carol".to_string(), host.clone()),
                ];
                let mut tally: BTreeMap<String, u32> = BTreeMap::new();
                let mut voters = Vec::new();
                for (voter, voted_for) in ballots {
                    push(ServerEvent::VoteCast {
                        voter_name: voter.clone(),
                        target_name: voted_for.clone(),
                        time: None,
                    });
                    *tally.entry(voted_for).or_insert(0) += 1;
                    voters.push(voter);
                    push(ServerEvent::VotingUpdate {
                        voters: voters.clone(),
                        votes_count: u32::try_from(voters.len()).unwrap_or(u32::MAX),
                        alive_count: 3,
                    });
                }
                let eliminated = tally
                    .iter()
                    .max_by_key(|(_, votes)| **votes)
                    .filter(|(_, votes)| **votes > 1)
                    .map(|(name, _)| name.clone());
                let winner = if eliminated.as_deref() == Some("Carol") {
                    "civilians"
                } else {
                    "imposter"
                };
                push(ServerEvent::VoteResults {
                    eliminated_name: eliminated,
                    tally,
                });
                push(ServerEvent::GameOver {
                    winner: winner.into(),
                });
            }
            ClientCommand::ChatMessage { from, text } => {
                push(ServerEvent::ChatMessage {
                    from,
                    text,
                    time: None,
                });
            }
            ClientCommand::LeaveRoom {} => break,
        }
    }
    tracing::debug!(clue = %host_clue, "fake server finished");
}

// ── Client script ───────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut session = GameSession::new(LoopbackConnector, MemoryStore::new(), SessionConfig::default());
    session.connect("http://loopback.local:5050").await?;
    session.join("Alice")?;

    let (mut started, mut clued, mut opened, mut voted) = (false, false, false, false);
    while session.phase() != Phase::GameOver {
        let Ok(Some(update)) =
            tokio::time::timeout(Duration::from_secs(2), session.process_next()).await
        else {
            tracing::warn!("fake server went quiet");
            break;
        };
        if let Applied::Changed { from, to } = update.applied {
            println!("phase: {from} -> {to}");
        }

        // React once per phase, like a player clicking through the UI.
        let state = session.state();
        match session.phase() {
            Phase::Lobby if !started && state.is_host() && state.roster().len() >= 3 => {
                session.start_game()?;
                started = true;
            }
            Phase::ClueCollection if !clued && state.word().is_some() => {
                session.submit_clue("lava")?;
                clued = true;
            }
            Phase::CluesRevealed if !opened => {
                session.start_voting()?;
                opened = true;
            }
            Phase::Voting if !voted => {
                session.cast_vote("sid-Carol")?;
                voted = true;
            }
            _ => {}
        }
    }

    println!("\n── message log ──");
    for message in session.log() {
        println!("[{:?}] {}", message.kind(), message.text());
    }
    if let Some(winner) = session.state().winner() {
        println!("\nwinner: {winner}");
    }

    session.leave_room()?;
    session.disconnect().await;
    Ok(())
}
