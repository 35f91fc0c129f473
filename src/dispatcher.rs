//! Local validation of user intent before it reaches the server.
//!
//! Guards here only spare the server obviously invalid commands; the server
//! re-validates everything. A rejected command is never sent and leaves
//! exactly one system notice in the session log.

use std::fmt;

use tracing::{debug, info};

use crate::config::MIN_PLAYERS;
use crate::connection::ConnectionManager;
use crate::error::{Result, SessionError};
use crate::protocol::ClientCommand;
use crate::session::{Phase, SessionStateMachine};

/// Where validated commands go.
pub trait CommandSink {
    /// Forward `command`. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be queued.
    fn send(&self, command: ClientCommand) -> Result<()>;
}

impl CommandSink for ConnectionManager {
    fn send(&self, command: ClientCommand) -> Result<()> {
        ConnectionManager::send(self, command)
    }
}

/// Host-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedAction {
    StartGame,
    StartVoting,
}

/// Why a command was refused locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The local player is not at roster index 0.
    NotHost { action: GatedAction },
    /// The roster is smaller than the configured minimum.
    NotEnoughPlayers { action: GatedAction, min: usize },
    /// The resulting server event would not be accepted in this phase.
    WrongPhase { action: GatedAction, phase: Phase },
    /// `join` with a blank name.
    EmptyName,
    /// `chat` with blank text.
    EmptyText,
    /// `chat` before `join`.
    NoLocalName,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotHost {
                action: GatedAction::StartGame,
            } => f.write_str("Only host can start"),
            Self::NotHost {
                action: GatedAction::StartVoting,
            } => f.write_str("Only host can start voting"),
            Self::NotEnoughPlayers {
                action: GatedAction::StartGame,
                min,
            } => write!(f, "Need at least {min} players to start"),
            Self::NotEnoughPlayers {
                action: GatedAction::StartVoting,
                min,
            } => write!(f, "Need at least {min} players to vote"),
            Self::WrongPhase {
                action: GatedAction::StartGame,
                phase,
            } => write!(f, "Cannot start a game during {phase}"),
            Self::WrongPhase {
                action: GatedAction::StartVoting,
                phase,
            } => write!(f, "Cannot start voting during {phase}"),
            Self::EmptyName => f.write_str("Please enter a name"),
            Self::EmptyText => f.write_str("Cannot send an empty message"),
            Self::NoLocalName => f.write_str("Join the room before chatting"),
        }
    }
}

/// Validates commands against the current session and forwards them.
#[derive(Debug, Clone, Copy)]
pub struct CommandDispatcher {
    min_players: usize,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(MIN_PLAYERS)
    }
}

impl CommandDispatcher {
    pub fn new(min_players: usize) -> Self {
        Self { min_players }
    }

    pub fn min_players(&self) -> usize {
        self.min_players
    }

    /// Enter the room as `name`. No host gate.
    ///
    /// # Errors
    ///
    /// [`SessionError::CommandRejectedLocally`] for a blank name, or the
    /// sink's error.
    pub fn join(
        &self,
        session: &mut SessionStateMachine,
        sink: &dyn CommandSink,
        name: &str,
    ) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(reject(session, Rejection::EmptyName));
        }
        sink.send(ClientCommand::Join {
            name: name.to_string(),
        })?;
        session.record_join(name);
        Ok(())
    }

    /// Send a chat line and echo it into the log straight away.
    ///
    /// The echo is not deduplicated against a server relay of the same line.
    ///
    /// # Errors
    ///
    /// [`SessionError::CommandRejectedLocally`] for blank text or before
    /// `join`, or the sink's error.
    pub fn chat(
        &self,
        session: &mut SessionStateMachine,
        sink: &dyn CommandSink,
        text: &str,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Err(reject(session, Rejection::EmptyText));
        }
        let Some(from) = session.local_name().map(str::to_string) else {
            return Err(reject(session, Rejection::NoLocalName));
        };
        sink.send(ClientCommand::ChatMessage {
            from: from.clone(),
            text: text.to_string(),
        })?;
        session.record_own_chat(&from, text);
        Ok(())
    }

    /// Host only; needs the minimum roster and LOBBY, RESULTS or GAME_OVER.
    ///
    /// # Errors
    ///
    /// [`SessionError::CommandRejectedLocally`] when a guard fails, or the
    /// sink's error.
    pub fn start_game(&self, session: &mut SessionStateMachine, sink: &dyn CommandSink) -> Result<()> {
        self.check_host_gate(session, GatedAction::StartGame)?;
        sink.send(ClientCommand::StartGame {})
    }

    /// Host only; needs the minimum roster and CLUES_REVEALED or RESULTS.
    ///
    /// # Errors
    ///
    /// [`SessionError::CommandRejectedLocally`] when a guard fails, or the
    /// sink's error.
    pub fn start_voting(
        &self,
        session: &mut SessionStateMachine,
        sink: &dyn CommandSink,
    ) -> Result<()> {
        self.check_host_gate(session, GatedAction::StartVoting)?;
        sink.send(ClientCommand::StartVoting {})
    }

    /// Forward a clue and keep it, unrevealed, in the local clue map.
    ///
    /// # Errors
    ///
    /// The sink's error.
    pub fn submit_clue(
        &self,
        session: &mut SessionStateMachine,
        sink: &dyn CommandSink,
        clue: &str,
    ) -> Result<()> {
        sink.send(ClientCommand::SubmitClue {
            clue: clue.to_string(),
        })?;
        session.record_own_clue(clue);
        Ok(())
    }

    /// Vote for the player with server id `target_id`.
    ///
    /// # Errors
    ///
    /// The sink's error.
    pub fn cast_vote(&self, sink: &dyn CommandSink, target_id: &str) -> Result<()> {
        sink.send(ClientCommand::CastVote {
            target_id: target_id.to_string(),
        })
    }

    /// Leave the room. Local state is reset even when the command cannot be
    /// delivered.
    ///
    /// # Errors
    ///
    /// The sink's error.
    pub fn leave_room(&self, session: &mut SessionStateMachine, sink: &dyn CommandSink) -> Result<()> {
        let sent = sink.send(ClientCommand::LeaveRoom {});
        session.record_leave();
        info!("left the room");
        sent
    }

    fn check_host_gate(&self, session: &mut SessionStateMachine, action: GatedAction) -> Result<()> {
        if !session.is_host() {
            return Err(reject(session, Rejection::NotHost { action }));
        }
        if session.roster().len() < self.min_players {
            return Err(reject(
                session,
                Rejection::NotEnoughPlayers {
                    action,
                    min: self.min_players,
                },
            ));
        }
        let phase = session.phase();
        let open = match action {
            GatedAction::StartGame => phase.accepts_round_start(),
            GatedAction::StartVoting => phase.accepts_voting_start(),
        };
        if !open {
            return Err(reject(session, Rejection::WrongPhase { action, phase }));
        }
        Ok(())
    }
}

/// Log the rejection as a system notice and turn it into an error.
fn reject(session: &mut SessionStateMachine, rejection: Rejection) -> SessionError {
    debug!(%rejection, phase = %session.phase(), "command rejected locally");
    session.note_system(rejection.to_string());
    SessionError::CommandRejectedLocally(rejection)
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
    use crate::event::TransportEvent;
    use crate::message_log::{Message, MessageKind};
    use crate::protocol::{PlayerInfo, ServerEvent};
    use crate::session::Phase;
    use std::cell::RefCell;

    /// Sink that records commands, or refuses them all when offline.
    #[derive(Default)]
    struct RecordingSink {
        sent: RefCell<Vec<ClientCommand>>,
        offline: bool,
    }

    impl CommandSink for RecordingSink {
        fn send(&self, command: ClientCommand) -> Result<()> {
            if self.offline {
                return Err(SessionError::NotConnected);
            }
            self.sent.borrow_mut().push(command);
            Ok(())
        }
    }

    fn session_as(local: &str, names: &[&str]) -> SessionStateMachine {
        let mut session = SessionStateMachine::new();
        session.record_join(local);
        session.apply(&TransportEvent::Server(ServerEvent::PlayerList(
            names.iter().map(|n| PlayerInfo::new(*n)).collect(),
        )));
        session
    }

    fn reveal_clues(session: &mut SessionStateMachine) {
        session.apply(&TransportEvent::Server(ServerEvent::GameStarted { num_players: 3 }));
        session.apply(&TransportEvent::Server(ServerEvent::AllCluesRevealed {
            clues: Default::default(),
        }));
        assert_eq!(session.phase(), Phase::CluesRevealed);
    }

    fn log_texts(session: &SessionStateMachine) -> Vec<String> {
        session.log().all().map(Message::text).collect()
    }

    #[test]
    fn host_with_full_roster_starts_game() {
        let mut session = session_as("Alice", &["Alice", "Bob", "Carol"]);
        let sink = RecordingSink::default();

        CommandDispatcher::default()
            .start_game(&mut session, &sink)
            .unwrap();
        assert_eq!(*sink.sent.borrow(), [ClientCommand::StartGame {}]);
        assert!(session.log().is_empty());
    }

    #[test]
    fn short_roster_withholds_start_game() {
        let mut session = session_as("Alice", &["Alice", "Bob"]);
        let sink = RecordingSink::default();

        let err = CommandDispatcher::default()
            .start_game(&mut session, &sink)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::CommandRejectedLocally(Rejection::NotEnoughPlayers { min: 3, .. })
        ));
        assert!(sink.sent.borrow().is_empty());
        assert_eq!(log_texts(&session), ["Need at least 3 players to start"]);
        assert_eq!(session.log().last().unwrap().kind(), MessageKind::System);
    }

    #[test]
    fn non_host_cannot_start_voting() {
        let mut session = session_as("Bob", &["Alice", "Bob", "Carol"]);
        let sink = RecordingSink::default();

        let err = CommandDispatcher::default()
            .start_voting(&mut session, &sink)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::CommandRejectedLocally(Rejection::NotHost { .. })
        ));
        assert!(sink.sent.borrow().is_empty());
        assert_eq!(log_texts(&session), ["Only host can start voting"]);
    }

    #[test]
    fn gate_rejection_logs_exactly_one_message() {
        let cases: [(&str, &[&str]); 4] = [
            ("Bob", &["Alice", "Bob", "Carol"]),
            ("Alice", &["Alice", "Bob"]),
            ("Alice", &[]),
            ("Carol", &["Alice"]),
        ];
        for (local, names) in cases {
            for action in [GatedAction::StartGame, GatedAction::StartVoting] {
                let mut session = session_as(local, names);
                let sink = RecordingSink::default();
                let dispatcher = CommandDispatcher::default();
                let result = match action {
                    GatedAction::StartGame => dispatcher.start_game(&mut session, &sink),
                    GatedAction::StartVoting => dispatcher.start_voting(&mut session, &sink),
                };
                assert!(result.is_err());
                assert!(sink.sent.borrow().is_empty());
                assert_eq!(session.log().len(), 1, "{local} {names:?} {action:?}");
            }
        }
    }

    #[test]
    fn gated_commands_wait_for_a_phase_that_accepts_them() {
        let mut session = session_as("Alice", &["Alice", "Bob", "Carol"]);
        let sink = RecordingSink::default();
        let dispatcher = CommandDispatcher::default();

        let err = dispatcher.start_voting(&mut session, &sink).unwrap_err();
        assert!(matches!(
            err,
            SessionError::CommandRejectedLocally(Rejection::WrongPhase {
                action: GatedAction::StartVoting,
                phase: Phase::Lobby
            })
        ));

        session.apply(&TransportEvent::Server(ServerEvent::GameStarted { num_players: 3 }));
        let err = dispatcher.start_game(&mut session, &sink).unwrap_err();
        assert!(matches!(
            err,
            SessionError::CommandRejectedLocally(Rejection::WrongPhase {
                action: GatedAction::StartGame,
                phase: Phase::ClueCollection
            })
        ));
        assert!(sink.sent.borrow().is_empty());
        assert_eq!(
            log_texts(&session)[1..],
            [
                "Game started (3 players)",
                "Cannot start a game during CLUE_COLLECTION"
            ]
        );
        assert_eq!(log_texts(&session)[0], "Cannot start voting during LOBBY");
    }

    #[test]
    fn custom_minimum_is_honoured() {
        let mut session = session_as("Alice", &["Alice", "Bob"]);
        reveal_clues(&mut session);
        let sink = RecordingSink::default();
        CommandDispatcher::new(2)
            .start_voting(&mut session, &sink)
            .unwrap();
        assert_eq!(*sink.sent.borrow(), [ClientCommand::StartVoting {}]);
    }

    #[test]
    fn join_trims_and_records_name() {
        let mut session = SessionStateMachine::new();
        let sink = RecordingSink::default();
        CommandDispatcher::default()
            .join(&mut session, &sink, "  Alice ")
            .unwrap();
        assert_eq!(
            *sink.sent.borrow(),
            [ClientCommand::Join {
                name: "Alice".into()
            }]
        );
        assert_eq!(session.local_name(), Some("Alice"));
    }

    #[test]
    fn blank_join_is_rejected() {
        let mut session = SessionStateMachine::new();
        let sink = RecordingSink::default();
        let err = CommandDispatcher::default()
            .join(&mut session, &sink, "   ")
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::CommandRejectedLocally(Rejection::EmptyName)
        ));
        assert!(session.local_name().is_none());
    }

    #[test]
    fn chat_requires_name_and_echoes_locally() {
        let mut session = SessionStateMachine::new();
        let sink = RecordingSink::default();
        let dispatcher = CommandDispatcher::default();

        let err = dispatcher.chat(&mut session, &sink, "hi").unwrap_err();
        assert!(matches!(
            err,
            SessionError::CommandRejectedLocally(Rejection::NoLocalName)
        ));

        dispatcher.join(&mut session, &sink, "Alice").unwrap();
        assert!(dispatcher.chat(&mut session, &sink, "  ").is_err());
        dispatcher.chat(&mut session, &sink, "hello").unwrap();

        assert_eq!(
            sink.sent.borrow().last(),
            Some(&ClientCommand::ChatMessage {
                from: "Alice".into(),
                text: "hello".into()
            })
        );
        let last = session.log().last().unwrap();
        assert_eq!(last.kind(), MessageKind::Chat);
        assert_eq!(last.text(), "Alice: hello");
    }

    #[test]
    fn offline_chat_is_not_echoed() {
        let mut session = session_as("Alice", &["Alice"]);
        let sink = RecordingSink {
            offline: true,
            ..RecordingSink::default()
        };
        let err = CommandDispatcher::default()
            .chat(&mut session, &sink, "hello")
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        assert!(session.log().is_empty());
    }

    #[test]
    fn clue_and_vote_are_forwarded_without_gates() {
        let mut session = session_as("Bob", &["Alice", "Bob"]);
        session.apply(&TransportEvent::Server(ServerEvent::GameStarted {
            num_players: 2,
        }));
        let sink = RecordingSink::default();
        let dispatcher = CommandDispatcher::default();

        dispatcher.submit_clue(&mut session, &sink, "warm").unwrap();
        dispatcher.cast_vote(&sink, "sid-alice").unwrap();

        assert_eq!(
            *sink.sent.borrow(),
            [
                ClientCommand::SubmitClue {
                    clue: "warm".into()
                },
                ClientCommand::CastVote {
                    target_id: "sid-alice".into()
                },
            ]
        );
        assert!(!session.clue_of("Bob").unwrap().revealed);
    }

    #[test]
    fn leave_resets_even_when_offline() {
        let mut session = session_as("Alice", &["Alice", "Bob", "Carol"]);
        session.apply(&TransportEvent::Server(ServerEvent::GameStarted {
            num_players: 3,
        }));
        let sink = RecordingSink {
            offline: true,
            ..RecordingSink::default()
        };

        let result = CommandDispatcher::default().leave_room(&mut session, &sink);
        assert!(matches!(result, Err(SessionError::NotConnected)));
        assert_eq!(session.phase(), Phase::Lobby);
        assert!(session.roster().is_empty());
        assert_eq!(log_texts(&session), ["You left the room"]);
    }
}
