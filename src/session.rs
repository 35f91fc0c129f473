//! The session phase machine.
//!
//! [`SessionStateMachine`] consumes [`TransportEvent`]s one at a time and
//! keeps the client-observable view of the room: phase, roster, the local
//! player's private role and word, the clue map, the live voting tally and
//! the display log. The server is authoritative; events whose phase guard
//! does not hold are ignored rather than trusted.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::event::{ConnectionSignal, TransportEvent};
use crate::message_log::{Message, MessageBody, MessageLog};
use crate::protocol::{EventName, PlayerInfo, Role, ServerEvent};
use crate::votes::{VoteAggregator, VoteResult, VotingSnapshot};

// ── Types ───────────────────────────────────────────────────────────

/// Stage of the round lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Lobby,
    ClueCollection,
    CluesRevealed,
    Voting,
    Results,
    GameOver,
}

impl Phase {
    /// Phases between `game_started` and `game_over`.
    pub fn is_in_round(self) -> bool {
        matches!(
            self,
            Self::ClueCollection | Self::CluesRevealed | Self::Voting | Self::Results
        )
    }

    /// Phases from which a new round may begin.
    pub fn accepts_round_start(self) -> bool {
        matches!(self, Self::Lobby | Self::Results | Self::GameOver)
    }

    /// Phases from which voting may open.
    pub fn accepts_voting_start(self) -> bool {
        matches!(self, Self::CluesRevealed | Self::Results)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lobby => "LOBBY",
            Self::ClueCollection => "CLUE_COLLECTION",
            Self::CluesRevealed => "CLUES_REVEALED",
            Self::Voting => "VOTING",
            Self::Results => "RESULTS",
            Self::GameOver => "GAME_OVER",
        };
        f.write_str(name)
    }
}

/// A roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    /// Server connection id; the target of `cast_vote`.
    pub id: Option<String>,
    /// Derived from roster position: only index 0 is host.
    pub is_host: bool,
}

/// One player's clue for the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clue {
    pub player_name: String,
    pub text: String,
    pub revealed: bool,
}

/// Effect of one input on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The phase moved.
    Changed { from: Phase, to: Phase },
    /// Accepted; the phase stayed put (state or log may still have changed).
    Unchanged,
    /// The phase guard did not hold; nothing changed.
    Ignored,
}

// ── State machine ───────────────────────────────────────────────────

/// Client-side view of one room session.
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    phase: Phase,
    roster: Vec<Player>,
    local_name: Option<String>,
    role: Option<Role>,
    word: Option<String>,
    clues: BTreeMap<String, Clue>,
    votes: VoteAggregator,
    last_result: Option<VoteResult>,
    winner: Option<String>,
    log: MessageLog,
    connected: bool,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Inputs ──────────────────────────────────────────────────────

    /// Apply one delivered event.
    pub fn apply(&mut self, event: &TransportEvent) -> Applied {
        match event {
            TransportEvent::Signal(signal) => self.apply_signal(signal),
            TransportEvent::Server(event) => self.apply_server(event),
        }
    }

    fn apply_signal(&mut self, signal: &ConnectionSignal) -> Applied {
        match signal {
            ConnectionSignal::Connected => {
                self.connected = true;
                self.note_system("Connected");
            }
            ConnectionSignal::Disconnected { reason } => {
                self.connected = false;
                debug!(?reason, "session disconnected");
                self.note_system("Disconnected");
            }
            ConnectionSignal::ConnectError { message } => {
                // Surfaced as an alert by the caller, not a log entry.
                self.connected = false;
                debug!("connect error: {message}");
            }
        }
        Applied::Unchanged
    }

    fn apply_server(&mut self, event: &ServerEvent) -> Applied {
        let name = event.name();
        match event {
            ServerEvent::PlayerList(list) => {
                self.replace_roster(list);
                Applied::Unchanged
            }
            ServerEvent::SystemMessage { text, time } => {
                self.log.append(Message::new(MessageBody::system(text.as_str())).with_sent_at(*time));
                Applied::Unchanged
            }
            ServerEvent::ChatMessage { from, text, time } => {
                self.log.append(
                    Message::new(MessageBody::Chat {
                        from: from.clone(),
                        text: text.clone(),
                    })
                    .with_sent_at(*time),
                );
                Applied::Unchanged
            }
            ServerEvent::GameError { msg } => {
                warn!("server reported error: {msg}");
                self.note_system(format!("Error: {msg}"));
                Applied::Unchanged
            }

            ServerEvent::GameStarted { num_players } => {
                if !self.phase.accepts_round_start() {
                    return self.ignore(name);
                }
                self.clear_round();
                self.note_system(format!("Game started ({num_players} players)"));
                self.transition(Phase::ClueCollection)
            }
            ServerEvent::YourRole { role } => {
                if self.phase != Phase::ClueCollection {
                    return self.ignore(name);
                }
                self.role = Some(*role);
                self.note_system(format!("You are {role}"));
                Applied::Unchanged
            }
            ServerEvent::YourWord { word } => {
                if self.phase != Phase::ClueCollection {
                    return self.ignore(name);
                }
                self.word = Some(word.clone());
                self.note_system("Your word assigned");
                Applied::Unchanged
            }
            ServerEvent::ClueSubmitted { name: player } => match self.phase {
                Phase::ClueCollection => {
                    self.note_system(format!("{player} submitted a clue"));
                    Applied::Unchanged
                }
                Phase::Results => {
                    self.begin_next_round();
                    self.note_system(format!("{player} submitted a clue"));
                    self.transition(Phase::ClueCollection)
                }
                _ => self.ignore(name),
            },
            ServerEvent::AllCluesRevealed { clues } => {
                match self.phase {
                    Phase::ClueCollection => {}
                    Phase::Results => self.begin_next_round(),
                    _ => return self.ignore(name),
                }
                self.clues = clues
                    .iter()
                    .map(|(player, text)| {
                        let clue = Clue {
                            player_name: player.clone(),
                            text: text.clone(),
                            revealed: true,
                        };
                        (player.clone(), clue)
                    })
                    .collect();
                self.note_system("All clues revealed");
                self.transition(Phase::CluesRevealed)
            }
            ServerEvent::VotingStarted { alive_count } => {
                match self.phase {
                    Phase::CluesRevealed => {}
                    // Re-vote after a round with no clue stage in between.
                    Phase::Results => self.last_result = None,
                    _ => return self.ignore(name),
                }
                self.votes.reset(*alive_count);
                self.note_system("Voting started");
                self.transition(Phase::Voting)
            }
            ServerEvent::VoteCast {
                voter_name,
                target_name,
                time,
            } => {
                if self.phase != Phase::Voting {
                    return self.ignore(name);
                }
                self.log.append(
                    Message::new(MessageBody::VoteCast {
                        voter: voter_name.clone(),
                        target: target_name.clone(),
                    })
                    .with_sent_at(*time),
                );
                Applied::Unchanged
            }
            ServerEvent::VotingUpdate {
                voters,
                votes_count,
                alive_count,
            } => {
                if self.phase != Phase::Voting {
                    return self.ignore(name);
                }
                self.votes.apply_snapshot(VotingSnapshot {
                    voters: voters.iter().cloned().collect(),
                    votes_count: *votes_count,
                    alive_count: *alive_count,
                });
                Applied::Unchanged
            }
            ServerEvent::VoteResults {
                eliminated_name,
                tally,
            } => {
                if self.phase != Phase::Voting {
                    return self.ignore(name);
                }
                let result = VoteResult {
                    eliminated_name: eliminated_name.clone(),
                    tally: tally.clone(),
                };
                self.log
                    .append(Message::new(MessageBody::VoteResults(result.clone())));
                self.last_result = Some(result);
                self.transition(Phase::Results)
            }
            ServerEvent::GameOver { winner } => {
                if !self.phase.is_in_round() {
                    return self.ignore(name);
                }
                self.clear_secrets();
                self.votes.discard();
                self.winner = Some(winner.clone());
                info!(%winner, "game over");
                self.note_system(format!("Game over, winner: {winner}"));
                self.transition(Phase::GameOver)
            }
        }
    }

    /// Record the local player's name after a forwarded `join`. From
    /// GAME_OVER this returns the session to an empty LOBBY.
    pub fn record_join(&mut self, name: &str) -> Applied {
        self.local_name = Some(name.to_string());
        if self.phase == Phase::GameOver {
            self.clear_round();
            self.roster.clear();
            return self.transition(Phase::Lobby);
        }
        Applied::Unchanged
    }

    /// Reset everything after a forwarded `leave_room`. The log is cleared and
    /// left holding a single notice.
    pub fn record_leave(&mut self) -> Applied {
        self.local_name = None;
        self.clear_round();
        self.roster.clear();
        self.log.clear();
        self.note_system("You left the room");
        if self.phase == Phase::Lobby {
            Applied::Unchanged
        } else {
            self.transition(Phase::Lobby)
        }
    }

    /// Keep the local player's own clue, unrevealed, until the bulk reveal.
    pub fn record_own_clue(&mut self, text: &str) {
        let Some(name) = self.local_name.clone() else {
            return;
        };
        if self.phase != Phase::ClueCollection {
            return;
        }
        self.clues.insert(
            name.clone(),
            Clue {
                player_name: name,
                text: text.to_string(),
                revealed: false,
            },
        );
    }

    /// Optimistic echo of a chat line the local player just sent.
    pub fn record_own_chat(&mut self, from: &str, text: &str) {
        self.log.append(Message::new(MessageBody::Chat {
            from: from.to_string(),
            text: text.to_string(),
        }));
    }

    /// Append a local-only system notice.
    pub fn note_system(&mut self, text: impl Into<String>) {
        self.log.append(Message::new(MessageBody::system(text)));
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Roster in server order; the first entry is host.
    pub fn roster(&self) -> &[Player] {
        &self.roster
    }

    pub fn host(&self) -> Option<&Player> {
        self.roster.first()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// The local player's own roster entry.
    pub fn me(&self) -> Option<&Player> {
        let name = self.local_name.as_deref()?;
        self.roster.iter().find(|p| p.name == name)
    }

    /// `true` when the local player occupies roster index 0.
    pub fn is_host(&self) -> bool {
        match (self.host(), self.local_name.as_deref()) {
            (Some(host), Some(name)) => host.name == name,
            _ => false,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn word(&self) -> Option<&str> {
        self.word.as_deref()
    }

    pub fn clues(&self) -> impl Iterator<Item = &Clue> + '_ {
        self.clues.values()
    }

    pub fn clue_of(&self, player: &str) -> Option<&Clue> {
        self.clues.get(player)
    }

    pub fn votes(&self) -> &VotingSnapshot {
        self.votes.current()
    }

    /// Outcome of the most recent voting round.
    pub fn last_result(&self) -> Option<&VoteResult> {
        self.last_result.as_ref()
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Liveness as last signalled by the connection.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn replace_roster(&mut self, list: &[PlayerInfo]) {
        self.roster = list
            .iter()
            .enumerate()
            .map(|(i, info)| Player {
                name: info.name.clone(),
                id: info.sid.clone(),
                is_host: i == 0,
            })
            .collect();
        debug!(players = self.roster.len(), "roster replaced");
    }

    fn clear_secrets(&mut self) {
        self.role = None;
        self.word = None;
        self.clues.clear();
    }

    fn clear_round(&mut self) {
        self.clear_secrets();
        self.votes.discard();
        self.last_result = None;
        self.winner = None;
    }

    /// Next round of the same game after a non-final elimination: the clue
    /// map and last result go, role and word stay.
    fn begin_next_round(&mut self) {
        self.clues.clear();
        self.votes.discard();
        self.last_result = None;
        info!("next round");
        self.note_system("Next round");
    }

    fn transition(&mut self, to: Phase) -> Applied {
        let from = self.phase;
        self.phase = to;
        debug!(%from, %to, "phase transition");
        Applied::Changed { from, to }
    }

    fn ignore(&self, event: EventName) -> Applied {
        warn!(%event, phase = %self.phase, "ignoring event not valid in current phase");
        Applied::Ignored
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
    use crate::message_log::MessageKind;

    fn server(event: ServerEvent) -> TransportEvent {
        TransportEvent::Server(event)
    }

    fn roster(names: &[&str]) -> TransportEvent {
        server(ServerEvent::PlayerList(
            names.iter().map(|n| PlayerInfo::new(*n)).collect(),
        ))
    }

    fn started(n: u32) -> TransportEvent {
        server(ServerEvent::GameStarted { num_players: n })
    }

    fn revealed(pairs: &[(&str, &str)]) -> TransportEvent {
        server(ServerEvent::AllCluesRevealed {
            clues: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    fn texts(machine: &SessionStateMachine) -> Vec<String> {
        machine.log().all().map(Message::text).collect()
    }

    /// Drive a machine into VOTING with Alice as the local host.
    fn in_voting(alive: u32) -> SessionStateMachine {
        let mut m = SessionStateMachine::new();
        m.record_join("Alice");
        m.apply(&roster(&["Alice", "Bob", "Carol"]));
        m.apply(&started(3));
        m.apply(&revealed(&[("Alice", "sun"), ("Bob", "hot")]));
        m.apply(&server(ServerEvent::VotingStarted { alive_count: alive }));
        assert_eq!(m.phase(), Phase::Voting);
        m
    }

    #[test]
    fn roster_is_replaced_wholesale() {
        let mut m = SessionStateMachine::new();
        m.apply(&roster(&["Alice", "Bob", "Carol"]));
        m.apply(&roster(&["Bob", "Dave"]));

        let names: Vec<&str> = m.roster().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Bob", "Dave"]);
        assert!(m.roster()[0].is_host);
        assert!(!m.roster()[1].is_host);
    }

    #[test]
    fn host_is_derived_from_index_zero() {
        let mut m = SessionStateMachine::new();
        m.record_join("Bob");
        m.apply(&roster(&["Alice", "Bob"]));
        assert!(!m.is_host());
        assert_eq!(m.me().map(|p| p.name.as_str()), Some("Bob"));

        m.apply(&roster(&["Bob"]));
        assert!(m.is_host());
    }

    #[test]
    fn game_started_clears_round_state() {
        let mut m = SessionStateMachine::new();
        assert_eq!(
            m.apply(&started(4)),
            Applied::Changed {
                from: Phase::Lobby,
                to: Phase::ClueCollection
            }
        );
        m.apply(&server(ServerEvent::YourRole { role: Role::Imposter }));
        m.apply(&server(ServerEvent::YourWord { word: "apple".into() }));
        assert_eq!(m.role(), Some(Role::Imposter));
        assert_eq!(m.word(), Some("apple"));
        assert_eq!(
            texts(&m),
            ["Game started (4 players)", "You are imposter", "Your word assigned"]
        );
    }

    #[test]
    fn latest_role_overwrites() {
        let mut m = SessionStateMachine::new();
        m.apply(&started(3));
        m.apply(&server(ServerEvent::YourRole { role: Role::Imposter }));
        m.apply(&server(ServerEvent::YourRole { role: Role::Civilian }));
        assert_eq!(m.role(), Some(Role::Civilian));
    }

    #[test]
    fn clue_submitted_is_log_only() {
        let mut m = SessionStateMachine::new();
        m.apply(&started(3));
        let applied = m.apply(&server(ServerEvent::ClueSubmitted { name: "Bob".into() }));
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(m.clues().count(), 0);
        assert_eq!(m.log().last().unwrap().text(), "Bob submitted a clue");
    }

    #[test]
    fn reveal_replaces_clue_map_atomically() {
        let mut m = SessionStateMachine::new();
        m.record_join("Alice");
        m.apply(&started(3));
        m.record_own_clue("warm");
        assert!(!m.clue_of("Alice").unwrap().revealed);

        m.apply(&revealed(&[("Alice", "sun"), ("Bob", "hot")]));
        assert_eq!(m.phase(), Phase::CluesRevealed);
        assert_eq!(m.clues().count(), 2);
        assert!(m.clues().all(|c| c.revealed));
        assert_eq!(m.clue_of("Alice").unwrap().text, "sun");
    }

    #[test]
    fn voting_started_resets_tally() {
        let m = in_voting(5);
        assert_eq!(m.votes(), &VotingSnapshot::empty(5));
    }

    #[test]
    fn vote_cast_never_touches_tally() {
        let mut m = in_voting(5);
        m.apply(&server(ServerEvent::VotingUpdate {
            voters: vec!["A".into(), "B".into()],
            votes_count: 2,
            alive_count: 5,
        }));
        let before = m.votes().clone();

        m.apply(&server(ServerEvent::VoteCast {
            voter_name: "C".into(),
            target_name: "A".into(),
            time: None,
        }));
        assert_eq!(m.votes(), &before);
        assert_eq!(m.log().last().unwrap().kind(), MessageKind::VoteCast);
    }

    #[test]
    fn results_keep_tally_for_display() {
        let mut m = in_voting(3);
        m.apply(&server(ServerEvent::VotingUpdate {
            voters: vec!["Alice".into(), "Bob".into(), "Carol".into()],
            votes_count: 3,
            alive_count: 3,
        }));
        let applied = m.apply(&server(ServerEvent::VoteResults {
            eliminated_name: Some("Bob".into()),
            tally: [("Bob".to_string(), 2), ("Carol".to_string(), 1)]
                .into_iter()
                .collect(),
        }));
        assert_eq!(
            applied,
            Applied::Changed {
                from: Phase::Voting,
                to: Phase::Results
            }
        );
        assert_eq!(m.votes().votes_count, 3);
        assert_eq!(
            m.last_result().unwrap().eliminated_name.as_deref(),
            Some("Bob")
        );
        assert_eq!(m.log().last().unwrap().kind(), MessageKind::VoteResults);

        // Next round from RESULTS.
        m.apply(&started(2));
        assert_eq!(m.phase(), Phase::ClueCollection);
        assert!(m.last_result().is_none());
        assert_eq!(m.votes(), &VotingSnapshot::default());
    }

    fn in_results() -> SessionStateMachine {
        let mut m = in_voting(3);
        m.apply(&server(ServerEvent::VoteResults {
            eliminated_name: Some("Bob".into()),
            tally: [("Bob".to_string(), 2)].into_iter().collect(),
        }));
        assert_eq!(m.phase(), Phase::Results);
        m
    }

    #[test]
    fn clue_submitted_after_results_opens_next_round() {
        let mut m = SessionStateMachine::new();
        m.record_join("Alice");
        m.apply(&started(3));
        m.apply(&server(ServerEvent::YourRole { role: Role::Imposter }));
        m.apply(&server(ServerEvent::YourWord { word: "sun".into() }));
        m.apply(&revealed(&[("Alice", "hot"), ("Bob", "warm")]));
        m.apply(&server(ServerEvent::VotingStarted { alive_count: 3 }));
        m.apply(&server(ServerEvent::VoteResults {
            eliminated_name: Some("Bob".into()),
            tally: BTreeMap::new(),
        }));

        let applied = m.apply(&server(ServerEvent::ClueSubmitted {
            name: "Carol".into(),
        }));
        assert_eq!(
            applied,
            Applied::Changed {
                from: Phase::Results,
                to: Phase::ClueCollection
            }
        );
        assert_eq!(m.clues().count(), 0);
        assert!(m.last_result().is_none());
        assert_eq!(m.role(), Some(Role::Imposter));
        assert_eq!(m.word(), Some("sun"));

        m.record_own_clue("bright");
        assert!(!m.clue_of("Alice").unwrap().revealed);
    }

    #[test]
    fn reveal_after_results_skips_straight_to_clues_revealed() {
        let mut m = in_results();
        let applied = m.apply(&revealed(&[("Alice", "ash"), ("Carol", "rock")]));
        assert_eq!(
            applied,
            Applied::Changed {
                from: Phase::Results,
                to: Phase::CluesRevealed
            }
        );
        assert_eq!(m.clues().count(), 2);
        assert!(m.clue_of("Bob").is_none());
        assert!(m.clues().all(|c| c.revealed));
    }

    #[test]
    fn voting_restarts_from_results() {
        let mut m = in_results();
        let applied = m.apply(&server(ServerEvent::VotingStarted { alive_count: 2 }));
        assert_eq!(
            applied,
            Applied::Changed {
                from: Phase::Results,
                to: Phase::Voting
            }
        );
        assert_eq!(m.votes(), &VotingSnapshot::empty(2));
        assert!(m.last_result().is_none());
    }

    #[test]
    fn game_over_clears_secrets_from_any_round_phase() {
        for steps in 0..4 {
            let mut m = SessionStateMachine::new();
            m.record_join("Alice");
            m.apply(&started(3));
            m.apply(&server(ServerEvent::YourRole { role: Role::Civilian }));
            m.apply(&server(ServerEvent::YourWord { word: "sun".into() }));
            m.record_own_clue("hot");
            if steps > 0 {
                m.apply(&revealed(&[("Alice", "hot")]));
            }
            if steps > 1 {
                m.apply(&server(ServerEvent::VotingStarted { alive_count: 3 }));
            }
            if steps > 2 {
                m.apply(&server(ServerEvent::VoteResults {
                    eliminated_name: None,
                    tally: BTreeMap::new(),
                }));
            }

            m.apply(&server(ServerEvent::GameOver {
                winner: "civilians".into(),
            }));
            assert_eq!(m.phase(), Phase::GameOver, "after {steps} steps");
            assert!(m.role().is_none());
            assert!(m.word().is_none());
            assert_eq!(m.clues().count(), 0);
            assert_eq!(m.votes(), &VotingSnapshot::default());
            assert_eq!(m.winner(), Some("civilians"));
            assert_eq!(
                m.log().last().unwrap().text(),
                "Game over, winner: civilians"
            );
        }
    }

    #[test]
    fn out_of_phase_events_are_ignored() {
        let mut m = SessionStateMachine::new();
        let before = m.log().len();

        for event in [
            server(ServerEvent::YourRole { role: Role::Imposter }),
            server(ServerEvent::YourWord { word: "x".into() }),
            revealed(&[("A", "x")]),
            server(ServerEvent::VotingStarted { alive_count: 3 }),
            server(ServerEvent::VotingUpdate {
                voters: vec!["A".into()],
                votes_count: 1,
                alive_count: 3,
            }),
            server(ServerEvent::GameOver { winner: "x".into() }),
        ] {
            assert_eq!(m.apply(&event), Applied::Ignored);
        }
        assert_eq!(m.phase(), Phase::Lobby);
        assert!(m.role().is_none());
        assert_eq!(m.log().len(), before);

        m.apply(&started(3));
        assert_eq!(m.apply(&started(3)), Applied::Ignored);
    }

    #[test]
    fn game_error_is_logged_without_phase_change() {
        let mut m = in_voting(3);
        let applied = m.apply(&server(ServerEvent::GameError {
            msg: "already voted".into(),
        }));
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(m.phase(), Phase::Voting);
        assert_eq!(m.log().last().unwrap().text(), "Error: already voted");
    }

    #[test]
    fn connection_signals_track_liveness() {
        let mut m = SessionStateMachine::new();
        m.apply(&TransportEvent::Signal(ConnectionSignal::Connected));
        assert!(m.is_connected());
        m.apply(&TransportEvent::Signal(ConnectionSignal::ConnectError {
            message: "refused".into(),
        }));
        assert!(!m.is_connected());
        m.apply(&TransportEvent::Signal(ConnectionSignal::Disconnected {
            reason: None,
        }));
        assert_eq!(texts(&m), ["Connected", "Disconnected"]);
    }

    #[test]
    fn join_from_game_over_returns_to_empty_lobby() {
        let mut m = SessionStateMachine::new();
        m.apply(&roster(&["Alice", "Bob", "Carol"]));
        m.apply(&started(3));
        m.apply(&server(ServerEvent::GameOver { winner: "x".into() }));

        let applied = m.record_join("Alice");
        assert_eq!(
            applied,
            Applied::Changed {
                from: Phase::GameOver,
                to: Phase::Lobby
            }
        );
        assert!(m.roster().is_empty());
        assert!(m.winner().is_none());
    }

    #[test]
    fn leave_resets_everything_and_clears_log() {
        let mut m = in_voting(3);
        m.apply(&server(ServerEvent::ChatMessage {
            from: "Bob".into(),
            text: "hi".into(),
            time: Some(1),
        }));

        m.record_leave();
        assert_eq!(m.phase(), Phase::Lobby);
        assert!(m.roster().is_empty());
        assert!(m.local_name().is_none());
        assert_eq!(m.votes(), &VotingSnapshot::default());
        assert_eq!(texts(&m), ["You left the room"]);
    }

    #[test]
    fn own_clue_requires_name_and_clue_phase() {
        let mut m = SessionStateMachine::new();
        m.apply(&started(3));
        m.record_own_clue("orphan");
        assert_eq!(m.clues().count(), 0);

        m.record_join("Alice");
        m.record_own_clue("warm");
        assert_eq!(m.clue_of("Alice").unwrap().text, "warm");
    }
}
