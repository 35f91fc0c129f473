//! Wire types for the Imposter game protocol.
//!
//! Every frame is a JSON text message shaped as an adjacently tagged envelope:
//!
//! ```json
//! {"event": "voting_update", "data": {"voters": ["A"], "votesCount": 1, "aliveCount": 4}}
//! ```
//!
//! Event names are `snake_case`, payload fields are `camelCase`. Unknown
//! payload fields are ignored so the server can grow its payloads freely.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ── Enums ───────────────────────────────────────────────────────────

/// A player's secret role for the current round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Knows the secret word.
    #[serde(alias = "CIVILIAN", alias = "Civilian")]
    Civilian,
    /// Does not know the word and tries to blend in.
    #[serde(alias = "IMPOSTER", alias = "Imposter")]
    Imposter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Civilian => f.write_str("civilian"),
            Self::Imposter => f.write_str("imposter"),
        }
    }
}

/// Names of every event a subscriber can register for, including the three
/// connection-level signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventName {
    Connect,
    Disconnect,
    ConnectError,
    PlayerList,
    SystemMessage,
    ChatMessage,
    GameStarted,
    YourRole,
    YourWord,
    ClueSubmitted,
    AllCluesRevealed,
    VotingStarted,
    VoteCast,
    VotingUpdate,
    VoteResults,
    GameOver,
    GameError,
}

impl EventName {
    /// Every event name, connection signals first.
    pub const ALL: [EventName; 17] = [
        Self::Connect,
        Self::Disconnect,
        Self::ConnectError,
        Self::PlayerList,
        Self::SystemMessage,
        Self::ChatMessage,
        Self::GameStarted,
        Self::YourRole,
        Self::YourWord,
        Self::ClueSubmitted,
        Self::AllCluesRevealed,
        Self::VotingStarted,
        Self::VoteCast,
        Self::VotingUpdate,
        Self::VoteResults,
        Self::GameOver,
        Self::GameError,
    ];

    /// The name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ConnectError => "connect_error",
            Self::PlayerList => "player_list",
            Self::SystemMessage => "system_message",
            Self::ChatMessage => "chat_message",
            Self::GameStarted => "game_started",
            Self::YourRole => "your_role",
            Self::YourWord => "your_word",
            Self::ClueSubmitted => "clue_submitted",
            Self::AllCluesRevealed => "all_clues_revealed",
            Self::VotingStarted => "voting_started",
            Self::VoteCast => "vote_cast",
            Self::VotingUpdate => "voting_update",
            Self::VoteResults => "vote_results",
            Self::GameOver => "game_over",
            Self::GameError => "game_error",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A roster entry as pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerInfo {
    pub name: String,
    /// Server-side connection id, used as the `cast_vote` target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl PlayerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sid: None,
        }
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Events pushed from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Full roster snapshot; index 0 is the host.
    PlayerList(Vec<PlayerInfo>),
    /// Server-authored notice.
    SystemMessage {
        text: String,
        #[serde(
            default,
            deserialize_with = "epoch_millis",
            skip_serializing_if = "Option::is_none"
        )]
        time: Option<u64>,
    },
    /// Chat line relayed by the server.
    ChatMessage {
        from: String,
        text: String,
        #[serde(
            default,
            deserialize_with = "epoch_millis",
            skip_serializing_if = "Option::is_none"
        )]
        time: Option<u64>,
    },
    /// A round has begun.
    GameStarted {
        #[serde(default, deserialize_with = "null_as_default")]
        num_players: u32,
    },
    /// Private: the local player's role.
    YourRole { role: Role },
    /// Private: the local player's secret word.
    YourWord { word: String },
    /// Someone submitted a clue (content hidden until reveal).
    ClueSubmitted { name: String },
    /// Every clue of the round, revealed at once.
    AllCluesRevealed {
        #[serde(default, deserialize_with = "null_as_default")]
        clues: BTreeMap<String, String>,
    },
    /// Voting has opened.
    VotingStarted {
        #[serde(default, deserialize_with = "null_as_default")]
        alive_count: u32,
    },
    /// Someone voted (display only; never folded into the tally).
    VoteCast {
        voter_name: String,
        target_name: String,
        #[serde(
            default,
            deserialize_with = "epoch_millis",
            skip_serializing_if = "Option::is_none"
        )]
        time: Option<u64>,
    },
    /// Authoritative full tally.
    VotingUpdate {
        #[serde(default, deserialize_with = "null_as_default")]
        voters: Vec<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        votes_count: u32,
        #[serde(default, deserialize_with = "null_as_default")]
        alive_count: u32,
    },
    /// Outcome of the voting round.
    VoteResults {
        #[serde(default)]
        eliminated_name: Option<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        tally: BTreeMap<String, u32>,
    },
    /// The game has ended.
    GameOver { winner: String },
    /// Non-fatal error reported by the server.
    GameError { msg: String },
}

impl ServerEvent {
    /// The wire name of this event.
    pub fn name(&self) -> EventName {
        match self {
            Self::PlayerList(_) => EventName::PlayerList,
            Self::SystemMessage { .. } => EventName::SystemMessage,
            Self::ChatMessage { .. } => EventName::ChatMessage,
            Self::GameStarted { .. } => EventName::GameStarted,
            Self::YourRole { .. } => EventName::YourRole,
            Self::YourWord { .. } => EventName::YourWord,
            Self::ClueSubmitted { .. } => EventName::ClueSubmitted,
            Self::AllCluesRevealed { .. } => EventName::AllCluesRevealed,
            Self::VotingStarted { .. } => EventName::VotingStarted,
            Self::VoteCast { .. } => EventName::VoteCast,
            Self::VotingUpdate { .. } => EventName::VotingUpdate,
            Self::VoteResults { .. } => EventName::VoteResults,
            Self::GameOver { .. } => EventName::GameOver,
            Self::GameError { .. } => EventName::GameError,
        }
    }
}

/// Commands sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// Enter the room under a display name.
    Join { name: String },
    /// Post a chat line.
    ChatMessage { from: String, text: String },
    /// Host only: begin a round.
    StartGame {},
    /// Submit this round's clue.
    SubmitClue { clue: String },
    /// Host only: open voting.
    StartVoting {},
    /// Vote to eliminate the player with the given server id.
    CastVote { target_id: String },
    /// Leave the room.
    LeaveRoom {},
}

impl ClientCommand {
    /// The wire name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::ChatMessage { .. } => "chat_message",
            Self::StartGame {} => "start_game",
            Self::SubmitClue { .. } => "submit_clue",
            Self::StartVoting {} => "start_voting",
            Self::CastVote { .. } => "cast_vote",
            Self::LeaveRoom {} => "leave_room",
        }
    }
}

/// Accepts integer or floating-point epoch milliseconds. Negative or
/// non-finite values read as absent.
fn epoch_millis<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
}

/// Reads an explicit `null` as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
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
    fn event_names_are_unique() {
        let mut names: Vec<&str> = EventName::ALL.iter().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventName::ALL.len());
    }

    #[test]
    fn server_event_name_matches_tag() {
        let event = ServerEvent::VotingStarted { alive_count: 4 };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name().as_str());
    }

    #[test]
    fn client_command_name_matches_tag() {
        let commands = [
            ClientCommand::Join { name: "A".into() },
            ClientCommand::ChatMessage {
                from: "A".into(),
                text: "hi".into(),
            },
            ClientCommand::StartGame {},
            ClientCommand::SubmitClue { clue: "x".into() },
            ClientCommand::StartVoting {},
            ClientCommand::CastVote {
                target_id: "sid".into(),
            },
            ClientCommand::LeaveRoom {},
        ];
        for command in &commands {
            let json: serde_json::Value = serde_json::to_value(command).unwrap();
            assert_eq!(json["event"], command.name());
        }
    }

    #[test]
    fn float_time_is_truncated_to_millis() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"event":"system_message","data":{"text":"hi","time":1700000000123.9}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::SystemMessage {
                text: "hi".into(),
                time: Some(1_700_000_000_123),
            }
        );
    }

    #[test]
    fn negative_time_reads_as_absent() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"event":"chat_message","data":{"from":"A","text":"x","time":-5}}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::ChatMessage { time: None, .. }));
    }

    #[test]
    fn role_accepts_mixed_case() {
        for raw in ["\"imposter\"", "\"IMPOSTER\"", "\"Imposter\""] {
            let role: Role = serde_json::from_str(raw).unwrap();
            assert_eq!(role, Role::Imposter);
        }
        assert_eq!(Role::Civilian.to_string(), "civilian");
    }
}
