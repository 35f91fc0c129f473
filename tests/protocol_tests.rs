#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Imposter protocol.
//!
//! Fixtures are written by hand in the shape the game server emits, so a
//! rename or a change of casing on either side breaks these tests rather
//! than a live session.

use std::collections::BTreeMap;

use imposter_client::protocol::{ClientCommand, PlayerInfo, Role, ServerEvent};
use serde_json::{json, Value};

fn parse(fixture: Value) -> ServerEvent {
    serde_json::from_value(fixture).expect("fixture should decode")
}

fn encode(command: &ClientCommand) -> Value {
    serde_json::to_value(command).expect("serialize")
}

// ════════════════════════════════════════════════════════════════════
// Server → client fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn player_list_fixture() {
    let event = parse(json!({
        "event": "player_list",
        "data": [
            {"name": "Alice", "sid": "abc", "alive": true},
            {"name": "Bob"}
        ]
    }));
    assert_eq!(
        event,
        ServerEvent::PlayerList(vec![
            PlayerInfo {
                name: "Alice".into(),
                sid: Some("abc".into())
            },
            PlayerInfo::new("Bob"),
        ])
    );
}

#[test]
fn system_and_chat_fixtures() {
    assert_eq!(
        parse(json!({"event": "system_message", "data": {"text": "Bob joined", "time": 1700000000000u64}})),
        ServerEvent::SystemMessage {
            text: "Bob joined".into(),
            time: Some(1_700_000_000_000)
        }
    );
    assert_eq!(
        parse(json!({"event": "chat_message", "data": {"from": "Bob", "text": "hi"}})),
        ServerEvent::ChatMessage {
            from: "Bob".into(),
            text: "hi".into(),
            time: None
        }
    );
}

#[test]
fn round_fixtures() {
    assert_eq!(
        parse(json!({"event": "game_started", "data": {"numPlayers": 4}})),
        ServerEvent::GameStarted { num_players: 4 }
    );
    assert_eq!(
        parse(json!({"event": "your_role", "data": {"role": "IMPOSTER"}})),
        ServerEvent::YourRole {
            role: Role::Imposter
        }
    );
    assert_eq!(
        parse(json!({"event": "your_word", "data": {"word": "volcano"}})),
        ServerEvent::YourWord {
            word: "volcano".into()
        }
    );
    assert_eq!(
        parse(json!({"event": "clue_submitted", "data": {"name": "Carol"}})),
        ServerEvent::ClueSubmitted {
            name: "Carol".into()
        }
    );

    let ServerEvent::AllCluesRevealed { clues } = parse(json!({
        "event": "all_clues_revealed",
        "data": {"clues": {"Alice": "lava", "Bob": "hot"}}
    })) else {
        panic!("expected all_clues_revealed");
    };
    assert_eq!(clues.len(), 2);
    assert_eq!(clues["Bob"], "hot");
}

#[test]
fn voting_fixtures() {
    assert_eq!(
        parse(json!({"event": "voting_started", "data": {"aliveCount": 5}})),
        ServerEvent::VotingStarted { alive_count: 5 }
    );
    assert_eq!(
        parse(json!({
            "event": "vote_cast",
            "data": {"voterName": "C", "targetName": "A", "time": 1700000000000.5}
        })),
        ServerEvent::VoteCast {
            voter_name: "C".into(),
            target_name: "A".into(),
            time: Some(1_700_000_000_000)
        }
    );
    assert_eq!(
        parse(json!({
            "event": "voting_update",
            "data": {"voters": ["A", "B"], "votesCount": 2, "aliveCount": 5}
        })),
        ServerEvent::VotingUpdate {
            voters: vec!["A".into(), "B".into()],
            votes_count: 2,
            alive_count: 5
        }
    );

    let mut tally = BTreeMap::new();
    tally.insert("A".to_string(), 3);
    tally.insert("B".to_string(), 1);
    assert_eq!(
        parse(json!({
            "event": "vote_results",
            "data": {"eliminatedName": "A", "tally": {"A": 3, "B": 1}}
        })),
        ServerEvent::VoteResults {
            eliminated_name: Some("A".into()),
            tally
        }
    );
}

#[test]
fn tie_vote_results_have_no_elimination() {
    let event = parse(json!({
        "event": "vote_results",
        "data": {"eliminatedName": null, "tally": {"A": 1, "B": 1}}
    }));
    assert!(matches!(
        event,
        ServerEvent::VoteResults {
            eliminated_name: None,
            ..
        }
    ));
}

#[test]
fn voting_update_fields_default_when_absent() {
    assert_eq!(
        parse(json!({"event": "voting_update", "data": {}})),
        ServerEvent::VotingUpdate {
            voters: vec![],
            votes_count: 0,
            alive_count: 0
        }
    );
}

#[test]
fn null_fields_read_as_defaults() {
    assert_eq!(
        parse(json!({
            "event": "voting_update",
            "data": {"voters": null, "votesCount": null, "aliveCount": null}
        })),
        ServerEvent::VotingUpdate {
            voters: vec![],
            votes_count: 0,
            alive_count: 0
        }
    );
    assert_eq!(
        parse(json!({"event": "all_clues_revealed", "data": {"clues": null}})),
        ServerEvent::AllCluesRevealed {
            clues: BTreeMap::new()
        }
    );
    assert_eq!(
        parse(json!({
            "event": "vote_results",
            "data": {"eliminatedName": null, "tally": null}
        })),
        ServerEvent::VoteResults {
            eliminated_name: None,
            tally: BTreeMap::new()
        }
    );
    assert_eq!(
        parse(json!({"event": "game_started", "data": {"numPlayers": null}})),
        ServerEvent::GameStarted { num_players: 0 }
    );
    assert_eq!(
        parse(json!({"event": "voting_started", "data": {"aliveCount": null}})),
        ServerEvent::VotingStarted { alive_count: 0 }
    );
}

#[test]
fn end_and_error_fixtures() {
    assert_eq!(
        parse(json!({"event": "game_over", "data": {"winner": "civilians"}})),
        ServerEvent::GameOver {
            winner: "civilians".into()
        }
    );
    assert_eq!(
        parse(json!({"event": "game_error", "data": {"msg": "Only the host can start"}})),
        ServerEvent::GameError {
            msg: "Only the host can start".into()
        }
    );
}

#[test]
fn unknown_event_is_rejected() {
    let result = serde_json::from_value::<ServerEvent>(json!({"event": "teleport", "data": {}}));
    assert!(result.is_err());
}

#[test]
fn missing_required_field_is_rejected() {
    let result =
        serde_json::from_value::<ServerEvent>(json!({"event": "your_word", "data": {}}));
    assert!(result.is_err());
}

// ════════════════════════════════════════════════════════════════════
// Client → server encoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn commands_encode_as_the_server_expects() {
    assert_eq!(
        encode(&ClientCommand::Join {
            name: "Alice".into()
        }),
        json!({"event": "join", "data": {"name": "Alice"}})
    );
    assert_eq!(
        encode(&ClientCommand::ChatMessage {
            from: "Alice".into(),
            text: "hi".into()
        }),
        json!({"event": "chat_message", "data": {"from": "Alice", "text": "hi"}})
    );
    assert_eq!(
        encode(&ClientCommand::SubmitClue {
            clue: "lava".into()
        }),
        json!({"event": "submit_clue", "data": {"clue": "lava"}})
    );
    assert_eq!(
        encode(&ClientCommand::CastVote {
            target_id: "sid-Bob".into()
        }),
        json!({"event": "cast_vote", "data": {"targetId": "sid-Bob"}})
    );
}

#[test]
fn empty_payload_commands_send_an_empty_object() {
    for (command, name) in [
        (ClientCommand::StartGame {}, "start_game"),
        (ClientCommand::StartVoting {}, "start_voting"),
        (ClientCommand::LeaveRoom {}, "leave_room"),
    ] {
        assert_eq!(encode(&command), json!({"event": name, "data": {}}));
    }
}

#[test]
fn commands_decode_from_their_encoding() {
    let decoded: ClientCommand =
        serde_json::from_str(r#"{"event":"cast_vote","data":{"targetId":"x"}}"#).unwrap();
    assert_eq!(
        decoded,
        ClientCommand::CastVote {
            target_id: "x".into()
        }
    );
}
