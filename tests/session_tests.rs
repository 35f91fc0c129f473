#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end session flows through [`GameSession`].
//!
//! Every test drives a real [`ConnectionManager`](imposter_client::ConnectionManager)
//! link task over the in-process connector from `tests/common`, so commands
//! and events cross the same channels and serialization as in production.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use imposter_client::{
    Applied, ClientCommand, EventName, MessageKind, Phase, Rejection, Role, ServerEvent,
    SessionError, VotingSnapshot,
};
use tokio_test::{assert_err, assert_ok};

use common::{
    clues, deliver, joined, log_texts, next_update, roster, session_over, voting_update,
    ScriptedConnector,
};

// ════════════════════════════════════════════════════════════════════
// Host gates
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn host_with_three_players_starts_game() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let mut server = joined(&connector, &mut session, "Alice").await;

    deliver(&server, &mut session, roster(&["Alice", "Bob", "Carol"])).await;
    assert!(session.state().is_host());

    assert_ok!(session.start_game());
    assert_eq!(server.next_command().await, ClientCommand::StartGame {});
}

#[tokio::test]
async fn host_with_two_players_is_refused_locally() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let mut server = joined(&connector, &mut session, "Alice").await;

    deliver(&server, &mut session, roster(&["Alice", "Bob"])).await;
    let log_before = session.log().len();

    let err = assert_err!(session.start_game());
    assert!(matches!(
        err,
        SessionError::CommandRejectedLocally(Rejection::NotEnoughPlayers { min: 3, .. })
    ));
    assert_eq!(session.log().len(), log_before + 1);
    let last = session.log().last().unwrap();
    assert_eq!(last.kind(), MessageKind::System);
    assert_eq!(last.text(), "Need at least 3 players to start");

    // The next command on the wire is the chat, so nothing was sent in between.
    session.chat("anyone else?").unwrap();
    assert!(matches!(
        server.next_command().await,
        ClientCommand::ChatMessage { .. }
    ));
    assert_eq!(session.phase(), Phase::Lobby);
}

#[tokio::test]
async fn non_host_cannot_start_voting() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let mut server = joined(&connector, &mut session, "Bob").await;

    deliver(&server, &mut session, roster(&["Alice", "Bob", "Carol"])).await;
    deliver(&server, &mut session, ServerEvent::GameStarted { num_players: 3 }).await;
    deliver(&server, &mut session, clues(&[("Alice", "a"), ("Bob", "b"), ("Carol", "c")])).await;

    let err = assert_err!(session.start_voting());
    assert!(matches!(
        err,
        SessionError::CommandRejectedLocally(Rejection::NotHost { .. })
    ));
    assert_eq!(session.log().last().unwrap().text(), "Only host can start voting");
    assert!(server.try_next_command().is_none());
}

// ════════════════════════════════════════════════════════════════════
// Roster and round lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn player_list_twice_keeps_only_latest() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "Alice").await;

    deliver(&server, &mut session, roster(&["Alice", "Bob", "Carol"])).await;
    let update = deliver(&server, &mut session, roster(&["Dave", "Alice"])).await;
    assert_eq!(update.event, EventName::PlayerList);
    assert_eq!(update.applied, Applied::Unchanged);

    let names: Vec<_> = session
        .state()
        .roster()
        .iter()
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(names, ["Dave", "Alice"]);
    assert!(!session.state().is_host());
    assert_eq!(
        session.state().me().and_then(|p| p.id.as_deref()),
        Some("sid-Alice")
    );
}

#[tokio::test]
async fn full_round_reaches_results_and_game_over() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let mut server = joined(&connector, &mut session, "Alice").await;

    deliver(&server, &mut session, roster(&["Alice", "Bob", "Carol"])).await;
    session.start_game().unwrap();
    assert_eq!(server.next_command().await, ClientCommand::StartGame {});

    let started = deliver(&server, &mut session, ServerEvent::GameStarted { num_players: 3 }).await;
    assert_eq!(
        started.applied,
        Applied::Changed {
            from: Phase::Lobby,
            to: Phase::ClueCollection
        }
    );
    deliver(&server, &mut session, ServerEvent::YourRole { role: Role::Civilian }).await;
    deliver(&server, &mut session, ServerEvent::YourWord { word: "volcano".into() }).await;
    assert_eq!(session.state().role(), Some(Role::Civilian));
    assert_eq!(session.state().word(), Some("volcano"));

    session.submit_clue("lava").unwrap();
    assert_eq!(
        server.next_command().await,
        ClientCommand::SubmitClue { clue: "lava".into() }
    );
    assert!(!session.state().clue_of("Alice").unwrap().revealed);

    deliver(&server, &mut session, ServerEvent::ClueSubmitted { name: "Bob".into() }).await;
    deliver(
        &server,
        &mut session,
        clues(&[("Alice", "lava"), ("Bob", "hot"), ("Carol", "mountain")]),
    )
    .await;
    assert_eq!(session.phase(), Phase::CluesRevealed);
    assert!(session.state().clues().all(|c| c.revealed));

    session.start_voting().unwrap();
    assert_eq!(server.next_command().await, ClientCommand::StartVoting {});
    deliver(&server, &mut session, ServerEvent::VotingStarted { alive_count: 3 }).await;

    session.cast_vote("sid-Bob").unwrap();
    assert_eq!(
        server.next_command().await,
        ClientCommand::CastVote {
            target_id: "sid-Bob".into()
        }
    );
    deliver(&server, &mut session, voting_update(&["Alice", "Carol", "Bob"], 3, 3)).await;
    let results = deliver(
        &server,
        &mut session,
        ServerEvent::VoteResults {
            eliminated_name: Some("Bob".into()),
            tally: [("Bob".to_string(), 2), ("Carol".to_string(), 1)]
                .into_iter()
                .collect(),
        },
    )
    .await;
    assert_eq!(
        results.applied,
        Applied::Changed {
            from: Phase::Voting,
            to: Phase::Results
        }
    );
    assert_eq!(session.state().votes().votes_count, 3);

    deliver(&server, &mut session, ServerEvent::GameOver { winner: "civilians".into() }).await;
    assert_eq!(session.phase(), Phase::GameOver);

    assert_eq!(
        log_texts(&session),
        [
            "Connected",
            "Game started (3 players)",
            "You are civilian",
            "Your word assigned",
            "Bob submitted a clue",
            "All clues revealed",
            "Voting started",
            "Bob was eliminated",
            "Game over, winner: civilians",
        ]
    );
}

#[tokio::test]
async fn game_continues_into_next_round_after_elimination() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let mut server = joined(&connector, &mut session, "Alice").await;

    deliver(&server, &mut session, roster(&["Alice", "Bob", "Carol", "Dave"])).await;
    deliver(&server, &mut session, ServerEvent::GameStarted { num_players: 4 }).await;
    deliver(&server, &mut session, ServerEvent::YourRole { role: Role::Civilian }).await;
    deliver(&server, &mut session, ServerEvent::YourWord { word: "volcano".into() }).await;
    deliver(&server, &mut session, clues(&[("Alice", "lava"), ("Bob", "hot")])).await;
    deliver(&server, &mut session, ServerEvent::VotingStarted { alive_count: 4 }).await;
    deliver(
        &server,
        &mut session,
        ServerEvent::VoteResults {
            eliminated_name: Some("Bob".into()),
            tally: [("Bob".to_string(), 3)].into_iter().collect(),
        },
    )
    .await;
    assert_eq!(session.phase(), Phase::Results);

    // Round two: the clue stage opens without a new game_started.
    let next = deliver(&server, &mut session, ServerEvent::ClueSubmitted { name: "Carol".into() }).await;
    assert_eq!(
        next.applied,
        Applied::Changed {
            from: Phase::Results,
            to: Phase::ClueCollection
        }
    );
    assert_eq!(session.state().clues().count(), 0);
    assert!(session.state().last_result().is_none());
    assert_eq!(session.state().role(), Some(Role::Civilian));
    assert_eq!(session.state().word(), Some("volcano"));

    session.submit_clue("ash").unwrap();
    assert_eq!(
        server.next_command().await,
        ClientCommand::SubmitClue { clue: "ash".into() }
    );
    deliver(&server, &mut session, clues(&[("Alice", "ash"), ("Carol", "rock")])).await;
    assert_eq!(session.phase(), Phase::CluesRevealed);
    assert_eq!(session.state().clue_of("Alice").unwrap().text, "ash");

    session.start_voting().unwrap();
    assert_eq!(server.next_command().await, ClientCommand::StartVoting {});
    deliver(&server, &mut session, ServerEvent::VotingStarted { alive_count: 3 }).await;
    assert_eq!(session.phase(), Phase::Voting);
    assert_eq!(session.state().votes(), &VotingSnapshot::empty(3));

    deliver(
        &server,
        &mut session,
        ServerEvent::VoteResults {
            eliminated_name: None,
            tally: [("Carol".to_string(), 1), ("Dave".to_string(), 1)]
                .into_iter()
                .collect(),
        },
    )
    .await;

    // A tie goes straight to a re-vote, which the host may open from RESULTS.
    session.start_voting().unwrap();
    assert_eq!(server.next_command().await, ClientCommand::StartVoting {});
    let revote = deliver(&server, &mut session, ServerEvent::VotingStarted { alive_count: 3 }).await;
    assert_eq!(
        revote.applied,
        Applied::Changed {
            from: Phase::Results,
            to: Phase::Voting
        }
    );
    assert_eq!(session.state().clues().count(), 2);
}

#[tokio::test]
async fn game_over_clears_private_state() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "Alice").await;

    deliver(&server, &mut session, ServerEvent::GameStarted { num_players: 4 }).await;
    deliver(&server, &mut session, ServerEvent::YourRole { role: Role::Imposter }).await;
    deliver(&server, &mut session, ServerEvent::YourWord { word: "secret".into() }).await;
    deliver(&server, &mut session, clues(&[("Alice", "x"), ("Bob", "y")])).await;
    deliver(&server, &mut session, ServerEvent::VotingStarted { alive_count: 4 }).await;
    deliver(&server, &mut session, voting_update(&["Bob"], 1, 4)).await;

    deliver(&server, &mut session, ServerEvent::GameOver { winner: "imposter".into() }).await;
    let state = session.state();
    assert!(state.role().is_none());
    assert!(state.word().is_none());
    assert_eq!(state.clues().count(), 0);
    assert_eq!(state.votes(), &VotingSnapshot::default());
    assert_eq!(state.winner(), Some("imposter"));
}

#[tokio::test]
async fn voting_tally_follows_latest_snapshot_only() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "A").await;

    deliver(&server, &mut session, ServerEvent::GameStarted { num_players: 5 }).await;
    deliver(&server, &mut session, clues(&[("A", "1")])).await;

    deliver(&server, &mut session, ServerEvent::VotingStarted { alive_count: 5 }).await;
    assert_eq!(session.state().votes(), &VotingSnapshot::empty(5));

    deliver(&server, &mut session, voting_update(&["A", "B"], 2, 5)).await;
    let expected = VotingSnapshot {
        voters: ["A", "B"].iter().map(|s| s.to_string()).collect(),
        votes_count: 2,
        alive_count: 5,
    };
    assert_eq!(session.state().votes(), &expected);

    deliver(
        &server,
        &mut session,
        ServerEvent::VoteCast {
            voter_name: "C".into(),
            target_name: "A".into(),
            time: Some(1_700_000_000_000),
        },
    )
    .await;
    assert_eq!(session.state().votes(), &expected);
    let cast = session.log().last().unwrap();
    assert_eq!(cast.kind(), MessageKind::VoteCast);
    assert_eq!(cast.sent_at, Some(1_700_000_000_000));
}

#[tokio::test]
async fn out_of_phase_event_leaves_state_and_log_untouched() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "Alice").await;
    let log_before = session.log().len();

    let update = deliver(&server, &mut session, ServerEvent::VotingStarted { alive_count: 3 }).await;
    assert_eq!(update.applied, Applied::Ignored);
    assert_eq!(session.phase(), Phase::Lobby);
    assert_eq!(session.log().len(), log_before);
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "Alice").await;

    server.push_raw("not json");
    server.push_raw(r#"{"event":"bogus","data":{}}"#);
    let update = deliver(&server, &mut session, ServerEvent::GameError { msg: "nope".into() }).await;
    assert_eq!(update.event, EventName::GameError);
    assert!(matches!(
        update.server_error,
        Some(SessionError::ServerReported(ref msg)) if msg == "nope"
    ));
    assert_eq!(update.applied, Applied::Unchanged);
    assert_eq!(session.log().last().unwrap().text(), "Error: nope");
}

// ════════════════════════════════════════════════════════════════════
// Chat and leave
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn chat_is_echoed_and_server_relay_is_kept() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let mut server = joined(&connector, &mut session, "Alice").await;

    session.chat("hello").unwrap();
    assert_eq!(
        server.next_command().await,
        ClientCommand::ChatMessage {
            from: "Alice".into(),
            text: "hello".into()
        }
    );
    deliver(
        &server,
        &mut session,
        ServerEvent::ChatMessage {
            from: "Alice".into(),
            text: "hello".into(),
            time: None,
        },
    )
    .await;

    let chats = session
        .log()
        .all()
        .filter(|m| m.kind() == MessageKind::Chat)
        .count();
    assert_eq!(chats, 2);
}

#[tokio::test]
async fn leave_room_resets_session_and_log() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let mut server = joined(&connector, &mut session, "Alice").await;

    deliver(&server, &mut session, roster(&["Alice", "Bob", "Carol"])).await;
    deliver(&server, &mut session, ServerEvent::GameStarted { num_players: 3 }).await;

    session.leave_room().unwrap();
    assert_eq!(server.next_command().await, ClientCommand::LeaveRoom {});
    assert_eq!(session.phase(), Phase::Lobby);
    assert!(session.state().roster().is_empty());
    assert!(session.state().local_name().is_none());
    assert_eq!(log_texts(&session), ["You left the room"]);
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn refused_connect_reports_connection_failed() {
    let connector = ScriptedConnector::new();
    connector.refuse("server unreachable");
    let mut session = session_over(&connector);

    let err = session.connect("http://10.0.0.1:5050").await.unwrap_err();
    assert!(matches!(err, SessionError::ConnectionFailed(ref m) if m.contains("unreachable")));
    assert!(err.remediation_hint().unwrap().contains("same network"));
    assert!(!session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn silent_server_times_out() {
    let connector = ScriptedConnector::new();
    connector.hang();
    let mut session = session_over(&connector);

    let err = session.connect("http://10.0.0.1:5050").await.unwrap_err();
    assert!(matches!(err, SessionError::ConnectionTimeout));
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn invalid_endpoint_keeps_current_connection() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "Alice").await;
    let generation = session.generation();

    let err = session.change_endpoint("not a url").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidEndpoint { .. }));
    assert!(err.remediation_hint().unwrap().contains("valid URL"));
    assert_eq!(session.generation(), generation);
    assert!(session.is_connected());
    assert_eq!(connector.attempts(), 1);

    // Still receiving on the original connection.
    deliver(&server, &mut session, roster(&["Alice"])).await;
    assert!(session.state().is_host());
}

#[tokio::test]
async fn endpoint_change_silences_the_old_connection() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let old_server = joined(&connector, &mut session, "Alice").await;

    let extra_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&extra_calls);
    session.subscribe(EventName::ChatMessage, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Arrives on the old link but is not applied before the switch.
    old_server.push(&ServerEvent::ChatMessage {
        from: "Ghost".into(),
        text: "boo".into(),
        time: None,
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let new_server = connector.accept();
    session.change_endpoint("http://10.0.0.2:5050").await.unwrap();
    assert_eq!(
        connector.endpoints(),
        ["http://127.0.0.1:5050/", "http://10.0.0.2:5050/"]
    );
    assert_eq!(session.preferred_endpoint(), "http://10.0.0.2:5050/");

    old_server.push(&ServerEvent::ChatMessage {
        from: "Ghost".into(),
        text: "still here".into(),
        time: None,
    });
    deliver(&new_server, &mut session, roster(&["Alice", "Bob", "Carol"])).await;

    assert!(!log_texts(&session).iter().any(|t| t.starts_with("Ghost")));
    assert_eq!(extra_calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.state().roster().len(), 3);
    assert!(old_server.client_closed());
}

#[tokio::test]
async fn drop_then_automatic_reconnect() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "Alice").await;
    let mut second = connector.accept();

    server.hang_up();
    let dropped = next_update(&mut session).await;
    assert_eq!(dropped.event, EventName::Disconnect);
    assert!(!session.state().is_connected());

    let back = next_update(&mut session).await;
    assert_eq!(back.event, EventName::Connect);
    assert!(session.is_connected());
    assert_eq!(connector.attempts(), 2);

    // Same generation: commands flow over the replacement transport.
    session.chat("back").unwrap();
    assert!(matches!(
        second.next_command().await,
        ClientCommand::ChatMessage { .. }
    ));
    assert_eq!(
        log_texts(&session),
        ["Connected", "Disconnected", "Connected", "Alice: back"]
    );
}

#[tokio::test]
async fn reconnect_gives_up_after_five_attempts() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "Alice").await;

    server.fail("connection reset");
    assert_eq!(next_update(&mut session).await.event, EventName::Disconnect);
    for _ in 0..5 {
        assert_eq!(next_update(&mut session).await.event, EventName::ConnectError);
    }
    assert_eq!(next_update(&mut session).await.event, EventName::Disconnect);
    assert_eq!(connector.attempts(), 1 + 5);
    assert!(matches!(session.chat("hello?"), Err(SessionError::NotConnected)));
}

#[tokio::test]
async fn disconnect_applies_final_signal() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let server = joined(&connector, &mut session, "Alice").await;

    session.disconnect().await;
    assert!(!session.is_connected());
    assert_eq!(session.log().last().unwrap().text(), "Disconnected");
    assert!(server.client_closed());
}

#[tokio::test]
async fn join_from_game_over_returns_to_lobby() {
    let connector = ScriptedConnector::new();
    let mut session = session_over(&connector);
    let mut server = joined(&connector, &mut session, "Alice").await;

    deliver(&server, &mut session, roster(&["Alice", "Bob", "Carol"])).await;
    deliver(&server, &mut session, ServerEvent::GameStarted { num_players: 3 }).await;
    deliver(&server, &mut session, ServerEvent::GameOver { winner: "imposter".into() }).await;

    session.join("Alice").unwrap();
    assert_eq!(
        server.next_command().await,
        ClientCommand::Join {
            name: "Alice".into()
        }
    );
    assert_eq!(session.phase(), Phase::Lobby);
    assert!(session.state().roster().is_empty());
}
