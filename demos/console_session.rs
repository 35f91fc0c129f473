//! # Console Session Example
//!
//! A line-oriented Imposter client over WebSocket:
//!
//! 1. Resolve the server endpoint (argument, saved preference, or default)
//! 2. Connect, showing a remediation hint if that fails
//! 3. Join under `IMPOSTER_NAME` and print every new log line
//! 4. Turn stdin lines into commands until `/leave` or Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # With an Imposter server on localhost:5050:
//! IMPOSTER_NAME=Alice cargo run --example console_session
//!
//! # Switch (and remember) the server address:
//! cargo run --example console_session -- http://192.168.1.100:5050
//! ```
//!
//! ## Commands
//!
//! `/start`, `/clue <text>`, `/voting`, `/vote <name>`, `/server <url>`,
//! `/leave`; anything else is sent as chat.

use imposter_client::{GameSession, JsonFileStore, SessionConfig, SessionError, WebSocketConnector};
use tokio::io::{AsyncBufReadExt, BufReader};

const PREFS_FILE: &str = "imposter-client/prefs.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let store = JsonFileStore::new(std::env::temp_dir().join(PREFS_FILE));
    let mut session = GameSession::new(
        WebSocketConnector::new(),
        store,
        SessionConfig::default(),
    );
    let name = std::env::var("IMPOSTER_NAME").unwrap_or_else(|_| "RustPlayer".to_string());

    // ── Connect ─────────────────────────────────────────────────────
    let connected = match std::env::args().nth(1) {
        Some(url) => session.change_endpoint(&url).await,
        None => session.connect_preferred().await,
    };
    if let Err(e) = connected {
        alert(&e);
        return Ok(());
    }
    println!("connected to {}", session.preferred_endpoint());
    session.join(&name)?;

    // ── Event loop ──────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;
    loop {
        tokio::select! {
            update = session.process_next() => {
                if update.is_none() {
                    break;
                }
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match run_command(&mut session, line.trim()).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(SessionError::CommandRejectedLocally(_)) => {}
                    Err(e) if e.is_connection_error() => alert(&e),
                    Err(e) => eprintln!("! {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\ninterrupted");
                break;
            }
        }

        // The log only grows, except on leave, which we exit after.
        for message in session.log().all().skip(printed) {
            println!("{}", message.text());
        }
        printed = session.log().len();
    }

    session.disconnect().await;
    Ok(())
}

/// Returns `Ok(true)` when the user asked to quit.
async fn run_command(session: &mut GameSession, line: &str) -> Result<bool, SessionError> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "/start" => session.start_game()?,
        "/voting" => session.start_voting()?,
        "/clue" => session.submit_clue(rest)?,
        "/vote" => {
            let target = session
                .state()
                .roster()
                .iter()
                .find(|p| p.name == rest)
                .and_then(|p| p.id.clone());
            match target {
                Some(id) => session.cast_vote(&id)?,
                None => eprintln!("! no player named {rest:?}"),
            }
        }
        "/server" => session.change_endpoint(rest).await?,
        "/leave" => {
            session.leave_room()?;
            return Ok(true);
        }
        _ => session.chat(line)?,
    }
    Ok(false)
}

fn alert(error: &SessionError) {
    eprintln!("! {error}");
    if let Some(hint) = error.remediation_hint() {
        eprintln!("  {hint}");
    }
}
