//! # Imposter Client
//!
//! Client-side protocol state machine for the Imposter social-deduction party
//! game.
//!
//! The crate turns the stream of server-pushed events into a consistent view
//! of the room: which phase the round is in, who is host, what the local
//! player privately knows, and the live voting tally. It also tolerates
//! transport drops and a mid-session change of server endpoint.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **Generation-safe**: handlers of a superseded connection never fire
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketTransport` and `WebSocketConnector`
//! - **Snapshot voting**: only the latest authoritative tally is kept
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> imposter_client::Result<()> {
//! use imposter_client::{GameSession, MemoryStore, SessionConfig, WebSocketConnector};
//!
//! let mut session = GameSession::new(
//!     WebSocketConnector::new(),
//!     MemoryStore::new(),
//!     SessionConfig::default(),
//! );
//! session.change_endpoint("http://192.168.1.100:5050").await?;
//! session.join("Alice")?;
//!
//! while let Some(update) = session.process_next().await {
//!     println!("{} -> phase {}", update.event, session.phase());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod message_log;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;
pub mod votes;

// Re-export primary types for ergonomic imports.
pub use client::{GameSession, SessionUpdate};
pub use config::{ReconnectPolicy, SessionConfig};
pub use connection::{ConnectionManager, ConnectionOutcome};
pub use dispatcher::{CommandDispatcher, CommandSink, Rejection};
pub use endpoint::{Endpoint, EndpointPreference, JsonFileStore, MemoryStore, PreferenceStore};
pub use error::{Result, SessionError};
pub use event::{ConnectionSignal, Generation, TransportEvent};
pub use message_log::{Message, MessageBody, MessageKind, MessageLog};
pub use protocol::{ClientCommand, EventName, PlayerInfo, Role, ServerEvent};
pub use session::{Applied, Phase, SessionStateMachine};
pub use transport::{Connector, Transport};
pub use votes::{VoteAggregator, VoteResult, VotingSnapshot};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
