//! # LanJack
//!
//! Serverless LAN blackjack: two peers discover each other over UDP
//! broadcast and play a turn-based game over one persistent TCP session,
//! with no central server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          LANJACK                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Deterministic card model                  │
//! │  ├── card.rs     - Immutable card + blackjack value          │
//! │  ├── deck.rs     - 52-card deck, shuffle, deal               │
//! │  └── hand.rs     - Ordered hand, soft-ace total              │
//! │                                                              │
//! │  network/        - Non-deterministic I/O                     │
//! │  ├── protocol.rs - Wire vocabulary + flat text codec         │
//! │  ├── discovery.rs- UDP broadcast responder + prober          │
//! │  ├── transport.rs- TCP session establishment + deadlines     │
//! │  ├── session.rs  - Round state machine + replay votes        │
//! │  └── diag.rs     - Network self-diagnostics                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trust Model
//!
//! Exactly two peers that trust each other's reported totals. The hosting
//! side owns the only deck; the guest never sees more than the cards dealt
//! to it. There is no authentication and no state survives the process.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::{Card, Deck, Hand};
pub use network::protocol::Message;
pub use network::session::{
    play_round, vote_replay, Decision, PlayerInput, RoundOutcome, SessionEnd,
};
pub use network::transport::{connect_to, host_session, Role, Session, TransportConfig};
pub use network::{diagnose, search_peers};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TCP port the game session runs on.
pub const DEFAULT_GAME_PORT: u16 = 5555;

/// UDP port used for peer discovery.
pub const DEFAULT_DISCOVERY_PORT: u16 = 5556;
