//! Network Layer
//!
//! Peer discovery, session transport and the round protocol. Everything
//! non-deterministic lives here; card logic stays in `game/`.

pub mod diag;
pub mod discovery;
pub mod protocol;
pub mod session;
pub mod transport;

pub use diag::{diagnose, NetReport};
pub use discovery::{detect_local_ip, search_peers, DiscoveryError, Responder, PROBE_MESSAGE};
pub use protocol::{Message, ProtocolError};
pub use session::{
    play_round, resolve, vote_replay, Decision, PlayerInput, RoundOutcome, Score, SessionEnd,
};
pub use transport::{connect_to, host_session, Role, Session, TransportConfig, TransportError};
