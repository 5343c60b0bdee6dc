//! Round Protocol
//!
//! The turn-synchronized state machine that drives one hand to completion
//! and negotiates a rematch:
//!
//! ```text
//! DEAL -> DECISIONS(Guest) -> DECISIONS(Host) -> RESOLVE -> REPLAY_VOTE
//!   ^                                                           |
//!   +--------------------- both vote yes ----------------------+
//! ```
//!
//! At every point exactly one side owes the next message; any unexpected
//! line is a detected protocol violation, and any failure unwinds to a
//! terminal [`RoundOutcome`] instead of a crash.

use std::fmt;

use tracing::{debug, info, warn};

use crate::game::{Deck, ExhaustedDeck, Hand};
use crate::network::protocol::Message;
use crate::network::transport::{Role, Session, TransportError};

/// A local player's choice for the current hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Take another card.
    Hit,
    /// Keep the current total.
    Stand,
    /// Abandon the session.
    Quit,
}

/// Source of local decisions: the controlling terminal in the real game,
/// a script in tests. Called once per turn with the current hand, which is
/// also the collaborator's chance to render it.
pub trait PlayerInput {
    /// Choose the next action for `hand`.
    fn decide(&mut self, hand: &Hand) -> Decision;
}

/// Why a session ended before (or instead of) a resolved round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The local player chose to quit.
    LocalQuit,
    /// The peer sent `QUIT`.
    PeerQuit,
    /// The peer closed the stream.
    PeerDisconnected,
    /// The peer sent nothing within the read deadline.
    PeerUnresponsive,
    /// The peer broke the message sequence or the codec.
    ProtocolViolation(String),
    /// A local logic defect (an exhausted deck mid-round).
    Defect(String),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::LocalQuit => write!(f, "local player quit"),
            SessionEnd::PeerQuit => write!(f, "peer quit"),
            SessionEnd::PeerDisconnected => write!(f, "peer disconnected"),
            SessionEnd::PeerUnresponsive => write!(f, "peer unresponsive"),
            SessionEnd::ProtocolViolation(detail) => write!(f, "protocol violation: {detail}"),
            SessionEnd::Defect(detail) => write!(f, "internal defect: {detail}"),
        }
    }
}

/// Terminal result of [`play_round`]. Totals are the values both sides
/// exchanged in RESOLVE, so the same pair of reports yields mirrored
/// outcomes on the two peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// This side won the round.
    Won {
        /// Own reported total.
        own_total: u32,
        /// Peer's reported total.
        peer_total: u32,
    },
    /// This side lost the round.
    Lost {
        /// Own reported total.
        own_total: u32,
        /// Peer's reported total.
        peer_total: u32,
    },
    /// Both sides tied.
    Tied {
        /// Own reported total.
        own_total: u32,
        /// Peer's reported total.
        peer_total: u32,
    },
    /// The session ended without a resolved round.
    Ended(SessionEnd),
}

/// One side's final (total, bust) report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    /// Best hand total as reported.
    pub total: u32,
    /// Whether the hand went over 21.
    pub bust: bool,
}

impl Score {
    fn of(hand: &Hand) -> Self {
        Self {
            total: hand.total(),
            bust: hand.is_bust(),
        }
    }
}

/// Winner determination, evaluated identically on both sides: both bust is
/// a tie, one bust loses, otherwise the higher total wins.
pub fn resolve(own: Score, peer: Score) -> RoundOutcome {
    let (own_total, peer_total) = (own.total, peer.total);
    match (own.bust, peer.bust) {
        (true, true) => RoundOutcome::Tied {
            own_total,
            peer_total,
        },
        (true, false) => RoundOutcome::Lost {
            own_total,
            peer_total,
        },
        (false, true) => RoundOutcome::Won {
            own_total,
            peer_total,
        },
        (false, false) => {
            if own_total > peer_total {
                RoundOutcome::Won {
                    own_total,
                    peer_total,
                }
            } else if own_total < peer_total {
                RoundOutcome::Lost {
                    own_total,
                    peer_total,
                }
            } else {
                RoundOutcome::Tied {
                    own_total,
                    peer_total,
                }
            }
        }
    }
}

/// Internal round failure; [`play_round`] maps it to a terminal outcome.
#[derive(Debug, thiserror::Error)]
enum RoundError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("out-of-sequence message {got:?}, expected {expected}")]
    OutOfSequence { got: Message, expected: &'static str },

    #[error(transparent)]
    Deck(#[from] ExhaustedDeck),
}

fn end_of(err: RoundError) -> SessionEnd {
    match err {
        RoundError::Transport(TransportError::PeerDisconnected) => SessionEnd::PeerDisconnected,
        RoundError::Transport(TransportError::PeerUnresponsive(_)) => SessionEnd::PeerUnresponsive,
        RoundError::Transport(TransportError::Malformed(e)) => {
            SessionEnd::ProtocolViolation(e.to_string())
        }
        // A stream failure mid-round means the peer is gone for our
        // purposes; establishment errors cannot occur here.
        RoundError::Transport(TransportError::Io(_)) => SessionEnd::PeerDisconnected,
        RoundError::Transport(e) => SessionEnd::Defect(e.to_string()),
        RoundError::OutOfSequence { got, expected } => {
            SessionEnd::ProtocolViolation(format!("got {got:?}, expected {expected}"))
        }
        RoundError::Deck(e) => SessionEnd::Defect(e.to_string()),
    }
}

/// Play one complete round on an established session. Never fails: every
/// transport or protocol breakdown is folded into
/// [`RoundOutcome::Ended`] after logging.
pub async fn play_round(session: &mut Session, input: &mut dyn PlayerInput) -> RoundOutcome {
    let result = match session.role() {
        Role::Host => {
            let mut deck = Deck::new();
            deck.shuffle();
            host_round(session, input, deck).await
        }
        Role::Guest => guest_round(session, input).await,
    };

    match result {
        Ok(outcome) => {
            info!(?outcome, role = ?session.role(), "round finished");
            outcome
        }
        Err(e) => {
            warn!("round ended early: {e}");
            RoundOutcome::Ended(end_of(e))
        }
    }
}

/// Host side: owns the deck, deals, answers hits, resolves second.
async fn host_round(
    session: &mut Session,
    input: &mut dyn PlayerInput,
    mut deck: Deck,
) -> Result<RoundOutcome, RoundError> {
    let mut own = Hand::new();
    let mut guest = Hand::new();

    // Opening deal alternates starting with the host's own hand.
    own.push(deck.deal()?);
    guest.push(deck.deal()?);
    own.push(deck.deal()?);
    guest.push(deck.deal()?);

    session.send(&Message::Deal(guest.clone())).await?;
    debug!(own = %own, "opening hands dealt");

    // DECISIONS(Guest): answer each HIT with one dealt card. The mirror of
    // the guest hand exists only to notice the bust that ends this phase
    // without a STAND; scoring trusts the guest's TOTAL report.
    loop {
        if guest.is_bust() {
            debug!("guest hand went bust");
            break;
        }
        match session.recv().await? {
            Message::Hit => {
                let card = deck.deal()?;
                guest.push(card);
                session.send(&Message::Card(card)).await?;
            }
            Message::Stand => break,
            Message::Quit => return Ok(RoundOutcome::Ended(SessionEnd::PeerQuit)),
            got => {
                return Err(RoundError::OutOfSequence {
                    got,
                    expected: "HIT, STAND or QUIT",
                })
            }
        }
    }

    // DECISIONS(Host): purely local, no network traffic.
    loop {
        if own.is_bust() {
            break;
        }
        match input.decide(&own) {
            Decision::Hit => own.push(deck.deal()?),
            Decision::Stand => break,
            Decision::Quit => {
                // Best effort: the peer learns from QUIT or from the EOF.
                let _ = session.send(&Message::Quit).await;
                return Ok(RoundOutcome::Ended(SessionEnd::LocalQuit));
            }
        }
    }
    let own_score = Score::of(&own);

    // RESOLVE: read the guest's report, then send ours.
    let peer_score = match session.recv().await? {
        Message::Total { total, bust } => Score { total, bust },
        Message::Quit => return Ok(RoundOutcome::Ended(SessionEnd::PeerQuit)),
        got => {
            return Err(RoundError::OutOfSequence {
                got,
                expected: "TOTAL",
            })
        }
    };
    session
        .send(&Message::Total {
            total: own_score.total,
            bust: own_score.bust,
        })
        .await?;

    Ok(resolve(own_score, peer_score))
}

/// Guest side: receives the dealt hand, acts first, resolves first.
async fn guest_round(
    session: &mut Session,
    input: &mut dyn PlayerInput,
) -> Result<RoundOutcome, RoundError> {
    let mut hand = match session.recv().await? {
        Message::Deal(hand) => hand,
        Message::Quit => return Ok(RoundOutcome::Ended(SessionEnd::PeerQuit)),
        got => {
            return Err(RoundError::OutOfSequence {
                got,
                expected: "CARTAS",
            })
        }
    };
    debug!(%hand, "opening hand received");

    // DECISIONS(Guest): every hit is a round trip to the host's deck.
    loop {
        if hand.is_bust() {
            debug!("hand went bust");
            break;
        }
        match input.decide(&hand) {
            Decision::Hit => {
                session.send(&Message::Hit).await?;
                match session.recv().await? {
                    Message::Card(card) => hand.push(card),
                    Message::Quit => return Ok(RoundOutcome::Ended(SessionEnd::PeerQuit)),
                    got => {
                        return Err(RoundError::OutOfSequence {
                            got,
                            expected: "CARTA",
                        })
                    }
                }
            }
            Decision::Stand => {
                session.send(&Message::Stand).await?;
                break;
            }
            Decision::Quit => {
                let _ = session.send(&Message::Quit).await;
                return Ok(RoundOutcome::Ended(SessionEnd::LocalQuit));
            }
        }
    }

    // RESOLVE: report first, then read the host's report.
    let own_score = Score::of(&hand);
    session
        .send(&Message::Total {
            total: own_score.total,
            bust: own_score.bust,
        })
        .await?;

    let peer_score = match session.recv().await? {
        Message::Total { total, bust } => Score { total, bust },
        Message::Quit => return Ok(RoundOutcome::Ended(SessionEnd::PeerQuit)),
        got => {
            return Err(RoundError::OutOfSequence {
                got,
                expected: "TOTAL",
            })
        }
    };

    Ok(resolve(own_score, peer_score))
}

/// Exchange replay votes after a resolved round; returns whether the
/// session continues with a fresh deal.
///
/// The contract is asymmetric: a side voting no sends its vote and
/// terminates immediately without reading, while a side voting yes blocks
/// (bounded by the read deadline) for the peer's vote. A rematch therefore
/// requires the full double-yes round trip, and a single no ends the
/// session for both peers once the blocked read completes or fails.
pub async fn vote_replay(session: &mut Session, want_replay: bool) -> bool {
    if !want_replay {
        if let Err(e) = session.send(&Message::ReplayNo).await {
            debug!("could not deliver replay decline: {e}");
        }
        return false;
    }

    if let Err(e) = session.send(&Message::ReplayYes).await {
        warn!("could not deliver replay vote: {e}");
        return false;
    }

    match session.recv().await {
        Ok(Message::ReplayYes) => true,
        Ok(Message::ReplayNo) => {
            info!("peer declined a rematch");
            false
        }
        Ok(got) => {
            warn!(?got, "unexpected message during replay vote");
            false
        }
        // Covers the peer that quit without voting: the bounded read
        // surfaces the severed or silent stream here.
        Err(e) => {
            debug!("session over during replay vote: {e}");
            false
        }
    }
}
