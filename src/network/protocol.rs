//! Protocol Messages
//!
//! Wire vocabulary for the game session and the flat text codec that
//! carries it. Every message travels as one newline-delimited ASCII line;
//! a card encodes as `<rank>,<suit>` and a hand as cards joined by `;`
//! with a trailing `;`. Decoding is the single place untrusted peer input
//! enters the process, so it rejects anything malformed instead of
//! guessing.

use crate::game::{Card, Hand};

/// Wire tag for the initial deal (Host -> Guest).
const TAG_DEAL: &str = "CARTAS:";
/// Wire tag for a single dealt card (Host -> Guest).
const TAG_CARD: &str = "CARTA:";
/// Wire tag for a final total.
const TAG_TOTAL: &str = "TOTAL:";
/// Wire tag for a final total that went bust.
const TAG_TOTAL_BUST: &str = "TOTAL:BUST:";

/// Codec failure on a received line. Fatal to the session that received
/// it; the offending token is carried for the log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The line does not start with any known tag.
    #[error("unknown message tag in {token:?}")]
    UnknownTag {
        /// The offending line.
        token: String,
    },

    /// A card token failed to parse or was out of range.
    #[error("malformed card token {token:?}")]
    BadCard {
        /// The offending card token.
        token: String,
    },

    /// A total payload was not an integer.
    #[error("malformed total in {token:?}")]
    BadTotal {
        /// The offending line.
        token: String,
    },
}

// =============================================================================
// MESSAGES
// =============================================================================

/// A protocol message. No variant carries implicit state; a round is fully
/// determined by the sequence of messages exchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Host -> Guest: the Guest's opening hand.
    Deal(Hand),

    /// Guest -> Host: request one more card.
    Hit,

    /// Host -> Guest: the card dealt for a `Hit`.
    Card(Card),

    /// Guest -> Host: final decision, no more cards.
    Stand,

    /// Either side: own final total, flagged when the hand went bust.
    Total {
        /// Best hand total as computed by the sender.
        total: u32,
        /// Whether the sender's hand went over 21.
        bust: bool,
    },

    /// Either side: immediate termination, sender abandons the session.
    Quit,

    /// Replay vote: sender wants another round.
    ReplayYes,

    /// Replay vote: sender is done.
    ReplayNo,
}

impl Message {
    /// Encode to one wire line (without the trailing newline).
    pub fn encode(&self) -> String {
        match self {
            Message::Deal(hand) => format!("{TAG_DEAL}{}", encode_hand(hand)),
            Message::Hit => "HIT".to_string(),
            Message::Card(card) => format!("{TAG_CARD}{}", encode_card(*card)),
            Message::Stand => "STAND".to_string(),
            Message::Total { total, bust: true } => format!("{TAG_TOTAL_BUST}{total}"),
            Message::Total { total, bust: false } => format!("{TAG_TOTAL}{total}"),
            Message::Quit => "QUIT".to_string(),
            Message::ReplayYes => "QUIERO_JUGAR".to_string(),
            Message::ReplayNo => "NO_QUIERO_JUGAR".to_string(),
        }
    }

    /// Decode one wire line (trailing newline already stripped).
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        match line {
            "HIT" => return Ok(Message::Hit),
            "STAND" => return Ok(Message::Stand),
            "QUIT" => return Ok(Message::Quit),
            "QUIERO_JUGAR" => return Ok(Message::ReplayYes),
            "NO_QUIERO_JUGAR" => return Ok(Message::ReplayNo),
            _ => {}
        }

        if let Some(payload) = line.strip_prefix(TAG_DEAL) {
            return Ok(Message::Deal(decode_hand(payload)?));
        }
        if let Some(payload) = line.strip_prefix(TAG_CARD) {
            return Ok(Message::Card(decode_card(payload)?));
        }
        // TOTAL:BUST: must be tried before its prefix TOTAL:
        if let Some(payload) = line.strip_prefix(TAG_TOTAL_BUST) {
            return Ok(Message::Total {
                total: decode_total(payload, line)?,
                bust: true,
            });
        }
        if let Some(payload) = line.strip_prefix(TAG_TOTAL) {
            return Ok(Message::Total {
                total: decode_total(payload, line)?,
                bust: false,
            });
        }

        Err(ProtocolError::UnknownTag {
            token: line.to_string(),
        })
    }
}

// =============================================================================
// CARD AND HAND TOKENS
// =============================================================================

/// Encode a card as `<rank>,<suit>`.
pub fn encode_card(card: Card) -> String {
    format!("{},{}", card.rank(), card.suit())
}

/// Decode a `<rank>,<suit>` token, rejecting out-of-range values.
pub fn decode_card(token: &str) -> Result<Card, ProtocolError> {
    let bad = || ProtocolError::BadCard {
        token: token.to_string(),
    };

    let (rank, suit) = token.split_once(',').ok_or_else(bad)?;
    let rank: u8 = rank.trim().parse().map_err(|_| bad())?;
    let suit: u8 = suit.trim().parse().map_err(|_| bad())?;
    if !(1..=13).contains(&rank) || suit > 3 {
        return Err(bad());
    }
    Ok(Card::new(rank, suit))
}

/// Encode a hand as `;`-joined cards with a trailing `;`.
pub fn encode_hand(hand: &Hand) -> String {
    let mut out = String::new();
    for card in hand.cards() {
        out.push_str(&encode_card(*card));
        out.push(';');
    }
    out
}

/// Decode a `;`-separated card list; empty segments are skipped so the
/// trailing separator is harmless.
pub fn decode_hand(token: &str) -> Result<Hand, ProtocolError> {
    token
        .split(';')
        .filter(|segment| !segment.is_empty())
        .map(decode_card)
        .collect()
}

fn decode_total(payload: &str, line: &str) -> Result<u32, ProtocolError> {
    payload.trim().parse().map_err(|_| ProtocolError::BadTotal {
        token: line.to_string(),
    })
}
