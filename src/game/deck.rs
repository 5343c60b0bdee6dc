//! Deck
//!
//! The 52-card deck. Owned exclusively by the hosting side of a round;
//! the remote peer only ever sees individual dealt cards.

use rand::seq::SliceRandom;

use crate::game::card::Card;

/// Error returned when dealing from an empty deck.
///
/// With two hands drawn from a single 52-card deck this cannot happen in a
/// legal round; it exists so an empty deck is a defined failure rather than
/// a panic, and signals a logic defect if it ever surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("dealt from an empty deck")]
pub struct ExhaustedDeck;

/// A deck of cards. Starts with all 52 distinct (rank, suit) pairs and is
/// mutated only by removal.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Build an unshuffled deck with exactly one of each of the 52 cards.
    pub fn new() -> Self {
        let mut cards = Vec::with_capacity(52);
        for suit in 0..4 {
            for rank in 1..=13 {
                cards.push(Card::new(rank, suit));
            }
        }
        Self { cards }
    }

    /// Shuffle into a uniformly random permutation.
    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut rand::thread_rng());
    }

    /// Remove and return the top card.
    pub fn deal(&mut self) -> Result<Card, ExhaustedDeck> {
        self.cards.pop().ok_or(ExhaustedDeck)
    }

    /// Number of cards left.
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a deck with a known card order; `deal` returns cards from the back
/// of the list. Used to drive deterministic rounds in tests.
impl From<Vec<Card>> for Deck {
    fn from(cards: Vec<Card>) -> Self {
        Self { cards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_deck_has_52_distinct_cards() {
        let deck = Deck::new();
        assert_eq!(deck.remaining(), 52);

        let distinct: HashSet<(u8, u8)> = deck.cards.iter().map(|c| (c.rank(), c.suit())).collect();
        assert_eq!(distinct.len(), 52);
    }

    #[test]
    fn test_deal_removes_cards_until_exhausted() {
        let mut deck = Deck::new();
        for _ in 0..52 {
            deck.deal().unwrap();
        }
        assert_eq!(deck.remaining(), 0);
        assert_eq!(deck.deal(), Err(ExhaustedDeck));
    }

    #[test]
    fn test_shuffle_preserves_card_set() {
        let mut deck = Deck::new();
        let before: HashSet<(u8, u8)> = deck.cards.iter().map(|c| (c.rank(), c.suit())).collect();
        deck.shuffle();
        let after: HashSet<(u8, u8)> = deck.cards.iter().map(|c| (c.rank(), c.suit())).collect();
        assert_eq!(before, after);
        assert_eq!(deck.remaining(), 52);
    }

    #[test]
    fn test_rigged_deck_deals_from_the_back() {
        let mut deck = Deck::from(vec![Card::new(2, 0), Card::new(3, 1)]);
        assert_eq!(deck.deal().unwrap(), Card::new(3, 1));
        assert_eq!(deck.deal().unwrap(), Card::new(2, 0));
        assert_eq!(deck.deal(), Err(ExhaustedDeck));
    }
}
