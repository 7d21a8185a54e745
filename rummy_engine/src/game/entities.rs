use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    collections::BTreeMap,
    fmt::{self},
    str::FromStr,
};

use super::constants;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
    // Printed jokers carry this suit and a value of 0.
    Joker,
}

impl Suit {
    pub const STANDARD: [Suit; 4] = [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart];

    fn code(self) -> &'static str {
        match self {
            Self::Club => "C",
            Self::Spade => "S",
            Self::Diamond => "D",
            Self::Heart => "H",
            Self::Joker => "K",
        }
    }
}

/// Placeholder for card values.
pub type Value = u8;

/// A card is a tuple of a value (ace=1u8 ... king=13u8) and a suit.
/// A printed joker is depicted as `Card(0, Suit::Joker)`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Card(pub Value, pub Suit);

impl Card {
    pub const JOKER: Card = Card(0, Suit::Joker);

    #[must_use]
    pub fn is_printed_joker(&self) -> bool {
        self.1 == Suit::Joker
    }

    /// Printed jokers and every card of the round's wild rank substitute
    /// for any card inside a set or an impure sequence.
    #[must_use]
    pub fn is_wild(&self, wild_rank: Value) -> bool {
        self.is_printed_joker() || self.0 == wild_rank
    }

    /// Face value used for scoring unmatched cards.
    #[must_use]
    pub fn points(&self, wild_rank: Value, face_points: u32) -> u32 {
        if self.is_wild(wild_rank) {
            return 0;
        }
        match self.0 {
            1 | 11..=13 => face_points,
            v => u32::from(v),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_printed_joker() {
            return write!(f, "JK");
        }
        let value = match self.0 {
            1 => "A",
            11 => "J",
            12 => "Q",
            13 => "K",
            v => &v.to_string(),
        };
        write!(f, "{value}{}", self.1.code())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid card code {0:?}")]
pub struct ParseCardError(pub String);

impl FromStr for Card {
    type Err = ParseCardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code == "JK" {
            return Ok(Card::JOKER);
        }
        if code.len() < 2 || !code.is_ascii() {
            return Err(ParseCardError(s.to_string()));
        }
        let (value, suit) = code.split_at(code.len() - 1);
        let suit = match suit {
            "C" => Suit::Club,
            "S" => Suit::Spade,
            "D" => Suit::Diamond,
            "H" => Suit::Heart,
            _ => return Err(ParseCardError(s.to_string())),
        };
        let value = match value {
            "A" => 1,
            "J" => 11,
            "Q" => 12,
            "K" => 13,
            v => match v.parse::<Value>() {
                Ok(n @ 2..=10) => n,
                _ => return Err(ParseCardError(s.to_string())),
            },
        };
        Ok(Card(value, suit))
    }
}

impl Serialize for Card {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Card {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Multiset of cards keyed by card, used for hand and conservation checks.
pub type CardCounts = BTreeMap<Card, usize>;

pub fn card_counts<'a, I>(cards: I) -> CardCounts
where
    I: IntoIterator<Item = &'a Card>,
{
    let mut counts = CardCounts::new();
    for card in cards {
        *counts.entry(*card).or_default() += 1;
    }
    counts
}

/// Ordered stack of cards; the top of the stack is the end of the vector.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Unshuffled deck of `decks` standard 52-card packs plus `printed_jokers`.
    #[must_use]
    pub fn standard(decks: u8, printed_jokers: u8) -> Self {
        let mut cards = Vec::with_capacity(usize::from(decks) * 52 + usize::from(printed_jokers));
        for _ in 0..decks {
            for value in 1u8..=13 {
                for suit in Suit::STANDARD {
                    cards.push(Card(value, suit));
                }
            }
        }
        cards.extend(std::iter::repeat_n(Card::JOKER, usize::from(printed_jokers)));
        Self { cards }
    }

    #[must_use]
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    #[must_use]
    pub fn top(&self) -> Option<&Card> {
        self.cards.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Removes every card except the top one and returns them bottom-first.
    pub fn take_all_but_top(&mut self) -> Vec<Card> {
        match self.cards.pop() {
            Some(top) => {
                let rest = std::mem::take(&mut self.cards);
                self.cards.push(top);
                rest
            }
            None => Vec::new(),
        }
    }
}

/// Type alias for minor currency units. Wallet balances, holds, boot
/// values and deltas all use this unit.
pub type Money = i64;

/// Type alias for user ids issued by the external auth service.
pub type UserId = i64;

/// Type alias for seat positions during the game.
pub type SeatIndex = usize;

/// A hand arranged into groups by the player.
pub type Groups = Vec<Vec<Card>>;

#[must_use]
pub fn default_hand_capacity() -> usize {
    constants::DEFAULT_HAND_SIZE + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_card_codes_parse() {
        assert_eq!("AS".parse::<Card>().unwrap(), Card(1, Suit::Spade));
        assert_eq!("10h".parse::<Card>().unwrap(), Card(10, Suit::Heart));
        assert_eq!("QC".parse::<Card>().unwrap(), Card(12, Suit::Club));
        assert_eq!("JK".parse::<Card>().unwrap(), Card::JOKER);
    }

    #[test]
    fn test_card_codes_reject_garbage() {
        for code in ["", "1S", "11D", "ZZ", "AX", "J", "♠A"] {
            assert!(code.parse::<Card>().is_err(), "{code} should not parse");
        }
    }

    #[test]
    fn test_card_display_matches_code() {
        for code in ["AS", "2C", "10D", "JH", "KS", "JK"] {
            let card: Card = code.parse().unwrap();
            assert_eq!(card.to_string(), code);
        }
    }

    #[test]
    fn test_card_serde_uses_codes() {
        let json = serde_json::to_string(&vec![Card(13, Suit::Diamond), Card::JOKER]).unwrap();
        assert_eq!(json, r#"["KD","JK"]"#);
        let back: Vec<Card> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Card(13, Suit::Diamond), Card::JOKER]);
    }

    #[test]
    fn test_card_points() {
        let wild = 5;
        assert_eq!(Card(1, Suit::Heart).points(wild, 10), 10);
        assert_eq!(Card(13, Suit::Heart).points(wild, 10), 10);
        assert_eq!(Card(7, Suit::Heart).points(wild, 10), 7);
        assert_eq!(Card(5, Suit::Club).points(wild, 10), 0);
        assert_eq!(Card::JOKER.points(wild, 10), 0);
    }

    #[test]
    fn test_standard_deck_size() {
        let deck = Deck::standard(2, 2);
        assert_eq!(deck.len(), 106);
        let counts = card_counts(deck.cards());
        assert_eq!(counts[&Card(1, Suit::Spade)], 2);
        assert_eq!(counts[&Card::JOKER], 2);
    }

    #[test]
    fn test_deck_shuffle_preserves_cards() {
        let mut deck = Deck::standard(1, 1);
        let before = card_counts(deck.cards());
        deck.shuffle(&mut StdRng::seed_from_u64(7));
        assert_eq!(card_counts(deck.cards()), before);
    }

    #[test]
    fn test_take_all_but_top() {
        let mut pile = Deck::from_cards(vec![Card(2, Suit::Club), Card(3, Suit::Club), Card(4, Suit::Club)]);
        let rest = pile.take_all_but_top();
        assert_eq!(rest, vec![Card(2, Suit::Club), Card(3, Suit::Club)]);
        assert_eq!(pile.cards(), &[Card(4, Suit::Club)]);
    }
}
