//! Meld classification, declare validation and loser hand scoring.
//!
//! Printed jokers and cards of the round's wild rank substitute for any
//! card inside a set or an impure sequence. A pure sequence may still
//! contain a wild-rank card as long as it sits in its natural position.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entities::{Card, Value, card_counts};

/// Highest rank value; aces may also be played above kings as 14.
const KING: Value = 13;
const ACE_HIGH: Value = 14;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeldKind {
    PureSequence,
    ImpureSequence,
    Set,
}

impl MeldKind {
    #[must_use]
    pub fn is_sequence(self) -> bool {
        matches!(self, Self::PureSequence | Self::ImpureSequence)
    }
}

/// Why a declare was turned down. The round continues after any of these.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclareRejection {
    #[error("declared cards do not match the hand")]
    CardsMismatch,
    #[error("group {index} is not a valid set or sequence")]
    InvalidGroup { index: usize },
    #[error("a pure sequence is required")]
    NoPureSequence,
    #[error("need at least {required} sequences")]
    NotEnoughSequences { required: usize },
}

/// Rule values needed to judge melds and count points for one round.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScoringRules {
    pub wild_rank: Value,
    pub face_points: u32,
    pub max_points: u32,
    pub min_pure_sequences: usize,
    pub min_sequences: usize,
}

/// Classifies a group, preferring the strongest kind it qualifies for.
#[must_use]
pub fn classify(group: &[Card], wild_rank: Value) -> Option<MeldKind> {
    if is_pure_sequence(group) {
        Some(MeldKind::PureSequence)
    } else if is_impure_sequence(group, wild_rank) {
        Some(MeldKind::ImpureSequence)
    } else if is_set(group, wild_rank) {
        Some(MeldKind::Set)
    } else {
        None
    }
}

fn is_pure_sequence(group: &[Card]) -> bool {
    if group.len() < 3 || group.iter().any(Card::is_printed_joker) {
        return false;
    }
    let suit = group[0].1;
    if group.iter().any(|c| c.1 != suit) {
        return false;
    }
    [false, true].into_iter().any(|ace_high| {
        let mut values: Vec<Value> = group.iter().map(|c| rank(c.0, ace_high)).collect();
        values.sort_unstable();
        values.windows(2).all(|w| w[1] == w[0] + 1)
    })
}

fn is_impure_sequence(group: &[Card], wild_rank: Value) -> bool {
    if group.len() < 3 || group.len() > usize::from(KING) {
        return false;
    }
    let naturals: Vec<Card> = group.iter().copied().filter(|c| !c.is_wild(wild_rank)).collect();
    let Some(first) = naturals.first() else {
        return true;
    };
    if naturals.iter().any(|c| c.1 != first.1) {
        return false;
    }
    [false, true].into_iter().any(|ace_high| {
        let mut values: Vec<Value> = naturals.iter().map(|c| rank(c.0, ace_high)).collect();
        values.sort_unstable();
        if values.windows(2).any(|w| w[0] == w[1]) {
            return false;
        }
        let span = usize::from(values[values.len() - 1] - values[0]) + 1;
        span <= group.len()
    })
}

fn is_set(group: &[Card], wild_rank: Value) -> bool {
    if !(3..=4).contains(&group.len()) {
        return false;
    }
    let naturals: Vec<Card> = group.iter().copied().filter(|c| !c.is_wild(wild_rank)).collect();
    let Some(first) = naturals.first() else {
        return true;
    };
    if naturals.iter().any(|c| c.0 != first.0) {
        return false;
    }
    let mut suits: Vec<_> = naturals.iter().map(|c| c.1).collect();
    suits.sort_unstable();
    suits.dedup();
    suits.len() == naturals.len()
}

fn rank(value: Value, ace_high: bool) -> Value {
    if ace_high && value == 1 { ACE_HIGH } else { value }
}

/// Checks a declare against the hand held at declare time.
///
/// # Arguments
///
/// * `hand` - Every card the declaring seat holds, including the finish card
/// * `groups` - The arrangement submitted with the declare
/// * `finish_card` - The card placed on the discard pile to close the round
/// * `rules` - Wild rank and sequence minimums for this round
///
/// # Returns
///
/// * `Result<(), DeclareRejection>` - The first reason the declare fails
pub fn validate_declare(
    hand: &[Card],
    groups: &[Vec<Card>],
    finish_card: Card,
    rules: &ScoringRules,
) -> Result<(), DeclareRejection> {
    let declared = groups.iter().flatten().chain(std::iter::once(&finish_card));
    if card_counts(declared) != card_counts(hand) {
        return Err(DeclareRejection::CardsMismatch);
    }

    let mut pure = 0;
    let mut sequences = 0;
    for (index, group) in groups.iter().enumerate() {
        let kind = classify(group, rules.wild_rank).ok_or(DeclareRejection::InvalidGroup { index })?;
        if kind == MeldKind::PureSequence {
            pure += 1;
        }
        if kind.is_sequence() {
            sequences += 1;
        }
    }

    if pure < rules.min_pure_sequences {
        return Err(DeclareRejection::NoPureSequence);
    }
    if sequences < rules.min_sequences {
        return Err(DeclareRejection::NotEnoughSequences {
            required: rules.min_sequences,
        });
    }
    Ok(())
}

/// Returns true when `groups` use exactly the cards of `hand`.
#[must_use]
pub fn is_partition(hand: &[Card], groups: &[Vec<Card>]) -> bool {
    card_counts(groups.iter().flatten()) == card_counts(hand)
}

/// Points owed by a losing hand, capped at `max_points`.
///
/// Groups whose cards are no longer all in the hand are ignored and their
/// cards count as loose cards.
#[must_use]
pub fn hand_points(hand: &[Card], groups: &[Vec<Card>], rules: &ScoringRules) -> u32 {
    let mut remaining = card_counts(hand);
    let mut melds = Vec::new();
    for group in groups {
        let needed = card_counts(group);
        let available = needed
            .iter()
            .all(|(card, n)| remaining.get(card).copied().unwrap_or(0) >= *n);
        if !available || group.is_empty() {
            continue;
        }
        for (card, n) in needed {
            if let Some(left) = remaining.get_mut(&card) {
                *left -= n;
            }
        }
        melds.push((group, classify(group, rules.wild_rank)));
    }

    let pure = melds
        .iter()
        .filter(|(_, kind)| *kind == Some(MeldKind::PureSequence))
        .count();
    let sequences = melds
        .iter()
        .filter(|(_, kind)| kind.is_some_and(MeldKind::is_sequence))
        .count();
    let has_pure = pure >= rules.min_pure_sequences.max(1);
    let all_melds_free = has_pure && sequences >= rules.min_sequences;

    let card_points = |c: &Card| c.points(rules.wild_rank, rules.face_points);
    let mut total: u32 = remaining
        .iter()
        .map(|(card, n)| card_points(card) * *n as u32)
        .sum();
    for (group, kind) in &melds {
        let free = match kind {
            Some(MeldKind::PureSequence) => has_pure,
            Some(_) => all_melds_free,
            None => false,
        };
        if !free {
            total += group.iter().map(card_points).sum::<u32>();
        }
    }
    total.min(rules.max_points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Suit;

    fn cards(codes: &str) -> Vec<Card> {
        codes.split_whitespace().map(|c| c.parse().unwrap()).collect()
    }

    fn rules(wild_rank: Value) -> ScoringRules {
        ScoringRules {
            wild_rank,
            face_points: 10,
            max_points: 80,
            min_pure_sequences: 1,
            min_sequences: 2,
        }
    }

    #[test]
    fn test_pure_sequence_ace_low_and_high() {
        assert_eq!(classify(&cards("AH 2H 3H"), 9), Some(MeldKind::PureSequence));
        assert_eq!(classify(&cards("QS KS AS"), 9), Some(MeldKind::PureSequence));
        assert_eq!(classify(&cards("KS AS 2S"), 9), None);
    }

    #[test]
    fn test_pure_sequence_allows_wild_rank_in_place() {
        assert_eq!(classify(&cards("4D 5D 6D"), 5), Some(MeldKind::PureSequence));
    }

    #[test]
    fn test_printed_joker_makes_sequence_impure() {
        assert_eq!(classify(&cards("4D JK 6D"), 9), Some(MeldKind::ImpureSequence));
        assert_eq!(classify(&cards("4D 6D 9C"), 9), Some(MeldKind::ImpureSequence));
    }

    #[test]
    fn test_impure_sequence_rejects_mixed_suits() {
        assert_eq!(classify(&cards("4D 5C JK"), 9), None);
    }

    #[test]
    fn test_sets() {
        assert_eq!(classify(&cards("7H 7S 7D"), 9), Some(MeldKind::Set));
        assert_eq!(classify(&cards("7H 7S 7D 7C"), 9), Some(MeldKind::Set));
        assert_eq!(classify(&cards("7H 7S JK"), 9), Some(MeldKind::Set));
        assert_eq!(classify(&cards("7H 7H 7D"), 9), None);
        assert_eq!(classify(&cards("7H 7S 7D 7C JK"), 9), None);
    }

    #[test]
    fn test_two_cards_never_meld() {
        assert_eq!(classify(&cards("7H 8H"), 9), None);
        assert_eq!(classify(&[Card(7, Suit::Heart), Card::JOKER], 9), None);
    }

    #[test]
    fn test_valid_declare() {
        let groups = vec![
            cards("AH 2H 3H"),
            cards("4S 5S 6S 7S"),
            cards("9D 9C 9H"),
            cards("JC JK KC"),
        ];
        let mut hand: Vec<Card> = groups.iter().flatten().copied().collect();
        hand.push("8D".parse().unwrap());
        assert_eq!(
            validate_declare(&hand, &groups, "8D".parse().unwrap(), &rules(2)),
            Ok(())
        );
    }

    #[test]
    fn test_declare_rejects_subset_and_superset() {
        let groups = vec![cards("AH 2H 3H"), cards("4S 5S 6S"), cards("9D 9C 9H")];
        let finish: Card = "8D".parse().unwrap();
        let mut hand: Vec<Card> = groups.iter().flatten().copied().collect();
        hand.push(finish);
        hand.push("KD".parse().unwrap());
        assert_eq!(
            validate_declare(&hand, &groups, finish, &rules(2)),
            Err(DeclareRejection::CardsMismatch)
        );

        let mut superset = groups.clone();
        superset[2].push("9S".parse().unwrap());
        hand.pop();
        assert_eq!(
            validate_declare(&hand, &superset, finish, &rules(2)),
            Err(DeclareRejection::CardsMismatch)
        );
    }

    #[test]
    fn test_declare_needs_pure_sequence() {
        let groups = vec![cards("AH JK 3H"), cards("4S 5S JK"), cards("9D 9C 9H")];
        let finish: Card = "8D".parse().unwrap();
        let mut hand: Vec<Card> = groups.iter().flatten().copied().collect();
        hand.push(finish);
        assert_eq!(
            validate_declare(&hand, &groups, finish, &rules(2)),
            Err(DeclareRejection::NoPureSequence)
        );
    }

    #[test]
    fn test_declare_needs_two_sequences() {
        let groups = vec![cards("AH 2H 3H"), cards("4S 4D 4C"), cards("9D 9C 9H")];
        let finish: Card = "8D".parse().unwrap();
        let mut hand: Vec<Card> = groups.iter().flatten().copied().collect();
        hand.push(finish);
        assert_eq!(
            validate_declare(&hand, &groups, finish, &rules(2)),
            Err(DeclareRejection::NotEnoughSequences { required: 2 })
        );
    }

    #[test]
    fn test_declare_reports_invalid_group_index() {
        let groups = vec![cards("AH 2H 3H"), cards("4S 8D")];
        let finish: Card = "KC".parse().unwrap();
        let mut hand: Vec<Card> = groups.iter().flatten().copied().collect();
        hand.push(finish);
        assert_eq!(
            validate_declare(&hand, &groups, finish, &rules(2)),
            Err(DeclareRejection::InvalidGroup { index: 1 })
        );
    }

    #[test]
    fn test_hand_points_without_groups() {
        let hand = cards("AH KS 7D 2C JK");
        assert_eq!(hand_points(&hand, &[], &rules(2)), 10 + 10 + 7);
    }

    #[test]
    fn test_hand_points_pure_sequence_counts_zero() {
        let hand = cards("4H 5H 6H 9S 9D KC");
        let groups = vec![cards("4H 5H 6H"), cards("9S 9D KC")];
        assert_eq!(hand_points(&hand, &groups, &rules(2)), 28);
    }

    #[test]
    fn test_hand_points_all_melds_free_with_two_sequences() {
        let hand = cards("4H 5H 6H 8S JK 10S 9D 9C 9H QD");
        let groups = vec![cards("4H 5H 6H"), cards("8S JK 10S"), cards("9D 9C 9H")];
        assert_eq!(hand_points(&hand, &groups, &rules(2)), 10);
    }

    #[test]
    fn test_hand_points_without_pure_sequence_counts_everything() {
        let hand = cards("8S JK 10S 9D 9C 9H");
        let groups = vec![cards("8S JK 10S"), cards("9D 9C 9H")];
        assert_eq!(hand_points(&hand, &groups, &rules(2)), 8 + 10 + 27);
    }

    #[test]
    fn test_hand_points_capped() {
        let hand = cards("KH KS KD KC QH QS QD QC JH");
        assert_eq!(hand_points(&hand, &[], &rules(2)), 80);
    }

    #[test]
    fn test_stale_groups_are_ignored() {
        let hand = cards("4H 5H 7C");
        let groups = vec![cards("4H 5H 6H")];
        assert_eq!(hand_points(&hand, &groups, &rules(2)), 16);
    }
}
