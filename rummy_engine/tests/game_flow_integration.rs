//! Round flow integration tests.
//!
//! Rounds are dealt normally and then staged with known hands so that the
//! declare, pack and exhausted-stock paths can be played end to end.

use rand::{SeedableRng, rngs::StdRng};
use rummy_engine::format::{RulesConfig, WrongDeclarePolicy};
use rummy_engine::game::{
    Card, DeclareOutcome, DeclareRejection, Deck, DrawSource, DropKind, GameError, GamePhase,
    GameSession, RoundEnd, SeatResult, SeatStatus,
};

fn cards(codes: &str) -> Vec<Card> {
    codes.split_whitespace().map(|c| c.parse().unwrap()).collect()
}

/// Replaces dealt hands, discard pile and stock while keeping exactly one
/// full card set in play. `stock_top` lists the next draws in order.
fn stage(game: &mut GameSession, hands: &[Vec<Card>], discard: Vec<Card>, stock_top: &[Card]) {
    let mut rest = Deck::standard(game.rules.deck_count, game.rules.printed_jokers)
        .cards()
        .to_vec();
    for card in hands.iter().flatten().chain(&discard).chain(stock_top) {
        let pos = rest
            .iter()
            .position(|c| c == card)
            .expect("card available in the set");
        rest.remove(pos);
    }
    for (seat, hand) in hands.iter().enumerate() {
        game.seats[seat].hand = hand.clone();
    }
    game.set_discard_pile(discard);
    rest.extend(stock_top.iter().rev());
    game.set_stock(rest);
}

fn winning_hand() -> Vec<Card> {
    cards("AH 2H 3H 4S 5S 6S 7S 9C 9D 9H KC KD KS")
}

fn winning_groups() -> Vec<Vec<Card>> {
    vec![
        cards("AH 2H 3H"),
        cards("4S 5S 6S 7S"),
        cards("9C 9D 9H"),
        cards("KC KD KS"),
    ]
}

fn loose_hand() -> Vec<Card> {
    cards("2C 4D 6H 8C 10D JC QS KH AD 3C 5D 7H 9S")
}

fn two_player_round(rules: RulesConfig) -> GameSession {
    let mut game = GameSession::new(1, &[100, 200], rules).unwrap();
    game.deal_initial_hands(Some(8), &mut StdRng::seed_from_u64(11))
        .unwrap();
    stage(
        &mut game,
        &[winning_hand(), loose_hand()],
        cards("4C"),
        &cards("QH"),
    );
    game.verify_conservation().unwrap();
    game
}

#[test]
fn test_declare_wins_round_and_scores_loser() {
    let mut game = two_player_round(RulesConfig::for_tests());

    let drawn = game.draw(0, DrawSource::Stock).unwrap();
    assert_eq!(drawn.card, "QH".parse().unwrap());

    let outcome = game
        .declare(0, winning_groups(), "QH".parse().unwrap())
        .unwrap();
    assert_eq!(outcome, DeclareOutcome::Accepted);
    assert_eq!(game.phase, GamePhase::Declaring);
    assert_eq!(game.discard_top(), Some("QH".parse().unwrap()));
    assert!(game.awaiting_groups());

    assert_eq!(
        game.begin_settlement(),
        Some(RoundEnd::Declared { winner: 0 })
    );
    assert_eq!(game.begin_settlement(), None);

    let outcomes = game.seat_outcomes();
    assert_eq!(outcomes[0].result, SeatResult::Winner);
    // 86 points of loose cards, 8C is wild, capped at 80
    assert_eq!(outcomes[1].result, SeatResult::Lost { hand_points: 80 });
    game.verify_conservation().unwrap();
}

#[test]
fn test_loser_groups_reduce_points() {
    let mut game = two_player_round(RulesConfig::for_tests());
    game.draw(0, DrawSource::Stock).unwrap();
    game.declare(0, winning_groups(), "QH".parse().unwrap())
        .unwrap();

    let mut groups = vec![cards("2C 3C"), cards("4D 5D"), cards("JC QS KH AD")];
    groups.push(cards("6H 7H 8C"));
    groups.push(cards("10D 9S"));
    game.submit_groups(1, groups).unwrap();
    assert!(!game.awaiting_groups());

    game.begin_settlement();
    // 6H 7H 8C is an impure sequence, but without a pure sequence every
    // group is still charged
    assert_eq!(
        game.seat_outcomes()[1].result,
        SeatResult::Lost { hand_points: 80 }
    );
}

#[test]
fn test_wrong_declare_rejected_and_turn_kept() {
    let mut game = two_player_round(RulesConfig::for_tests());
    game.draw(0, DrawSource::Stock).unwrap();

    let mut groups = winning_groups();
    groups.pop();
    let outcome = game.declare(0, groups, "QH".parse().unwrap()).unwrap();
    assert_eq!(
        outcome,
        DeclareOutcome::Rejected {
            reason: DeclareRejection::CardsMismatch,
            finish_card_discarded: false,
        }
    );
    assert_eq!(game.phase, GamePhase::Started);
    assert_eq!(game.current_turn, 0);
    assert_eq!(game.seats[0].hand.len(), 14);
}

#[test]
fn test_wrong_declare_can_cost_the_finish_card() {
    let rules = RulesConfig {
        wrong_declare_policy: WrongDeclarePolicy::DiscardFinishCard,
        ..RulesConfig::for_tests()
    };
    let mut game = two_player_round(rules);
    game.draw(0, DrawSource::Stock).unwrap();

    // QH offered in a group it cannot complete
    let mut bad = winning_groups();
    bad[3] = cards("KC KD QH");
    let outcome = game.declare(0, bad, "KS".parse().unwrap()).unwrap();
    assert!(matches!(
        outcome,
        DeclareOutcome::Rejected {
            finish_card_discarded: true,
            ..
        }
    ));
    assert_eq!(game.current_turn, 1);
    assert_eq!(game.discard_top(), Some("KS".parse().unwrap()));
    game.verify_conservation().unwrap();
}

#[test]
fn test_declare_out_of_turn_conflicts() {
    let mut game = two_player_round(RulesConfig::for_tests());
    let err = game
        .declare(1, vec![loose_hand()], "2C".parse().unwrap())
        .unwrap_err();
    assert_eq!(err, GameError::NotYourTurn);
}

#[test]
fn test_first_and_middle_drops() {
    let mut game = GameSession::new(1, &[1, 2, 3], RulesConfig::for_tests()).unwrap();
    game.deal_initial_hands(Some(4), &mut StdRng::seed_from_u64(3))
        .unwrap();

    // Seat 2 packs before its first turn
    assert_eq!(game.pack(2).unwrap(), None);
    assert_eq!(game.seats[2].status, SeatStatus::Packed(DropKind::First));

    let drawn = game.draw(0, DrawSource::Stock).unwrap();
    game.discard(0, drawn.card).unwrap();
    assert_eq!(game.current_turn, 1);

    // Seat 0 has played a turn, so this is a middle drop and ends the round
    let end = game.pack(0).unwrap();
    assert_eq!(end, Some(RoundEnd::AllButOnePacked { winner: 1 }));
    assert_eq!(game.begin_settlement(), end);

    let results: Vec<SeatResult> = game.seat_outcomes().iter().map(|o| o.result).collect();
    assert_eq!(
        results,
        vec![
            SeatResult::Packed {
                drop: DropKind::Middle
            },
            SeatResult::Winner,
            SeatResult::Packed {
                drop: DropKind::First
            },
        ]
    );
}

#[test]
fn test_packed_seat_cannot_act() {
    let mut game = GameSession::new(1, &[1, 2, 3], RulesConfig::for_tests()).unwrap();
    game.deal_initial_hands(Some(4), &mut StdRng::seed_from_u64(5))
        .unwrap();
    game.pack(0).unwrap();
    assert_eq!(game.current_turn, 1);
    assert_eq!(game.pack(0), Err(GameError::AlreadyPacked));
    assert_eq!(
        game.draw(0, DrawSource::Stock),
        Err(GameError::NotYourTurn)
    );
}

#[test]
fn test_empty_stock_reshuffles_discard_pile() {
    let mut game = two_player_round(RulesConfig::for_tests());
    game.set_stock(Vec::new());
    game.set_discard_pile(cards("2S 3S 4S"));
    // Card set is no longer whole here; only the draw mechanics matter
    let drawn = game.draw(0, DrawSource::Stock).unwrap();
    assert!(drawn.reshuffled);
    assert_eq!(game.discard_pile(), &cards("4S")[..]);
    assert_eq!(game.stock_count(), 1);
}

#[test]
fn test_exhausted_stock_ends_round_without_result() {
    let mut game = two_player_round(RulesConfig::for_tests());
    game.set_stock(Vec::new());
    game.set_discard_pile(cards("4S"));

    assert_eq!(
        game.draw(0, DrawSource::Stock),
        Err(GameError::StockExhausted)
    );
    assert_eq!(game.phase, GamePhase::Settling);
    assert_eq!(game.end, Some(RoundEnd::NoResult));
    assert!(
        game.seat_outcomes()
            .iter()
            .all(|o| o.result == SeatResult::NoResult)
    );
}

#[test]
fn test_discard_pick_cannot_be_thrown_back() {
    let mut game = two_player_round(RulesConfig::for_tests());
    let picked = game.draw(0, DrawSource::Discard).unwrap();
    assert_eq!(picked.card, "4C".parse().unwrap());
    assert_eq!(
        game.discard(0, picked.card),
        Err(GameError::CannotDiscardPickedCard)
    );
    game.discard(0, "KS".parse().unwrap()).unwrap();
    game.verify_conservation().unwrap();
}

#[test]
fn test_auto_discard_keeps_wild_cards() {
    let mut game = two_player_round(RulesConfig::for_tests());
    let card = game.auto_discard(0).unwrap();
    // Draws QH first, then throws the cheapest card
    assert_eq!(card, "2H".parse().unwrap());
    assert_eq!(game.current_turn, 1);
    game.verify_conservation().unwrap();
}

#[test]
fn test_views_hide_other_hands() {
    let game = two_player_round(RulesConfig::for_tests());
    let view = game.view(Some(100));
    assert_eq!(view.hand.as_ref().map(Vec::len), Some(13));
    assert_eq!(view.seats[1].cards_in_hand, 13);

    let spectator = game.view(None);
    assert!(spectator.hand.is_none());
    let json = serde_json::to_string(&spectator).unwrap();
    assert!(!json.contains("\"hand\":[\""));
}
