/// Property-based tests for card conservation and scoring bounds.
///
/// Random command sequences, including illegal ones, are thrown at a
/// round; whatever the session accepts must leave exactly one card set in
/// play.
use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};
use rummy_engine::format::{GameFormat, RulesConfig, compute_round_deltas};
use rummy_engine::game::{
    Card, DrawSource, DropKind, GamePhase, GameSession, MeldKind, SeatOutcome, SeatResult, Suit,
    melds::{ScoringRules, classify, hand_points},
};

#[derive(Debug, Clone)]
enum Command {
    DrawStock(usize),
    DrawDiscard(usize),
    Discard(usize, usize),
    Pack(usize),
    AutoDiscard(usize),
}

fn command_strategy(players: usize) -> impl Strategy<Value = Command> {
    let seat = 0..players;
    prop_oneof![
        4 => seat.clone().prop_map(Command::DrawStock),
        2 => seat.clone().prop_map(Command::DrawDiscard),
        6 => (seat.clone(), 0usize..14).prop_map(|(s, i)| Command::Discard(s, i)),
        1 => seat.clone().prop_map(Command::Pack),
        2 => seat.prop_map(Command::AutoDiscard),
    ]
}

fn card_strategy() -> impl Strategy<Value = Card> {
    prop_oneof![
        20 => (1u8..=13, 0usize..4).prop_map(|(value, suit)| Card(value, Suit::STANDARD[suit])),
        1 => Just(Card::JOKER),
    ]
}

fn scoring(wild_rank: u8) -> ScoringRules {
    RulesConfig::for_tests().scoring(wild_rank)
}

fn apply(game: &mut GameSession, command: &Command) {
    let _ = match *command {
        Command::DrawStock(seat) => game.draw(seat, DrawSource::Stock).map(|_| ()),
        Command::DrawDiscard(seat) => game.draw(seat, DrawSource::Discard).map(|_| ()),
        Command::Discard(seat, index) => {
            let card = game.seats[seat].hand.get(index).copied();
            match card {
                Some(card) => game.discard(seat, card),
                None => Ok(()),
            }
        }
        Command::Pack(seat) => game.pack(seat).map(|_| ()),
        Command::AutoDiscard(seat) => game.auto_discard(seat).map(|_| ()),
    };
}

proptest! {
    #[test]
    fn test_commands_conserve_cards(
        players in 2usize..=6,
        seed in any::<u64>(),
        commands in prop::collection::vec(command_strategy(6), 0..200),
    ) {
        let users: Vec<i64> = (1..=players as i64).collect();
        let mut game = GameSession::new(1, &users, RulesConfig::for_tests()).unwrap();
        game.deal_initial_hands(None, &mut StdRng::seed_from_u64(seed)).unwrap();

        for command in commands.iter().filter(|c| match c {
            Command::DrawStock(s) | Command::DrawDiscard(s) | Command::Pack(s)
            | Command::AutoDiscard(s) | Command::Discard(s, _) => *s < players,
        }) {
            apply(&mut game, command);
            prop_assert!(game.verify_conservation().is_ok());

            for (seat, state) in game.seats.iter().enumerate() {
                if state.is_active() && game.phase == GamePhase::Started {
                    let holding_draw = seat == game.current_turn && game.has_drawn;
                    let expected = if holding_draw { 14 } else { 13 };
                    prop_assert_eq!(state.hand.len(), expected);
                } else {
                    // A seat packing mid-turn keeps its drawn card
                    prop_assert!((13..=14).contains(&state.hand.len()));
                }
            }
            if game.phase != GamePhase::Started {
                break;
            }
        }
        prop_assert!(game.active_seats() >= 1);
    }

    #[test]
    fn test_hand_points_bounded(
        hand in prop::collection::vec(card_strategy(), 13),
        wild_rank in 1u8..=13,
    ) {
        let rules = scoring(wild_rank);
        let points = hand_points(&hand, &[], &rules);
        prop_assert!(points <= rules.max_points);

        let wilds_only: Vec<Card> = hand.iter().copied().filter(|c| c.is_wild(wild_rank)).collect();
        prop_assert_eq!(hand_points(&wilds_only, &[], &rules), 0);
    }

    #[test]
    fn test_pure_sequence_order_independent(
        start in 1u8..=11,
        len in 3u8..=5,
        suit in 0usize..4,
        wild_rank in 1u8..=13,
        rotate in 0usize..5,
    ) {
        let suit = Suit::STANDARD[suit];
        let mut group: Vec<Card> = (start..start + len)
            .filter(|v| *v <= 13)
            .map(|v| Card(v, suit))
            .collect();
        prop_assume!(group.len() >= 3);
        let by = rotate % group.len();
        group.rotate_left(by);
        prop_assert_eq!(classify(&group, wild_rank), Some(MeldKind::PureSequence));
    }

    #[test]
    fn test_points_round_money_balances(
        losses in prop::collection::vec(0u32..=120, 1..=5),
        point_value in 1i64..=50,
        rake_percent in 0u8..=30,
    ) {
        let rules = RulesConfig {
            point_value,
            rake_percent,
            ..RulesConfig::for_tests()
        };
        let mut outcomes = vec![SeatOutcome { seat: 0, user_id: 1, result: SeatResult::Winner }];
        for (i, loss) in losses.iter().enumerate() {
            let result = match loss % 3 {
                0 => SeatResult::Packed { drop: DropKind::First },
                1 => SeatResult::Packed { drop: DropKind::Middle },
                _ => SeatResult::Lost { hand_points: *loss },
            };
            outcomes.push(SeatOutcome { seat: i + 1, user_id: i as i64 + 2, result });
        }

        let deltas = compute_round_deltas(GameFormat::Points, &outcomes, &rules);
        prop_assert!(deltas.rake_amount >= 0);
        prop_assert_eq!(deltas.total_delta(), -deltas.rake_amount);
        for entry in deltas.per_user.iter().skip(1) {
            prop_assert!(entry.points <= rules.max_points);
            prop_assert!(entry.delta <= 0);
        }
    }
}
