//! End-to-end scoring: rounds played on a `GameSession`, scored by the
//! format rules and settled through the finance gateway.

use chrono::Utc;
use rand::{SeedableRng, rngs::StdRng};
use rummy_engine::format::{
    DealsState, GameFormat, MatchState, RulesConfig, compute_round_deltas,
};
use rummy_engine::game::{
    Card, Deck, DrawSource, DropKind, GameSession, Money, SeatOutcome, SeatResult, UserId,
};
use rummy_engine::wallet::{
    FinanceGateway, LedgerReason, MatchOutcome, MatchStatus, MemoryWalletStore, WalletStore,
};
use std::sync::Arc;

fn cards(codes: &str) -> Vec<Card> {
    codes.split_whitespace().map(|c| c.parse().unwrap()).collect()
}

async fn gateway(balances: &[(UserId, Money)]) -> (FinanceGateway, Arc<MemoryWalletStore>) {
    let store = Arc::new(MemoryWalletStore::new());
    for (user, balance) in balances {
        store.set_balance(*user, *balance).await;
    }
    (FinanceGateway::new(store.clone()), store)
}

fn dealt(players: &[UserId], rules: RulesConfig, seed: u64) -> GameSession {
    let mut game = GameSession::new(1, players, rules).unwrap();
    game.deal_initial_hands(Some(8), &mut StdRng::seed_from_u64(seed))
        .unwrap();
    game
}

/// Plays seat 0 to a winning declare against a 13-card loose hand worth 86.
fn declared_points_round(rules: RulesConfig) -> GameSession {
    let mut game = dealt(&[100, 200], rules, 21);
    let winner = cards("AH 2H 3H 4S 5S 6S 7S 9C 9D 9H KC KD KS");
    let loser = cards("2C 4D 6H 8C 10D JC QS KH AD 3C 5D 7H 9S");
    let discard = cards("4C");
    let finish = cards("QH");

    let mut rest = Deck::standard(2, 2).cards().to_vec();
    for card in winner.iter().chain(&loser).chain(&discard).chain(&finish) {
        let pos = rest.iter().position(|c| c == card).unwrap();
        rest.remove(pos);
    }
    rest.extend(finish.iter().copied());
    game.seats[0].hand = winner;
    game.seats[1].hand = loser;
    game.set_discard_pile(discard);
    game.set_stock(rest);
    game.verify_conservation().unwrap();

    game.draw(0, DrawSource::Stock).unwrap();
    let groups = vec![
        cards("AH 2H 3H"),
        cards("4S 5S 6S 7S"),
        cards("9C 9D 9H"),
        cards("KC KD KS"),
    ];
    game.declare(0, groups, "QH".parse().unwrap()).unwrap();
    game.begin_settlement().unwrap();
    game
}

#[tokio::test]
async fn test_points_round_settles_with_rake() {
    let rules = RulesConfig {
        rake_percent: 10,
        ..RulesConfig::for_tests()
    };
    let game = declared_points_round(rules.clone());
    let deltas = compute_round_deltas(GameFormat::Points, &game.seat_outcomes(), &rules);

    assert_eq!(deltas.winner, Some(100));
    assert_eq!(deltas.per_user[1].points, 80);
    assert_eq!(deltas.per_user[1].delta, -80);
    assert_eq!(deltas.per_user[0].delta, 72);
    assert_eq!(deltas.rake_amount, 8);
    assert_eq!(deltas.total_delta(), -deltas.rake_amount);

    let (gw, store) = gateway(&[(100, 1_000), (200, 1_000)]).await;
    assert_eq!(gw.settle_round(game.game_id, &deltas).await.unwrap(), 2);
    assert!(
        gw.record_round_result(1, game.game_id, rules.point_value, &deltas)
            .await
            .unwrap()
    );
    // A retried settlement after a crash applies nothing
    assert_eq!(gw.settle_round(game.game_id, &deltas).await.unwrap(), 0);
    assert!(
        !gw.record_round_result(1, game.game_id, rules.point_value, &deltas)
            .await
            .unwrap()
    );

    assert_eq!(gw.balance(100).await.unwrap(), 1_072);
    assert_eq!(gw.balance(200).await.unwrap(), 920);
    let stored = store.round_result(game.game_id).await.unwrap().unwrap();
    assert_eq!(stored.rake_amount, 8);
    assert_eq!(stored.winner, Some(100));
}

#[tokio::test]
async fn test_deals_match_settles_boot_at_match_end() {
    let rules = RulesConfig {
        deals_count: 2,
        rake_percent: 10,
        ..RulesConfig::for_tests()
    };
    let players = [1, 2];
    let mut state = MatchState::start(GameFormat::Deals, &players, &rules).unwrap();

    // Round 1: user 1 drops before playing
    let mut game = dealt(&players, rules.clone(), 1);
    game.pack(0).unwrap();
    game.begin_settlement().unwrap();
    let deltas = compute_round_deltas(GameFormat::Deals, &game.seat_outcomes(), &rules);
    assert_eq!(deltas.points_of(1), Some(rules.first_drop));
    assert_eq!(deltas.total_delta(), 0);
    state.apply_round(&deltas);
    assert!(!state.is_over());

    // Round 2: user 2 drops after drawing, a middle drop
    let mut game = dealt(&state.next_round_players(), rules.clone(), 2);
    let drawn = game.draw(0, DrawSource::Stock).unwrap();
    game.discard(0, drawn.card).unwrap();
    game.draw(1, DrawSource::Stock).unwrap();
    game.pack(1).unwrap();
    game.begin_settlement().unwrap();
    let deltas = compute_round_deltas(GameFormat::Deals, &game.seat_outcomes(), &rules);
    assert_eq!(deltas.points_of(2), Some(rules.middle_drop));
    state.apply_round(&deltas);

    assert!(state.is_over());
    assert_eq!(state.winner(), Some(1));

    let (gw, _) = gateway(&[(1, 1_000), (2, 1_000)]).await;
    let match_id = uuid::Uuid::new_v4();
    let outcome = MatchOutcome {
        match_id,
        table_id: 3,
        format: GameFormat::Deals,
        winner: 1,
        standings: state.standings(),
        boot_amount: 100,
        rake_percent: rules.rake_percent,
        status: MatchStatus::Pending,
        created_at: Utc::now(),
    };
    assert_eq!(outcome.prize(), 90);
    gw.record_match_outcome(&outcome).await.unwrap();
    assert_eq!(gw.settle_match(match_id).await.unwrap(), 2);
    assert_eq!(gw.balance(1).await.unwrap(), 1_090);
    assert_eq!(gw.balance(2).await.unwrap(), 900);

    let reasons: Vec<LedgerReason> = gw
        .ledger(2)
        .await
        .unwrap()
        .iter()
        .map(|e| e.reason)
        .collect();
    assert_eq!(reasons, vec![LedgerReason::MatchSettlement]);
}

fn outcome(seat: usize, user_id: UserId, result: SeatResult) -> SeatOutcome {
    SeatOutcome {
        seat,
        user_id,
        result,
    }
}

#[tokio::test]
async fn test_two_player_points_round_moves_hand_points() {
    let rules = RulesConfig {
        point_value: 1,
        rake_percent: 0,
        ..RulesConfig::for_tests()
    };
    let round = [
        outcome(0, 1, SeatResult::Winner),
        outcome(1, 2, SeatResult::Lost { hand_points: 10 }),
    ];
    let deltas = compute_round_deltas(GameFormat::Points, &round, &rules);
    assert_eq!(deltas.winner, Some(1));
    assert_eq!(deltas.per_user[0].delta, 10);
    assert_eq!(deltas.per_user[1].delta, -10);
    assert_eq!(deltas.rake_amount, 0);
    assert_eq!(deltas.total_delta(), 0);

    let (finance, _) = gateway(&[(1, 500), (2, 500)]).await;
    finance.settle_round(uuid::Uuid::new_v4(), &deltas).await.unwrap();
    assert_eq!(finance.balance(1).await.unwrap(), 510);
    assert_eq!(finance.balance(2).await.unwrap(), 490);
}

#[test]
fn test_deals_match_of_two_deals_goes_to_lowest_total() {
    let rules = RulesConfig {
        deals_count: 2,
        ..RulesConfig::for_tests()
    };
    let mut state = DealsState::new(&[1, 2, 3], rules.deals_count);

    let first = [
        outcome(0, 1, SeatResult::Winner),
        outcome(1, 2, SeatResult::Lost { hand_points: 10 }),
        outcome(2, 3, SeatResult::Lost { hand_points: 20 }),
    ];
    let deltas = compute_round_deltas(GameFormat::Deals, &first, &rules);
    assert!(deltas.per_user.iter().all(|d| d.delta == 0));
    state.apply_round(&deltas);
    assert_eq!(state.remaining, 1);
    assert!(!state.is_over());
    assert_eq!(state.winner(), None);

    let second = [
        outcome(0, 1, SeatResult::Lost { hand_points: 30 }),
        outcome(1, 2, SeatResult::Winner),
        outcome(2, 3, SeatResult::Lost { hand_points: 5 }),
    ];
    state.apply_round(&compute_round_deltas(GameFormat::Deals, &second, &rules));
    assert_eq!(state.remaining, 0);
    assert!(state.is_over());
    assert_eq!(state.total_of(1), Some(30));
    assert_eq!(state.total_of(2), Some(10));
    assert_eq!(state.total_of(3), Some(25));
    assert_eq!(state.winner(), Some(2));
}

#[test]
fn test_pool_knocks_out_at_threshold() {
    let rules = RulesConfig {
        pool_threshold: 101,
        ..RulesConfig::for_tests()
    };
    let mut state = MatchState::start(GameFormat::Pool, &[1, 2, 3], &rules).unwrap();

    let round = [
        outcome(0, 1, SeatResult::Winner),
        outcome(1, 2, SeatResult::Packed {
            drop: DropKind::First,
        }),
        outcome(2, 3, SeatResult::Lost { hand_points: 12 }),
    ];
    for _ in 0..2 {
        let deltas = compute_round_deltas(GameFormat::Pool, &round, &rules);
        // Pool losers are charged the middle drop whatever they held
        assert_eq!(deltas.points_of(2), Some(rules.middle_drop));
        assert_eq!(deltas.points_of(3), Some(rules.middle_drop));
        state.apply_round(&deltas);
        assert!(!state.is_over());
    }

    let deltas = compute_round_deltas(GameFormat::Pool, &round, &rules);
    state.apply_round(&deltas);
    assert!(state.is_over());
    assert_eq!(state.winner(), Some(1));
    assert_eq!(state.next_round_players(), vec![1]);

    let standings = state.standings();
    assert!(standings.iter().filter(|s| s.eliminated).count() == 2);
    assert!(standings.iter().all(|s| s.points == 0 || s.points == 120));
}

#[test]
fn test_no_result_round_moves_nothing() {
    let rules = RulesConfig::for_tests();
    let round = [
        outcome(0, 1, SeatResult::NoResult),
        outcome(1, 2, SeatResult::NoResult),
    ];
    for format in [GameFormat::Points, GameFormat::Deals, GameFormat::Pool] {
        let deltas = compute_round_deltas(format, &round, &rules);
        assert_eq!(deltas.winner, None);
        assert!(deltas.per_user.iter().all(|d| d.points == 0 && d.delta == 0));
    }
}
