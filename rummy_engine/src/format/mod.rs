//! Scoring formats.
//!
//! `compute_round_deltas` turns a finished round into per-user points and
//! money deltas. Deals and pool matches carry their running totals across
//! rounds in `DealsState` and `PoolState`.

pub mod config;
pub mod deals;
pub mod pool;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::game::{DropKind, Money, SeatIndex, SeatOutcome, SeatResult, UserId};

pub use config::{
    DeclarePolicy, PoolLoserScoring, RulesConfig, RulesError, TossOrder, WrongDeclarePolicy,
};
pub use deals::DealsState;
pub use pool::PoolState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameFormat {
    Points,
    Deals,
    Pool,
}

impl fmt::Display for GameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameFormat::Points => write!(f, "points"),
            GameFormat::Deals => write!(f, "deals"),
            GameFormat::Pool => write!(f, "pool"),
        }
    }
}

impl FromStr for GameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "points" => Ok(GameFormat::Points),
            "deals" => Ok(GameFormat::Deals),
            "pool" => Ok(GameFormat::Pool),
            other => Err(format!("unknown format {other:?}")),
        }
    }
}

impl GameFormat {
    /// Whether rounds of this format belong to a multi-round match.
    pub fn is_match(self) -> bool {
        !matches!(self, GameFormat::Points)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDelta {
    pub user_id: UserId,
    pub seat: SeatIndex,
    pub points: u32,
    pub delta: Money,
}

/// Points and money movements for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundDeltas {
    pub per_user: Vec<UserDelta>,
    pub winner: Option<UserId>,
    pub rake_percent: u8,
    pub rake_amount: Money,
}

impl RoundDeltas {
    pub fn total_delta(&self) -> Money {
        self.per_user.iter().map(|d| d.delta).sum()
    }

    pub fn points_of(&self, user_id: UserId) -> Option<u32> {
        self.per_user
            .iter()
            .find(|d| d.user_id == user_id)
            .map(|d| d.points)
    }
}

fn seat_points(format: GameFormat, result: SeatResult, rules: &RulesConfig) -> u32 {
    match result {
        SeatResult::Winner | SeatResult::NoResult => 0,
        _ if format == GameFormat::Pool && rules.pool_loser_scoring == PoolLoserScoring::MiddleDrop => {
            rules.middle_drop
        }
        SeatResult::Packed {
            drop: DropKind::First,
        } => rules.first_drop,
        SeatResult::Packed {
            drop: DropKind::Middle,
        } => rules.middle_drop,
        SeatResult::Lost { hand_points } => hand_points.min(rules.max_points),
    }
}

/// Computes the points and deltas of a finished round.
///
/// # Arguments
///
/// * `format` - Scoring format of the table
/// * `outcomes` - Per-seat results from the game session
/// * `rules` - Point values, drops, rake and pool scoring mode
///
/// # Returns
///
/// * `RoundDeltas` - Only points rounds move money; deals and pool rounds
///   carry zero deltas and settle at match end.
pub fn compute_round_deltas(
    format: GameFormat,
    outcomes: &[SeatOutcome],
    rules: &RulesConfig,
) -> RoundDeltas {
    let winner = outcomes
        .iter()
        .find(|o| o.result == SeatResult::Winner)
        .map(|o| o.user_id);
    let mut per_user: Vec<UserDelta> = outcomes
        .iter()
        .map(|o| UserDelta {
            user_id: o.user_id,
            seat: o.seat,
            points: seat_points(format, o.result, rules),
            delta: 0,
        })
        .collect();

    let mut rake_amount = 0;
    if format == GameFormat::Points && winner.is_some() {
        let mut gross: Money = 0;
        for entry in per_user.iter_mut().filter(|d| Some(d.user_id) != winner) {
            let loss = Money::from(entry.points) * rules.point_value;
            entry.delta = -loss;
            gross += loss;
        }
        let payout = gross * Money::from(100 - rules.rake_percent) / 100;
        rake_amount = gross - payout;
        if let Some(entry) = per_user.iter_mut().find(|d| Some(d.user_id) == winner) {
            entry.delta = payout;
        }
    }

    RoundDeltas {
        per_user,
        winner,
        rake_percent: rules.rake_percent,
        rake_amount,
    }
}

/// Final position of one player in a deals or pool match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub user_id: UserId,
    pub points: u32,
    pub eliminated: bool,
}

/// Running state of a multi-round match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum MatchState {
    Deals(DealsState),
    Pool(PoolState),
}

impl MatchState {
    /// Starts a match for `players`, or `None` for points tables.
    pub fn start(format: GameFormat, players: &[UserId], rules: &RulesConfig) -> Option<Self> {
        match format {
            GameFormat::Points => None,
            GameFormat::Deals => Some(MatchState::Deals(DealsState::new(players, rules.deals_count))),
            GameFormat::Pool => Some(MatchState::Pool(PoolState::new(players, rules.pool_threshold))),
        }
    }

    pub fn apply_round(&mut self, deltas: &RoundDeltas) {
        match self {
            MatchState::Deals(state) => state.apply_round(deltas),
            MatchState::Pool(state) => {
                state.apply_round(deltas);
            }
        }
    }

    pub fn is_over(&self) -> bool {
        match self {
            MatchState::Deals(state) => state.is_over(),
            MatchState::Pool(state) => state.is_over(),
        }
    }

    pub fn winner(&self) -> Option<UserId> {
        match self {
            MatchState::Deals(state) => state.winner(),
            MatchState::Pool(state) => state.winner(),
        }
    }

    /// Seat-ordered players dealt into the next round.
    pub fn next_round_players(&self) -> Vec<UserId> {
        match self {
            MatchState::Deals(state) => state.players(),
            MatchState::Pool(state) => state.survivors(),
        }
    }

    pub fn standings(&self) -> Vec<Standing> {
        match self {
            MatchState::Deals(state) => state.standings(),
            MatchState::Pool(state) => state.standings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(seat: SeatIndex, user_id: UserId, result: SeatResult) -> SeatOutcome {
        SeatOutcome {
            seat,
            user_id,
            result,
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("Points".parse::<GameFormat>(), Ok(GameFormat::Points));
        assert_eq!("pool".parse::<GameFormat>(), Ok(GameFormat::Pool));
        assert!("rummy".parse::<GameFormat>().is_err());
    }

    #[test]
    fn test_points_round_conserves_money_modulo_rake() {
        let rules = RulesConfig {
            point_value: 3,
            rake_percent: 15,
            ..RulesConfig::for_tests()
        };
        let outcomes = vec![
            outcome(0, 1, SeatResult::Lost { hand_points: 37 }),
            outcome(1, 2, SeatResult::Winner),
            outcome(2, 3, SeatResult::Packed { drop: DropKind::First }),
        ];
        let deltas = compute_round_deltas(GameFormat::Points, &outcomes, &rules);
        assert_eq!(deltas.winner, Some(2));
        assert_eq!(deltas.per_user[0].delta, -111);
        assert_eq!(deltas.per_user[2].delta, -60);
        // gross 171, 85% floored
        assert_eq!(deltas.per_user[1].delta, 145);
        assert_eq!(deltas.rake_amount, 26);
        assert_eq!(deltas.total_delta(), -deltas.rake_amount);
    }

    #[test]
    fn test_deals_round_has_zero_deltas() {
        let outcomes = vec![
            outcome(0, 1, SeatResult::Winner),
            outcome(1, 2, SeatResult::Lost { hand_points: 25 }),
        ];
        let deltas = compute_round_deltas(GameFormat::Deals, &outcomes, &RulesConfig::for_tests());
        assert!(deltas.per_user.iter().all(|d| d.delta == 0));
        assert_eq!(deltas.points_of(2), Some(25));
        assert_eq!(deltas.rake_amount, 0);
    }

    #[test]
    fn test_pool_losers_score_middle_drop_by_default() {
        let outcomes = vec![
            outcome(0, 1, SeatResult::Winner),
            outcome(1, 2, SeatResult::Lost { hand_points: 5 }),
            outcome(2, 3, SeatResult::Packed { drop: DropKind::First }),
        ];
        let rules = RulesConfig::for_tests();
        let deltas = compute_round_deltas(GameFormat::Pool, &outcomes, &rules);
        assert_eq!(deltas.points_of(2), Some(40));
        assert_eq!(deltas.points_of(3), Some(40));

        let rules = RulesConfig {
            pool_loser_scoring: PoolLoserScoring::HandPoints,
            ..rules
        };
        let deltas = compute_round_deltas(GameFormat::Pool, &outcomes, &rules);
        assert_eq!(deltas.points_of(2), Some(5));
        assert_eq!(deltas.points_of(3), Some(20));
    }

    #[test]
    fn test_no_result_round_is_all_zero() {
        let outcomes = vec![
            outcome(0, 1, SeatResult::NoResult),
            outcome(1, 2, SeatResult::NoResult),
        ];
        let deltas = compute_round_deltas(GameFormat::Points, &outcomes, &RulesConfig::for_tests());
        assert_eq!(deltas.winner, None);
        assert!(deltas.per_user.iter().all(|d| d.points == 0 && d.delta == 0));
    }
}
