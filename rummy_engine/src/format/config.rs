//! Rule configuration shared by every table.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::game::{
    Money, Value,
    constants::{
        DEFAULT_DEALS_COUNT, DEFAULT_DECK_COUNT, DEFAULT_FACE_POINTS, DEFAULT_FIRST_DROP,
        DEFAULT_HAND_SIZE, DEFAULT_MAX_MISSED_TURNS, DEFAULT_MAX_POINTS, DEFAULT_MIDDLE_DROP,
        DEFAULT_MIN_PURE_SEQUENCES, DEFAULT_MIN_SEQUENCES, DEFAULT_POOL_THRESHOLD,
        DEFAULT_PRINTED_JOKERS, MAX_PLAYERS,
    },
    melds::ScoringRules,
};
use crate::timer::{TimeoutAction, TimerMode};

/// Whether a declare must come from the seat on turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarePolicy {
    Strict,
    /// Any active seat may declare. Only meant for test tables.
    Loose,
}

/// What a rejected declare costs the declaring seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrongDeclarePolicy {
    /// Nothing changes; the seat keeps its turn.
    Reject,
    /// The finish card is thrown and the turn passes.
    DiscardFinishCard,
}

/// How non-winners are scored in a pool round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolLoserScoring {
    MiddleDrop,
    HandPoints,
}

/// Who opens the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TossOrder {
    SeatZero,
    Random,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("rake percent must be between 0 and 100, got {0}")]
    RakePercent(u8),
    #[error("first drop ({first}) must not exceed middle drop ({middle})")]
    DropOrder { first: u32, middle: u32 },
    #[error("middle drop ({middle}) must not exceed max points ({max})")]
    DropAboveCap { middle: u32, max: u32 },
    #[error("min_pure_sequences ({pure}) must not exceed min_sequences ({sequences})")]
    SequenceMinimums { pure: usize, sequences: usize },
    #[error("{decks} deck(s) cannot deal {hand_size} cards to {players} players")]
    DeckTooSmall {
        decks: u8,
        hand_size: usize,
        players: usize,
    },
}

/// Rule values, test bypasses and timer settings injected into every table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    pub hand_size: usize,
    pub deck_count: u8,
    pub printed_jokers: u8,

    /// Points charged for an ace or a face card
    pub face_points: u32,
    /// Cap on the points a single loser can be charged
    pub max_points: u32,
    pub first_drop: u32,
    pub middle_drop: u32,
    pub min_pure_sequences: usize,
    pub min_sequences: usize,

    /// Money per point, in minor units
    pub point_value: Money,
    pub rake_percent: u8,
    pub deals_count: u32,
    pub pool_threshold: u32,
    pub pool_loser_scoring: PoolLoserScoring,

    pub declare_policy: DeclarePolicy,
    pub wrong_declare_policy: WrongDeclarePolicy,
    pub toss_order: TossOrder,

    pub turn_duration: Duration,
    pub declare_window: Duration,
    pub timer_mode: TimerMode,
    pub timeout_action: TimeoutAction,
    pub max_missed_turns: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            hand_size: DEFAULT_HAND_SIZE,
            deck_count: DEFAULT_DECK_COUNT,
            printed_jokers: DEFAULT_PRINTED_JOKERS,
            face_points: DEFAULT_FACE_POINTS,
            max_points: DEFAULT_MAX_POINTS,
            first_drop: DEFAULT_FIRST_DROP,
            middle_drop: DEFAULT_MIDDLE_DROP,
            min_pure_sequences: DEFAULT_MIN_PURE_SEQUENCES,
            min_sequences: DEFAULT_MIN_SEQUENCES,
            point_value: 1,
            rake_percent: 0,
            deals_count: DEFAULT_DEALS_COUNT,
            pool_threshold: DEFAULT_POOL_THRESHOLD,
            pool_loser_scoring: PoolLoserScoring::MiddleDrop,
            declare_policy: DeclarePolicy::Strict,
            wrong_declare_policy: WrongDeclarePolicy::Reject,
            toss_order: TossOrder::SeatZero,
            turn_duration: Duration::from_secs(30),
            declare_window: Duration::from_secs(30),
            timer_mode: TimerMode::Enabled,
            timeout_action: TimeoutAction::AutoDiscard,
            max_missed_turns: DEFAULT_MAX_MISSED_TURNS,
        }
    }
}

impl RulesConfig {
    /// Rules used by test tables: no timers, seat 0 opens.
    pub fn for_tests() -> Self {
        Self {
            timer_mode: TimerMode::Disabled,
            toss_order: TossOrder::SeatZero,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.hand_size == 0 {
            return Err(RulesError::Zero("hand_size"));
        }
        if self.deck_count == 0 {
            return Err(RulesError::Zero("deck_count"));
        }
        if self.point_value <= 0 {
            return Err(RulesError::Zero("point_value"));
        }
        if self.deals_count == 0 {
            return Err(RulesError::Zero("deals_count"));
        }
        if self.pool_threshold == 0 {
            return Err(RulesError::Zero("pool_threshold"));
        }
        if self.max_missed_turns == 0 {
            return Err(RulesError::Zero("max_missed_turns"));
        }
        if self.turn_duration.is_zero() {
            return Err(RulesError::Zero("turn_duration"));
        }
        if self.rake_percent > 100 {
            return Err(RulesError::RakePercent(self.rake_percent));
        }
        if self.first_drop > self.middle_drop {
            return Err(RulesError::DropOrder {
                first: self.first_drop,
                middle: self.middle_drop,
            });
        }
        if self.middle_drop > self.max_points {
            return Err(RulesError::DropAboveCap {
                middle: self.middle_drop,
                max: self.max_points,
            });
        }
        if self.min_pure_sequences > self.min_sequences {
            return Err(RulesError::SequenceMinimums {
                pure: self.min_pure_sequences,
                sequences: self.min_sequences,
            });
        }
        // Every seat needs a full hand plus one card for the discard pile
        // and at least one card left in stock.
        let needed = MAX_PLAYERS * self.hand_size + 2;
        if self.total_cards() < needed {
            return Err(RulesError::DeckTooSmall {
                decks: self.deck_count,
                hand_size: self.hand_size,
                players: MAX_PLAYERS,
            });
        }
        Ok(())
    }

    pub fn total_cards(&self) -> usize {
        usize::from(self.deck_count) * 52 + usize::from(self.printed_jokers)
    }

    /// Scoring values for a round played with `wild_rank`.
    pub fn scoring(&self, wild_rank: Value) -> ScoringRules {
        ScoringRules {
            wild_rank,
            face_points: self.face_points,
            max_points: self.max_points,
            min_pure_sequences: self.min_pure_sequences,
            min_sequences: self.min_sequences,
        }
    }

    /// Largest amount a single points round can cost one seat.
    pub fn max_round_loss(&self) -> Money {
        Money::from(self.max_points) * self.point_value
    }
}
