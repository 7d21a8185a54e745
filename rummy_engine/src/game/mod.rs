//! Rummy game engine - cards, meld validation and the per-round state machine.
//!
//! This module provides:
//! - Card, suit and deck entities with wire codes (`AS`, `10H`, `JK`)
//! - Meld classification and declare validation with wild-card substitution
//! - `GameSession`, which owns the deck, discard pile and hands of one round

pub mod constants;
pub mod entities;
pub mod melds;
pub mod state_machine;

pub use entities::{Card, Deck, Groups, Money, SeatIndex, Suit, UserId, Value};
pub use melds::{DeclareRejection, MeldKind};
pub use state_machine::{
    DeclareOutcome, DrawOutcome, DrawSource, DropKind, GameError, GamePhase, GameResult,
    GameSession, GameView, RoundEnd, SeatOutcome, SeatResult, SeatState, SeatStatus, SeatView,
};
