//! Rummy round state machine.
//!
//! A `GameSession` owns every card of one round: the stock, the discard
//! pile and each seat's hand. All turn rules are enforced here; the table
//! actor only decides *when* to call into the session.

use chrono::{DateTime, Utc};
use log::error;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::constants::{MAX_PLAYERS, MIN_PLAYERS};
use super::entities::{Card, CardCounts, Deck, Groups, SeatIndex, UserId, Value, card_counts};
use super::melds::{self, DeclareRejection};
use crate::errors::ErrorCode;
use crate::format::config::{DeclarePolicy, RulesConfig, TossOrder, WrongDeclarePolicy};
use crate::wallet::TableId;

/// Errors raised by game actions
#[derive(Debug, Clone, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum GameError {
    #[error("not your turn")]
    NotYourTurn,
    #[error("already drew this turn")]
    AlreadyDrawn,
    #[error("draw a card first")]
    NotDrawn,
    #[error("card {0} is not in your hand")]
    CardNotInHand(Card),
    #[error("cannot discard the card just taken from the discard pile")]
    CannotDiscardPickedCard,
    #[error("discard pile is empty")]
    EmptyDiscardPile,
    #[error("stock and discard pile are exhausted")]
    StockExhausted,
    #[error("seat already packed")]
    AlreadyPacked,
    #[error("round is not running")]
    RoundNotRunning,
    #[error("seat {0} is not part of this round")]
    UnknownSeat(SeatIndex),
    #[error("need 2-6 players, got {0}")]
    InvalidPlayerCount(usize),
    #[error("wild rank must be 1-13, got {0}")]
    InvalidWildRank(Value),
    #[error("groups must use exactly the cards in hand")]
    InvalidGroups,
    #[error("card conservation violated: expected {expected} cards, found {actual}")]
    CardConservation { expected: usize, actual: usize },
}

impl GameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GameError::NotYourTurn
            | GameError::AlreadyDrawn
            | GameError::AlreadyPacked
            | GameError::RoundNotRunning => ErrorCode::Conflict,
            GameError::CardConservation { .. } => ErrorCode::ServerError,
            _ => ErrorCode::InvalidRequest,
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Waiting,
    Dealing,
    Started,
    Declaring,
    AllButOnePacked,
    Settling,
    Closed,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            GamePhase::Waiting => "waiting",
            GamePhase::Dealing => "dealing",
            GamePhase::Started => "started",
            GamePhase::Declaring => "declaring",
            GamePhase::AllButOnePacked => "all_but_one_packed",
            GamePhase::Settling => "settling",
            GamePhase::Closed => "closed",
        };
        write!(f, "{repr}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawSource {
    Stock,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropKind {
    /// Packed before taking a single turn
    First,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "drop", rename_all = "lowercase")]
pub enum SeatStatus {
    Active,
    Packed(DropKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatState {
    pub user_id: UserId,
    pub hand: Vec<Card>,
    /// Latest arrangement of the hand submitted by the seat.
    pub groups: Groups,
    pub status: SeatStatus,
    pub turns_taken: u32,
    pub missed_turns: u32,
    /// Set once the seat has shown its groups after a declare.
    pub groups_final: bool,
}

impl SeatState {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            hand: Vec::with_capacity(super::entities::default_hand_capacity()),
            groups: Vec::new(),
            status: SeatStatus::Active,
            turns_taken: 0,
            missed_turns: 0,
            groups_final: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SeatStatus::Active
    }
}

/// How a round finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundEnd {
    Declared { winner: SeatIndex },
    AllButOnePacked { winner: SeatIndex },
    /// Nothing left to draw; nobody wins and nothing is charged.
    NoResult,
}

impl RoundEnd {
    pub fn winner(&self) -> Option<SeatIndex> {
        match self {
            RoundEnd::Declared { winner } | RoundEnd::AllButOnePacked { winner } => Some(*winner),
            RoundEnd::NoResult => None,
        }
    }
}

/// A seat's result for one round, before any format rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SeatResult {
    Winner,
    Packed { drop: DropKind },
    Lost { hand_points: u32 },
    NoResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatOutcome {
    pub seat: SeatIndex,
    pub user_id: UserId,
    pub result: SeatResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub card: Card,
    /// The discard pile was turned into a new stock before drawing.
    pub reshuffled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclareOutcome {
    Accepted,
    Rejected {
        reason: DeclareRejection,
        finish_card_discarded: bool,
    },
}

/// Public view of a seat, safe to send to every player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    pub seat: SeatIndex,
    pub user_id: UserId,
    pub status: SeatStatus,
    pub cards_in_hand: usize,
}

/// Snapshot of the round as seen by one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: Uuid,
    pub table_id: TableId,
    pub phase: GamePhase,
    pub wild_rank: Value,
    pub current_turn: SeatIndex,
    pub turn_seq: u64,
    pub has_drawn: bool,
    pub turn_deadline: Option<DateTime<Utc>>,
    pub discard_top: Option<Card>,
    pub stock_count: usize,
    pub seats: Vec<SeatView>,
    /// Present only for the seat the view was built for.
    pub hand: Option<Vec<Card>>,
    pub groups: Option<Groups>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub game_id: Uuid,
    pub table_id: TableId,
    pub rules: RulesConfig,
    pub seats: Vec<SeatState>,
    deck: Deck,
    discard: Deck,
    pub wild_rank: Value,
    pub current_turn: SeatIndex,
    pub turn_seq: u64,
    pub has_drawn: bool,
    picked_from_discard: Option<Card>,
    pub phase: GamePhase,
    pub started_at: DateTime<Utc>,
    pub turn_deadline: Option<DateTime<Utc>>,
    pub end: Option<RoundEnd>,
    /// Drawn from the dealing rng; seeds every stock rebuild
    #[serde(default)]
    shuffle_seed: u64,
    #[serde(default)]
    reshuffles: u64,
}

impl GameSession {
    /// Creates a round for the given seat-ordered players.
    ///
    /// # Arguments
    ///
    /// * `table_id` - Table the round is played at
    /// * `players` - User ids in seat order
    /// * `rules` - Rules the round is played under
    pub fn new(table_id: TableId, players: &[UserId], rules: RulesConfig) -> GameResult<Self> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&players.len()) {
            return Err(GameError::InvalidPlayerCount(players.len()));
        }
        Ok(Self {
            game_id: Uuid::new_v4(),
            table_id,
            rules,
            seats: players.iter().copied().map(SeatState::new).collect(),
            deck: Deck::default(),
            discard: Deck::default(),
            wild_rank: 1,
            current_turn: 0,
            turn_seq: 0,
            has_drawn: false,
            picked_from_discard: None,
            phase: GamePhase::Waiting,
            started_at: Utc::now(),
            turn_deadline: None,
            end: None,
            shuffle_seed: 0,
            reshuffles: 0,
        })
    }

    /// Shuffles a fresh deck, deals every hand, opens the discard pile and
    /// picks the opening seat.
    pub fn deal_initial_hands<R: Rng + ?Sized>(
        &mut self,
        wild_rank: Option<Value>,
        rng: &mut R,
    ) -> GameResult<()> {
        if self.phase != GamePhase::Waiting {
            return Err(GameError::RoundNotRunning);
        }
        let wild_rank = match wild_rank {
            Some(rank @ 1..=13) => rank,
            Some(rank) => return Err(GameError::InvalidWildRank(rank)),
            None => rng.random_range(1..=13),
        };
        self.phase = GamePhase::Dealing;

        let mut deck = Deck::standard(self.rules.deck_count, self.rules.printed_jokers);
        deck.shuffle(rng);
        for _ in 0..self.rules.hand_size {
            for seat in &mut self.seats {
                let card = deck.draw().ok_or(GameError::StockExhausted)?;
                seat.hand.push(card);
            }
        }
        let opener = deck.draw().ok_or(GameError::StockExhausted)?;
        self.discard.push(opener);
        self.deck = deck;
        self.wild_rank = wild_rank;
        self.current_turn = match self.rules.toss_order {
            TossOrder::SeatZero => 0,
            TossOrder::Random => rng.random_range(0..self.seats.len()),
        };
        self.shuffle_seed = rng.random();
        self.reshuffles = 0;
        self.turn_seq = 1;
        self.started_at = Utc::now();
        self.phase = GamePhase::Started;
        Ok(())
    }

    pub fn players(&self) -> Vec<UserId> {
        self.seats.iter().map(|s| s.user_id).collect()
    }

    pub fn seat_of(&self, user_id: UserId) -> Option<SeatIndex> {
        self.seats.iter().position(|s| s.user_id == user_id)
    }

    pub fn stock_count(&self) -> usize {
        self.deck.len()
    }

    pub fn discard_top(&self) -> Option<Card> {
        self.discard.top().copied()
    }

    pub fn is_running(&self) -> bool {
        self.phase == GamePhase::Started
    }

    pub fn active_seats(&self) -> usize {
        self.seats.iter().filter(|s| s.is_active()).count()
    }

    fn seat(&self, seat: SeatIndex) -> GameResult<&SeatState> {
        self.seats.get(seat).ok_or(GameError::UnknownSeat(seat))
    }

    fn ensure_turn(&self, seat: SeatIndex) -> GameResult<()> {
        if !self.is_running() {
            return Err(GameError::RoundNotRunning);
        }
        self.seat(seat)?;
        if seat != self.current_turn {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    /// Draws a card for the seat on turn.
    ///
    /// An empty stock is rebuilt from the discard pile minus its top card.
    /// When there is nothing left to rebuild from, the round ends with no
    /// result and the draw is rejected.
    pub fn draw(&mut self, seat: SeatIndex, source: DrawSource) -> GameResult<DrawOutcome> {
        self.ensure_turn(seat)?;
        if self.has_drawn {
            return Err(GameError::AlreadyDrawn);
        }

        let mut reshuffled = false;
        let card = match source {
            DrawSource::Stock => {
                if self.deck.is_empty() {
                    let rest = self.discard.take_all_but_top();
                    if rest.is_empty() {
                        self.phase = GamePhase::Settling;
                        self.end = Some(RoundEnd::NoResult);
                        return Err(GameError::StockExhausted);
                    }
                    let mut stock = Deck::from_cards(rest);
                    let seed = self.shuffle_seed.wrapping_add(self.reshuffles);
                    stock.shuffle(&mut StdRng::seed_from_u64(seed));
                    self.reshuffles += 1;
                    self.deck = stock;
                    reshuffled = true;
                }
                self.deck.draw().ok_or(GameError::StockExhausted)?
            }
            DrawSource::Discard => {
                let card = self.discard.draw().ok_or(GameError::EmptyDiscardPile)?;
                self.picked_from_discard = Some(card);
                card
            }
        };

        self.seats[seat].hand.push(card);
        self.has_drawn = true;
        Ok(DrawOutcome { card, reshuffled })
    }

    /// Throws `card` from the seat on turn and passes the turn.
    pub fn discard(&mut self, seat: SeatIndex, card: Card) -> GameResult<()> {
        self.ensure_turn(seat)?;
        if !self.has_drawn {
            return Err(GameError::NotDrawn);
        }
        let held = self.seats[seat].hand.iter().filter(|c| **c == card).count();
        if held == 0 {
            return Err(GameError::CardNotInHand(card));
        }
        if self.picked_from_discard == Some(card) && held == 1 {
            return Err(GameError::CannotDiscardPickedCard);
        }

        self.throw(seat, card);
        self.seats[seat].turns_taken += 1;
        self.advance_turn();
        Ok(())
    }

    fn throw(&mut self, seat: SeatIndex, card: Card) {
        let hand = &mut self.seats[seat].hand;
        if let Some(pos) = hand.iter().position(|c| *c == card) {
            hand.remove(pos);
            self.discard.push(card);
        }
    }

    fn advance_turn(&mut self) {
        let n = self.seats.len();
        for step in 1..=n {
            let next = (self.current_turn + step) % n;
            if self.seats[next].is_active() {
                self.current_turn = next;
                break;
            }
        }
        self.turn_seq += 1;
        self.has_drawn = false;
        self.picked_from_discard = None;
        self.turn_deadline = None;
    }

    /// Drops a seat out of the round.
    ///
    /// Returns the round end when only one active seat remains.
    pub fn pack(&mut self, seat: SeatIndex) -> GameResult<Option<RoundEnd>> {
        if !self.is_running() {
            return Err(GameError::RoundNotRunning);
        }
        let state = self.seat(seat)?;
        if !state.is_active() {
            return Err(GameError::AlreadyPacked);
        }
        let mid_turn = seat == self.current_turn && self.has_drawn;
        let drop = if state.turns_taken == 0 && !mid_turn {
            DropKind::First
        } else {
            DropKind::Middle
        };
        self.seats[seat].status = SeatStatus::Packed(drop);

        if self.active_seats() == 1 {
            let winner = self
                .seats
                .iter()
                .position(SeatState::is_active)
                .ok_or(GameError::UnknownSeat(seat))?;
            let end = RoundEnd::AllButOnePacked { winner };
            self.phase = GamePhase::AllButOnePacked;
            self.end = Some(end);
            self.turn_seq += 1;
            self.turn_deadline = None;
            return Ok(Some(end));
        }
        if seat == self.current_turn {
            self.advance_turn();
        }
        Ok(None)
    }

    /// Validates and applies a declare.
    ///
    /// A rejected declare leaves the round running. Under
    /// `WrongDeclarePolicy::DiscardFinishCard` the finish card is thrown and
    /// the turn passes.
    pub fn declare(
        &mut self,
        seat: SeatIndex,
        groups: Groups,
        finish_card: Card,
    ) -> GameResult<DeclareOutcome> {
        if !self.is_running() {
            return Err(GameError::RoundNotRunning);
        }
        let state = self.seat(seat)?;
        if !state.is_active() {
            return Err(GameError::AlreadyPacked);
        }
        let on_turn = seat == self.current_turn;
        if self.rules.declare_policy == DeclarePolicy::Strict && !on_turn {
            return Err(GameError::NotYourTurn);
        }
        if on_turn && !self.has_drawn {
            return Err(GameError::NotDrawn);
        }

        let scoring = self.rules.scoring(self.wild_rank);
        if let Err(reason) = melds::validate_declare(&state.hand, &groups, finish_card, &scoring) {
            let discard_finish = on_turn
                && self.rules.wrong_declare_policy == WrongDeclarePolicy::DiscardFinishCard
                && state.hand.contains(&finish_card)
                && self.picked_from_discard != Some(finish_card);
            if discard_finish {
                self.throw(seat, finish_card);
                self.seats[seat].turns_taken += 1;
                self.advance_turn();
            }
            return Ok(DeclareOutcome::Rejected {
                reason,
                finish_card_discarded: discard_finish,
            });
        }

        self.throw(seat, finish_card);
        let declarer = &mut self.seats[seat];
        declarer.groups = groups;
        declarer.groups_final = true;
        declarer.turns_taken += 1;
        self.phase = GamePhase::Declaring;
        self.end = Some(RoundEnd::Declared { winner: seat });
        self.turn_seq += 1;
        self.turn_deadline = None;
        Ok(DeclareOutcome::Accepted)
    }

    /// Records a seat's arrangement of its hand.
    ///
    /// After a declare this is how the other seats show their melds; once
    /// every active seat has shown, `awaiting_groups` turns false.
    pub fn submit_groups(&mut self, seat: SeatIndex, groups: Groups) -> GameResult<()> {
        if !matches!(self.phase, GamePhase::Started | GamePhase::Declaring) {
            return Err(GameError::RoundNotRunning);
        }
        let state = self.seat(seat)?;
        if !state.is_active() {
            return Err(GameError::AlreadyPacked);
        }
        if self.phase == GamePhase::Declaring && state.groups_final {
            return Err(GameError::RoundNotRunning);
        }
        if !melds::is_partition(&state.hand, &groups) {
            return Err(GameError::InvalidGroups);
        }
        let declaring = self.phase == GamePhase::Declaring;
        let state = &mut self.seats[seat];
        state.groups = groups;
        state.groups_final = declaring;
        Ok(())
    }

    /// True while a declared round still waits on active seats to show.
    pub fn awaiting_groups(&self) -> bool {
        self.phase == GamePhase::Declaring
            && self.seats.iter().any(|s| s.is_active() && !s.groups_final)
    }

    /// Moves a finished round into settlement. Returns `None` if the round
    /// is still running or settlement has already begun.
    pub fn begin_settlement(&mut self) -> Option<RoundEnd> {
        match self.phase {
            GamePhase::Declaring | GamePhase::AllButOnePacked => {
                self.phase = GamePhase::Settling;
                self.turn_deadline = None;
                self.end
            }
            _ => None,
        }
    }

    pub fn close(&mut self) {
        self.phase = GamePhase::Closed;
        self.turn_deadline = None;
    }

    /// Per-seat results of a finished round.
    pub fn seat_outcomes(&self) -> Vec<SeatOutcome> {
        let winner = self.end.and_then(|end| end.winner());
        let scoring = self.rules.scoring(self.wild_rank);
        self.seats
            .iter()
            .enumerate()
            .map(|(seat, state)| {
                let result = match (winner, state.status) {
                    (None, _) => SeatResult::NoResult,
                    (Some(w), _) if w == seat => SeatResult::Winner,
                    (Some(_), SeatStatus::Packed(drop)) => SeatResult::Packed { drop },
                    (Some(_), SeatStatus::Active) => SeatResult::Lost {
                        hand_points: melds::hand_points(&state.hand, &state.groups, &scoring),
                    },
                };
                SeatOutcome {
                    seat,
                    user_id: state.user_id,
                    result,
                }
            })
            .collect()
    }

    /// Increments and returns the consecutive timeouts of a seat.
    pub fn note_timeout(&mut self, seat: SeatIndex) -> u32 {
        match self.seats.get_mut(seat) {
            Some(state) => {
                state.missed_turns += 1;
                state.missed_turns
            }
            None => 0,
        }
    }

    pub fn clear_missed_turns(&mut self, seat: SeatIndex) {
        if let Some(state) = self.seats.get_mut(seat) {
            state.missed_turns = 0;
        }
    }

    /// Plays a timed-out turn: draws from stock if needed, then throws the
    /// cheapest card that is not wild.
    pub fn auto_discard(&mut self, seat: SeatIndex) -> GameResult<Card> {
        self.ensure_turn(seat)?;
        if !self.has_drawn {
            self.draw(seat, DrawSource::Stock)?;
        }
        let hand = &self.seats[seat].hand;
        let blocked = self.picked_from_discard;
        let held = |card: &Card| hand.iter().filter(|c| *c == card).count();
        let card = hand
            .iter()
            .filter(|c| Some(**c) != blocked || held(*c) > 1)
            .min_by_key(|c| {
                (
                    c.is_wild(self.wild_rank),
                    c.points(self.wild_rank, self.rules.face_points),
                    **c,
                )
            })
            .copied()
            .ok_or(GameError::NotDrawn)?;
        self.discard(seat, card)?;
        Ok(card)
    }

    fn all_cards(&self) -> CardCounts {
        card_counts(
            self.deck
                .cards()
                .iter()
                .chain(self.discard.cards())
                .chain(self.seats.iter().flat_map(|s| s.hand.iter())),
        )
    }

    /// Checks that stock, discard pile and hands still hold exactly one
    /// full card set.
    pub fn verify_conservation(&self) -> GameResult<()> {
        if matches!(self.phase, GamePhase::Waiting | GamePhase::Dealing) {
            return Ok(());
        }
        let expected = Deck::standard(self.rules.deck_count, self.rules.printed_jokers);
        let actual = self.all_cards();
        if card_counts(expected.cards()) != actual {
            let actual_len = actual.values().sum();
            error!(
                "Card conservation violated in game {} at table {}: expected {}, found {}",
                self.game_id,
                self.table_id,
                expected.len(),
                actual_len
            );
            return Err(GameError::CardConservation {
                expected: expected.len(),
                actual: actual_len,
            });
        }
        Ok(())
    }

    /// View of the round for `viewer`; hands of other seats stay hidden.
    pub fn view(&self, viewer: Option<UserId>) -> GameView {
        let own = viewer.and_then(|user| self.seat_of(user)).map(|s| &self.seats[s]);
        GameView {
            game_id: self.game_id,
            table_id: self.table_id,
            phase: self.phase,
            wild_rank: self.wild_rank,
            current_turn: self.current_turn,
            turn_seq: self.turn_seq,
            has_drawn: self.has_drawn,
            turn_deadline: self.turn_deadline,
            discard_top: self.discard_top(),
            stock_count: self.deck.len(),
            seats: self
                .seats
                .iter()
                .enumerate()
                .map(|(seat, s)| SeatView {
                    seat,
                    user_id: s.user_id,
                    status: s.status,
                    cards_in_hand: s.hand.len(),
                })
                .collect(),
            hand: own.map(|s| s.hand.clone()),
            groups: own.map(|s| s.groups.clone()),
        }
    }

    /// Replaces the stock. Used to stage exhausted-deck situations.
    #[doc(hidden)]
    pub fn set_stock(&mut self, cards: Vec<Card>) {
        self.deck = Deck::from_cards(cards);
    }

    /// Replaces the discard pile.
    #[doc(hidden)]
    pub fn set_discard_pile(&mut self, cards: Vec<Card>) {
        self.discard = Deck::from_cards(cards);
    }

    pub fn discard_pile(&self) -> &[Card] {
        self.discard.cards()
    }
}
