//! Table actor message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::{config::TableShape, errors::TableResult, sessions::SocketId};
use crate::format::{RoundDeltas, Standing};
use crate::game::{
    Card, DeclareOutcome, DrawOutcome, DrawSource, GamePhase, GameView, Groups, Money, RoundEnd,
    SeatIndex, UserId, Value,
};
use crate::wallet::TableId;

/// Messages that can be sent to a TableActor
#[derive(Debug)]
pub enum TableMessage {
    /// Take the lowest free seat, or re-acknowledge a seated user
    Join {
        user_id: UserId,
        idempotency_key: Option<String>,
        response: oneshot::Sender<TableResult<JoinAck>>,
    },

    /// Vacate a waiting seat, or pack during play
    Leave {
        user_id: UserId,
        response: oneshot::Sender<TableResult<LeaveOutcome>>,
    },

    Draw {
        user_id: UserId,
        source: DrawSource,
        response: oneshot::Sender<TableResult<DrawOutcome>>,
    },

    Discard {
        user_id: UserId,
        card: Card,
        response: oneshot::Sender<TableResult<()>>,
    },

    Pack {
        user_id: UserId,
        response: oneshot::Sender<TableResult<()>>,
    },

    Declare {
        user_id: UserId,
        groups: Groups,
        finish_card: Card,
        response: oneshot::Sender<TableResult<DeclareOutcome>>,
    },

    /// Submit an arrangement of the hand
    Arrange {
        user_id: UserId,
        groups: Groups,
        response: oneshot::Sender<TableResult<()>>,
    },

    /// Table and round snapshot for one user. Also ends that user's grace.
    Status {
        user_id: Option<UserId>,
        response: oneshot::Sender<TableStatus>,
    },

    GetMetadata {
        response: oneshot::Sender<TableMetadata>,
    },

    /// Admin: run the timer-expiry path now
    Advance {
        response: oneshot::Sender<TableResult<AdvanceOutcome>>,
    },

    /// Start the reconnection grace of a seated user
    Disconnect { user_id: UserId },

    /// Subscribe one socket to table events
    Subscribe {
        socket_id: SocketId,
        user_id: UserId,
        sender: mpsc::Sender<TableEvent>,
    },

    Unsubscribe { socket_id: SocketId },

    /// Save a snapshot and stop the actor
    Shutdown { response: oneshot::Sender<()> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    pub seat: SeatIndex,
    /// The user already held this seat
    pub reconnected: bool,
    /// Set when this join filled the table or a round was already running
    pub game_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// Seat freed and hold released
    Vacated,
    /// Seat packed out of the running round
    Packed,
}

/// What an admin advance did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    AutoDiscarded { seat: SeatIndex, card: Card },
    AutoPacked { seat: SeatIndex },
    /// The declare window was closed and the round settled
    RoundFinalized,
    /// No round in a state the timer acts on
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableState {
    Waiting,
    Playing,
}

/// Table metadata for discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: TableId,
    pub shape: TableShape,
    pub seated: usize,
    pub state: TableState,
    pub created_at: DateTime<Utc>,
}

impl TableMetadata {
    /// Waiting with at least one free seat
    pub fn is_open(&self) -> bool {
        self.state == TableState::Waiting && self.seated < self.shape.no_of_players
    }
}

/// Status snapshot sent in reply to a `status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatus {
    pub table_id: TableId,
    pub shape: TableShape,
    pub state: TableState,
    pub seats: Vec<Option<UserId>>,
    /// Seat of the requesting user, if seated
    pub seat: Option<SeatIndex>,
    pub game: Option<GameView>,
    pub match_id: Option<Uuid>,
    pub standings: Option<Vec<Standing>>,
}

/// Events pushed to every subscriber of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TableEvent {
    StartGame {
        table_id: TableId,
        game_id: Uuid,
        players: Vec<UserId>,
        wild_rank: Value,
        current_turn: SeatIndex,
        turn_deadline: Option<DateTime<Utc>>,
    },
    Status {
        table_id: TableId,
        game_id: Uuid,
        phase: GamePhase,
        current_turn: SeatIndex,
        turn_seq: u64,
        discard_top: Option<Card>,
        stock_count: usize,
        turn_deadline: Option<DateTime<Utc>>,
    },
    RoundEnd {
        table_id: TableId,
        game_id: Uuid,
        end: RoundEnd,
        deltas: RoundDeltas,
    },
    MatchEnd {
        table_id: TableId,
        match_id: Uuid,
        winner: UserId,
        standings: Vec<Standing>,
        prize: Money,
    },
    /// The round was abandoned and every hold refunded
    GameAborted {
        table_id: TableId,
        game_id: Uuid,
        reason: String,
    },
}
