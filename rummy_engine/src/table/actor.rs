//! Table actor implementation with async message handling.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Duration, Instant, interval},
};
use uuid::Uuid;

use super::{
    config::{TableConfig, TableShape},
    errors::{TableError, TableResult},
    messages::{
        AdvanceOutcome, JoinAck, LeaveOutcome, TableEvent, TableMessage, TableMetadata,
        TableState, TableStatus,
    },
    observer::SettlementObserver,
    sessions::SocketId,
};
use crate::format::{MatchState, compute_round_deltas};
use crate::game::{
    Card, DeclareOutcome, DrawOutcome, DrawSource, GameError, GamePhase, GameSession, Groups,
    SeatIndex, UserId,
};
use crate::persistence::{SnapshotStore, TableSnapshot};
use crate::timer::{TimeoutOutcome, TimerKind, TimerToken, TurnTimer, timeout_outcome};
use crate::wallet::{FinanceGateway, MatchOutcome, MatchStatus, TableId};

/// Table actor handle for sending messages
#[derive(Clone, Debug)]
pub struct TableHandle {
    sender: mpsc::Sender<TableMessage>,
    table_id: TableId,
}

impl TableHandle {
    /// Create a new table handle
    pub fn new(sender: mpsc::Sender<TableMessage>, table_id: TableId) -> Self {
        Self { sender, table_id }
    }

    /// Get table ID
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// True once the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a message to the table
    pub async fn send(&self, message: TableMessage) -> TableResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| TableError::TableClosed(self.table_id))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TableMessage,
    ) -> TableResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| TableError::TableClosed(self.table_id))
    }

    pub async fn join(
        &self,
        user_id: UserId,
        idempotency_key: Option<String>,
    ) -> TableResult<JoinAck> {
        self.request(|response| TableMessage::Join {
            user_id,
            idempotency_key,
            response,
        })
        .await?
    }

    pub async fn leave(&self, user_id: UserId) -> TableResult<LeaveOutcome> {
        self.request(|response| TableMessage::Leave { user_id, response })
            .await?
    }

    pub async fn draw(&self, user_id: UserId, source: DrawSource) -> TableResult<DrawOutcome> {
        self.request(|response| TableMessage::Draw {
            user_id,
            source,
            response,
        })
        .await?
    }

    pub async fn discard(&self, user_id: UserId, card: Card) -> TableResult<()> {
        self.request(|response| TableMessage::Discard {
            user_id,
            card,
            response,
        })
        .await?
    }

    pub async fn pack(&self, user_id: UserId) -> TableResult<()> {
        self.request(|response| TableMessage::Pack { user_id, response })
            .await?
    }

    pub async fn declare(
        &self,
        user_id: UserId,
        groups: Groups,
        finish_card: Card,
    ) -> TableResult<DeclareOutcome> {
        self.request(|response| TableMessage::Declare {
            user_id,
            groups,
            finish_card,
            response,
        })
        .await?
    }

    pub async fn arrange(&self, user_id: UserId, groups: Groups) -> TableResult<()> {
        self.request(|response| TableMessage::Arrange {
            user_id,
            groups,
            response,
        })
        .await?
    }

    pub async fn status(&self, user_id: Option<UserId>) -> TableResult<TableStatus> {
        self.request(|response| TableMessage::Status { user_id, response })
            .await
    }

    pub async fn metadata(&self) -> TableResult<TableMetadata> {
        self.request(|response| TableMessage::GetMetadata { response })
            .await
    }

    pub async fn advance(&self) -> TableResult<AdvanceOutcome> {
        self.request(|response| TableMessage::Advance { response })
            .await?
    }

    pub async fn disconnect(&self, user_id: UserId) -> TableResult<()> {
        self.send(TableMessage::Disconnect { user_id }).await
    }

    /// Routes table events to one socket of `user_id`. Each socket keeps
    /// its own subscription.
    pub async fn subscribe(
        &self,
        socket_id: SocketId,
        user_id: UserId,
        sender: mpsc::Sender<TableEvent>,
    ) -> TableResult<()> {
        self.send(TableMessage::Subscribe {
            socket_id,
            user_id,
            sender,
        })
        .await
    }

    pub async fn unsubscribe(&self, socket_id: SocketId) -> TableResult<()> {
        self.send(TableMessage::Unsubscribe { socket_id }).await
    }

    pub async fn shutdown(&self) -> TableResult<()> {
        self.request(|response| TableMessage::Shutdown { response })
            .await
    }
}

/// Event channel of one subscribed socket
struct Subscriber {
    user_id: UserId,
    sender: mpsc::Sender<TableEvent>,
}

/// Table actor owning one table: its seats, the running round and the
/// match accumulator.
pub struct TableActor {
    id: TableId,
    shape: TableShape,
    config: TableConfig,

    /// Seat-ordered occupants
    seats: Vec<Option<UserId>>,

    /// Current round, kept until it is fully settled
    game: Option<GameSession>,

    match_id: Option<Uuid>,
    match_state: Option<MatchState>,

    timer: TurnTimer,

    /// Message inbox
    inbox: mpsc::Receiver<TableMessage>,

    finance: FinanceGateway,
    snapshots: Arc<dyn SnapshotStore>,
    observer: Arc<dyn SettlementObserver>,

    /// Join idempotency keys already accepted
    processed_joins: HashSet<String>,

    /// Reconnection deadlines of disconnected users
    grace: HashMap<UserId, Instant>,

    /// Subscribers for table events, keyed by socket
    subscribers: HashMap<SocketId, Subscriber>,

    created_at: DateTime<Utc>,
    is_closed: bool,
}

impl TableActor {
    /// Create a new table actor
    ///
    /// # Arguments
    ///
    /// * `id` - Table ID
    /// * `shape` - Stake, seat count and format
    /// * `config` - Rules and table settings
    /// * `finance` - Finance gateway for holds and settlement
    /// * `snapshots` - Snapshot store
    /// * `observer` - Told about every settled round and match
    ///
    /// # Returns
    ///
    /// * `(TableActor, TableHandle)` - Actor and handle for sending messages
    pub fn new(
        id: TableId,
        shape: TableShape,
        config: TableConfig,
        finance: FinanceGateway,
        snapshots: Arc<dyn SnapshotStore>,
        observer: Arc<dyn SettlementObserver>,
    ) -> (Self, TableHandle) {
        let (sender, inbox) = mpsc::channel(config.inbox_capacity);
        let actor = Self {
            id,
            shape,
            seats: vec![None; shape.no_of_players],
            game: None,
            match_id: None,
            match_state: None,
            timer: TurnTimer::new(config.rules.timer_mode),
            config,
            inbox,
            finance,
            snapshots,
            observer,
            processed_joins: HashSet::new(),
            grace: HashMap::new(),
            subscribers: HashMap::new(),
            created_at: Utc::now(),
            is_closed: false,
        };
        (actor, TableHandle::new(sender, id))
    }

    /// Rebuilds an actor from a saved snapshot.
    ///
    /// No socket survives a restart, so every seated user starts a fresh
    /// reconnection grace.
    pub fn restore(
        snapshot: TableSnapshot,
        config: TableConfig,
        finance: FinanceGateway,
        snapshots: Arc<dyn SnapshotStore>,
        observer: Arc<dyn SettlementObserver>,
    ) -> (Self, TableHandle) {
        let (mut actor, handle) = Self::new(
            snapshot.table_id,
            snapshot.shape,
            config,
            finance,
            snapshots,
            observer,
        );
        actor.seats = snapshot.seats;
        actor.seats.resize(snapshot.shape.no_of_players, None);
        actor.game = snapshot.game;
        actor.match_id = snapshot.match_id;
        actor.match_state = snapshot.match_state;
        actor.processed_joins = snapshot.processed_joins.into_iter().collect();
        actor.created_at = snapshot.created_at;

        let deadline = Instant::now() + actor.config.reconnect_grace;
        actor.grace = actor
            .seats
            .iter()
            .flatten()
            .map(|user_id| (*user_id, deadline))
            .collect();
        (actor, handle)
    }

    /// Run the table actor event loop
    pub async fn run(mut self) {
        info!("Table {} ({}) starting", self.id, self.shape);
        self.resume().await;

        let mut tick = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => {
                        self.handle_message(message).await;
                        if self.is_closed {
                            break;
                        }
                    }
                    None => break,
                },

                token = self.timer.wait() => {
                    self.on_timer(token).await;
                }

                _ = tick.tick() => {
                    self.expire_graces().await;
                }
            }
        }

        info!("Table {} closed", self.id);
    }

    /// Picks up a restored round where it stopped.
    async fn resume(&mut self) {
        let Some(game) = self.game.as_ref() else {
            return;
        };
        match game.phase {
            GamePhase::Started | GamePhase::Declaring => self.arm_timer(),
            GamePhase::AllButOnePacked | GamePhase::Settling => {
                info!("Table {}: finishing restored round {}", self.id, game.game_id);
                self.finish_round().await;
            }
            _ => {}
        }
    }

    /// Handle a table message
    async fn handle_message(&mut self, message: TableMessage) {
        match message {
            TableMessage::Join {
                user_id,
                idempotency_key,
                response,
            } => {
                let result = self.handle_join(user_id, idempotency_key).await;
                let _ = response.send(result);
            }

            TableMessage::Leave { user_id, response } => {
                let result = self.handle_leave(user_id).await;
                let _ = response.send(result);
            }

            TableMessage::Draw {
                user_id,
                source,
                response,
            } => {
                let result = self.handle_draw(user_id, source).await;
                let _ = response.send(result);
            }

            TableMessage::Discard {
                user_id,
                card,
                response,
            } => {
                let result = self.handle_discard(user_id, card).await;
                let _ = response.send(result);
            }

            TableMessage::Pack { user_id, response } => {
                let result = self.handle_pack(user_id).await;
                let _ = response.send(result);
            }

            TableMessage::Declare {
                user_id,
                groups,
                finish_card,
                response,
            } => {
                let result = self.handle_declare(user_id, groups, finish_card).await;
                let _ = response.send(result);
            }

            TableMessage::Arrange {
                user_id,
                groups,
                response,
            } => {
                let result = self.handle_arrange(user_id, groups).await;
                let _ = response.send(result);
            }

            TableMessage::Status { user_id, response } => {
                let _ = response.send(self.status(user_id));
            }

            TableMessage::GetMetadata { response } => {
                let _ = response.send(self.metadata());
            }

            TableMessage::Advance { response } => {
                let result = self.advance().await;
                let _ = response.send(result);
            }

            TableMessage::Disconnect { user_id } => {
                if self.seat_of(user_id).is_some() {
                    let deadline = Instant::now() + self.config.reconnect_grace;
                    self.grace.insert(user_id, deadline);
                    info!(
                        "Table {}: user {} disconnected, holding seat for {:?}",
                        self.id, user_id, self.config.reconnect_grace
                    );
                }
            }

            TableMessage::Subscribe {
                socket_id,
                user_id,
                sender,
            } => {
                self.subscribers
                    .insert(socket_id, Subscriber { user_id, sender });
                debug!(
                    "User {} subscribed to table {} events on socket {}",
                    user_id, self.id, socket_id
                );
            }

            TableMessage::Unsubscribe { socket_id } => {
                if let Some(subscriber) = self.subscribers.remove(&socket_id) {
                    debug!(
                        "User {} unsubscribed socket {} from table {}",
                        subscriber.user_id, socket_id, self.id
                    );
                }
            }

            TableMessage::Shutdown { response } => {
                self.timer.cancel();
                self.persist().await;
                self.is_closed = true;
                let _ = response.send(());
            }
        }
    }

    /// Broadcast an event to all subscribers
    fn notify(&mut self, event: TableEvent) {
        self.subscribers
            .retain(|socket_id, subscriber| match subscriber.sender.try_send(event.clone()) {
                Ok(_) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "Socket {} of user {} channel full, dropping event",
                        socket_id, subscriber.user_id
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Socket {} disconnected, removing", socket_id);
                    false
                }
            });
    }

    fn notify_status(&mut self) {
        let Some(game) = self.game.as_ref() else {
            return;
        };
        let event = TableEvent::Status {
            table_id: self.id,
            game_id: game.game_id,
            phase: game.phase,
            current_turn: game.current_turn,
            turn_seq: game.turn_seq,
            discard_top: game.discard_top(),
            stock_count: game.stock_count(),
            turn_deadline: game.turn_deadline,
        };
        self.notify(event);
    }

    fn seat_of(&self, user_id: UserId) -> Option<SeatIndex> {
        self.seats.iter().position(|s| *s == Some(user_id))
    }

    /// Seat of a user inside the running round
    fn game_seat(&self, user_id: UserId) -> TableResult<SeatIndex> {
        let game = self.game.as_ref().ok_or(TableError::NoGame)?;
        if self.seat_of(user_id).is_none() {
            return Err(TableError::NotSeated(user_id));
        }
        game.seat_of(user_id).ok_or(TableError::NotInRound(user_id))
    }

    fn state(&self) -> TableState {
        if self.game.is_some() || self.match_state.is_some() {
            TableState::Playing
        } else {
            TableState::Waiting
        }
    }

    /// Handle join table request
    async fn handle_join(
        &mut self,
        user_id: UserId,
        idempotency_key: Option<String>,
    ) -> TableResult<JoinAck> {
        if let Some(key) = &idempotency_key
            && self.processed_joins.contains(key)
        {
            return Err(TableError::DuplicateJoin(key.clone()));
        }

        if let Some(seat) = self.seat_of(user_id) {
            if self.grace.remove(&user_id).is_some() {
                info!("Table {}: user {} reconnected to seat {}", self.id, user_id, seat);
            }
            return Ok(JoinAck {
                seat,
                reconnected: true,
                game_id: self.game.as_ref().map(|g| g.game_id),
            });
        }

        if self.state() == TableState::Playing {
            return Err(TableError::TableFull);
        }
        let seat = self
            .seats
            .iter()
            .position(Option::is_none)
            .ok_or(TableError::TableFull)?;

        let amount = FinanceGateway::compute_reserve_hold(&self.shape, &self.config.rules);
        self.finance.place_hold(user_id, self.id, amount).await?;
        self.seats[seat] = Some(user_id);
        if let Some(key) = idempotency_key {
            self.processed_joins.insert(key);
        }
        info!(
            "User {} joined table {} at seat {} with hold {}",
            user_id, self.id, seat, amount
        );

        let game_id = match self.start_if_full() {
            Ok(game_id) => game_id,
            Err(e) => {
                error!("Table {}: failed to deal: {}", self.id, e);
                self.abort_game(e.to_string()).await;
                return Err(e);
            }
        };
        self.persist().await;

        Ok(JoinAck {
            seat,
            reconnected: false,
            game_id,
        })
    }

    /// Handle leave table request
    async fn handle_leave(&mut self, user_id: UserId) -> TableResult<LeaveOutcome> {
        let seat = self
            .seat_of(user_id)
            .ok_or(TableError::NotSeated(user_id))?;

        if self.game.is_some() {
            self.handle_pack(user_id).await?;
            return Ok(LeaveOutcome::Packed);
        }

        self.finance.release_user_hold(self.id, user_id).await?;
        self.seats[seat] = None;
        self.grace.remove(&user_id);
        self.subscribers.retain(|_, s| s.user_id != user_id);
        info!("User {} left table {} (seat {})", user_id, self.id, seat);
        self.persist().await;
        Ok(LeaveOutcome::Vacated)
    }

    async fn handle_draw(&mut self, user_id: UserId, source: DrawSource) -> TableResult<DrawOutcome> {
        let seat = self.game_seat(user_id)?;
        let drawn = self
            .game
            .as_mut()
            .ok_or(TableError::NoGame)?
            .draw(seat, source);
        match drawn {
            Ok(outcome) => {
                if outcome.reshuffled {
                    info!("Table {}: discard pile reshuffled into stock", self.id);
                }
                self.audit().await?;
                self.notify_status();
                self.persist().await;
                Ok(outcome)
            }
            Err(GameError::StockExhausted) => {
                warn!("Table {}: no cards left to draw, round has no result", self.id);
                self.finish_round().await;
                Err(GameError::StockExhausted.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_discard(&mut self, user_id: UserId, card: Card) -> TableResult<()> {
        let seat = self.game_seat(user_id)?;
        let game = self.game.as_mut().ok_or(TableError::NoGame)?;
        game.discard(seat, card)?;
        game.clear_missed_turns(seat);
        self.audit().await?;
        self.after_turn_change().await;
        Ok(())
    }

    async fn handle_pack(&mut self, user_id: UserId) -> TableResult<()> {
        let seat = self.game_seat(user_id)?;
        self.pack_seat(seat).await
    }

    async fn pack_seat(&mut self, seat: SeatIndex) -> TableResult<()> {
        let end = self.game.as_mut().ok_or(TableError::NoGame)?.pack(seat)?;
        info!("Table {}: seat {} packed", self.id, seat);
        self.audit().await?;
        if end.is_some() {
            self.finish_round().await;
        } else {
            self.after_turn_change().await;
        }
        Ok(())
    }

    async fn handle_declare(
        &mut self,
        user_id: UserId,
        groups: Groups,
        finish_card: Card,
    ) -> TableResult<DeclareOutcome> {
        let seat = self.game_seat(user_id)?;
        let game = self.game.as_mut().ok_or(TableError::NoGame)?;
        let outcome = game.declare(seat, groups, finish_card)?;
        match &outcome {
            DeclareOutcome::Accepted => {
                game.clear_missed_turns(seat);
                let awaiting = game.awaiting_groups();
                info!("Table {}: seat {} declared", self.id, seat);
                self.audit().await?;
                if awaiting {
                    self.after_turn_change().await;
                } else {
                    self.finish_round().await;
                }
            }
            DeclareOutcome::Rejected {
                reason,
                finish_card_discarded,
            } => {
                info!(
                    "Table {}: declare by seat {} rejected: {:?}",
                    self.id, seat, reason
                );
                if *finish_card_discarded {
                    self.audit().await?;
                    self.after_turn_change().await;
                }
            }
        }
        Ok(outcome)
    }

    async fn handle_arrange(&mut self, user_id: UserId, groups: Groups) -> TableResult<()> {
        let seat = self.game_seat(user_id)?;
        let game = self.game.as_mut().ok_or(TableError::NoGame)?;
        game.submit_groups(seat, groups)?;
        let all_shown = game.phase == GamePhase::Declaring && !game.awaiting_groups();
        if all_shown {
            self.finish_round().await;
        } else {
            self.persist().await;
        }
        Ok(())
    }

    /// Get current table status for a user, ending their reconnection grace.
    fn status(&mut self, user_id: Option<UserId>) -> TableStatus {
        if let Some(user) = user_id
            && self.grace.remove(&user).is_some()
        {
            info!("Table {}: user {} reconnected", self.id, user);
        }
        TableStatus {
            table_id: self.id,
            shape: self.shape,
            state: self.state(),
            seats: self.seats.clone(),
            seat: user_id.and_then(|u| self.seat_of(u)),
            game: self.game.as_ref().map(|g| g.view(user_id)),
            match_id: self.match_id,
            standings: self.match_state.as_ref().map(MatchState::standings),
        }
    }

    fn metadata(&self) -> TableMetadata {
        TableMetadata {
            id: self.id,
            shape: self.shape,
            seated: self.seats.iter().flatten().count(),
            state: self.state(),
            created_at: self.created_at,
        }
    }

    /// Deals the first round once every seat is taken.
    fn start_if_full(&mut self) -> TableResult<Option<Uuid>> {
        if self.game.is_some() || self.seats.iter().any(Option::is_none) {
            return Ok(None);
        }
        let players: Vec<UserId> = self.seats.iter().flatten().copied().collect();
        if self.shape.format.is_match() {
            self.match_state = MatchState::start(self.shape.format, &players, &self.config.rules);
            self.match_id = Some(Uuid::new_v4());
        }
        self.deal_round(&players).map(Some)
    }

    fn deal_round(&mut self, players: &[UserId]) -> TableResult<Uuid> {
        let mut game = GameSession::new(self.id, players, self.config.rules.clone())?;
        game.deal_initial_hands(None, &mut rand::rng())?;
        let game_id = game.game_id;
        info!(
            "Table {}: dealt game {} to {} players, wild rank {}",
            self.id,
            game_id,
            players.len(),
            game.wild_rank
        );
        self.game = Some(game);
        self.arm_timer();

        if let Some(game) = self.game.as_ref() {
            let event = TableEvent::StartGame {
                table_id: self.id,
                game_id,
                players: game.players(),
                wild_rank: game.wild_rank,
                current_turn: game.current_turn,
                turn_deadline: game.turn_deadline,
            };
            self.notify(event);
        }
        Ok(game_id)
    }

    /// Arms the deadline matching the round's phase, unless it is already
    /// armed for the same turn.
    fn arm_timer(&mut self) {
        let Some(game) = self.game.as_mut() else {
            self.timer.cancel();
            return;
        };
        let (kind, duration) = match game.phase {
            GamePhase::Started => (TimerKind::Turn, game.rules.turn_duration),
            GamePhase::Declaring => (TimerKind::DeclareWindow, game.rules.declare_window),
            _ => {
                self.timer.cancel();
                return;
            }
        };
        let token = TimerToken {
            kind,
            seat: game.current_turn,
            turn_seq: game.turn_seq,
        };
        if self.timer.armed_token() == Some(token) {
            return;
        }
        game.turn_deadline = self.timer.arm(token, duration);
    }

    async fn after_turn_change(&mut self) {
        self.arm_timer();
        self.notify_status();
        self.persist().await;
    }

    /// Timer expiry. Ignored unless the token still matches the round.
    async fn on_timer(&mut self, token: TimerToken) {
        let Some(game) = self.game.as_ref() else {
            return;
        };
        let current = game.turn_seq == token.turn_seq;
        let result = match token.kind {
            TimerKind::Turn if current && game.is_running() && game.current_turn == token.seat => {
                self.timeout_turn(token.seat).await.map(|_| ())
            }
            TimerKind::DeclareWindow if current && game.phase == GamePhase::Declaring => {
                info!("Table {}: declare window closed", self.id);
                self.finish_round().await;
                Ok(())
            }
            _ => {
                debug!("Table {}: ignoring stale timer {:?}", self.id, token);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("Table {}: timeout handling failed: {}", self.id, e);
        }
    }

    /// Admin trigger running the same path as a timer expiry.
    async fn advance(&mut self) -> TableResult<AdvanceOutcome> {
        let game = self.game.as_ref().ok_or(TableError::NoGame)?;
        match game.phase {
            GamePhase::Started => {
                let seat = game.current_turn;
                self.timeout_turn(seat).await
            }
            GamePhase::Declaring | GamePhase::AllButOnePacked | GamePhase::Settling => {
                self.finish_round().await;
                Ok(AdvanceOutcome::RoundFinalized)
            }
            _ => Ok(AdvanceOutcome::Idle),
        }
    }

    async fn timeout_turn(&mut self, seat: SeatIndex) -> TableResult<AdvanceOutcome> {
        let game = self.game.as_mut().ok_or(TableError::NoGame)?;
        let missed = game.note_timeout(seat);
        let outcome = timeout_outcome(
            game.rules.timeout_action,
            missed,
            game.rules.max_missed_turns,
        );
        info!(
            "Table {}: seat {} timed out ({} in a row), {:?}",
            self.id, seat, missed, outcome
        );
        match outcome {
            TimeoutOutcome::Discard => match game.auto_discard(seat) {
                Ok(card) => {
                    self.audit().await?;
                    self.after_turn_change().await;
                    Ok(AdvanceOutcome::AutoDiscarded { seat, card })
                }
                Err(GameError::StockExhausted) => {
                    self.finish_round().await;
                    Ok(AdvanceOutcome::RoundFinalized)
                }
                Err(e) => Err(e.into()),
            },
            TimeoutOutcome::Pack => {
                self.pack_seat(seat).await?;
                Ok(AdvanceOutcome::AutoPacked { seat })
            }
        }
    }

    async fn expire_graces(&mut self) {
        let now = Instant::now();
        let expired: Vec<UserId> = self
            .grace
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(user, _)| *user)
            .collect();
        for user_id in expired {
            self.grace.remove(&user_id);
            info!("Table {}: reconnection grace expired for user {}", self.id, user_id);
            if let Err(e) = self.handle_leave(user_id).await {
                debug!("Table {}: grace expiry for {}: {}", self.id, user_id, e);
            }
        }
    }

    /// Checks card conservation; a violation aborts the round.
    async fn audit(&mut self) -> TableResult<()> {
        let Some(game) = self.game.as_ref() else {
            return Ok(());
        };
        if let Err(e) = game.verify_conservation() {
            error!(
                "AUDIT table {} game {}: {}; aborting round and refunding holds",
                self.id, game.game_id, e
            );
            self.abort_game(e.to_string()).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Abandons the round and match, refunds every hold and resets the table.
    async fn abort_game(&mut self, reason: String) {
        if let Some(game) = self.game.as_mut() {
            game.close();
            let event = TableEvent::GameAborted {
                table_id: self.id,
                game_id: game.game_id,
                reason,
            };
            self.notify(event);
        }
        self.release_all_holds().await;
        self.reset_to_waiting();
        self.persist().await;
    }

    /// Settles a finished round, then resets the table or deals the next
    /// round of the match. A repeated call for the same round does nothing.
    async fn finish_round(&mut self) {
        let Some(game) = self.game.as_mut() else {
            return;
        };
        let end = match game.begin_settlement() {
            Some(end) => end,
            None if game.phase == GamePhase::Settling => match game.end {
                Some(end) => end,
                None => return,
            },
            None => return,
        };
        self.timer.cancel();
        let game_id = game.game_id;
        let point_value = game.rules.point_value;
        let deltas = compute_round_deltas(self.shape.format, &game.seat_outcomes(), &game.rules);
        self.persist().await;

        match self.finance.settle_round(game_id, &deltas).await {
            Ok(applied) => info!(
                "Table {}: game {} settled ({:?}, {} ledger entries, rake {})",
                self.id, game_id, end, applied, deltas.rake_amount
            ),
            Err(e) => error!("Table {}: settlement of game {} failed: {}", self.id, game_id, e),
        }
        if let Err(e) = self
            .finance
            .record_round_result(self.id, game_id, point_value, &deltas)
            .await
        {
            error!("Table {}: recording result of game {} failed: {}", self.id, game_id, e);
        }
        if let Some(game) = self.game.as_mut() {
            game.close();
        }
        self.observer.round_settled(self.id, game_id, &deltas);
        self.notify(TableEvent::RoundEnd {
            table_id: self.id,
            game_id,
            end,
            deltas: deltas.clone(),
        });

        let Some(state) = self.match_state.as_mut() else {
            self.release_all_holds().await;
            self.reset_to_waiting();
            self.persist().await;
            return;
        };
        state.apply_round(&deltas);
        if state.is_over() {
            self.finish_match().await;
            return;
        }
        let players = state.next_round_players();
        match self.deal_round(&players) {
            Ok(_) => self.persist().await,
            Err(e) => {
                error!("Table {}: failed to deal next round: {}", self.id, e);
                self.abort_game(e.to_string()).await;
            }
        }
    }

    /// Records the match outcome as pending, settles it and releases holds.
    async fn finish_match(&mut self) {
        let Some(state) = self.match_state.take() else {
            return;
        };
        let match_id = self.match_id.take().unwrap_or_else(Uuid::new_v4);
        let standings = state.standings();

        match state.winner() {
            Some(winner) => {
                let outcome = MatchOutcome {
                    match_id,
                    table_id: self.id,
                    format: self.shape.format,
                    winner,
                    standings: standings.clone(),
                    boot_amount: self.shape.boot_value,
                    rake_percent: self.config.rules.rake_percent,
                    status: MatchStatus::Pending,
                    created_at: Utc::now(),
                };
                match self.finance.record_match_outcome(&outcome).await {
                    Ok(_) => match self.finance.settle_match(match_id).await {
                        Ok(_) => {
                            self.observer
                                .match_settled(self.id, match_id, winner, outcome.prize())
                        }
                        Err(e) => error!(
                            "Table {}: settlement of match {} failed, left pending: {}",
                            self.id, match_id, e
                        ),
                    },
                    Err(e) => error!(
                        "Table {}: recording match {} failed: {}",
                        self.id, match_id, e
                    ),
                }
                self.notify(TableEvent::MatchEnd {
                    table_id: self.id,
                    match_id,
                    winner,
                    standings,
                    prize: outcome.prize(),
                });
            }
            None => error!("Table {}: match {} ended without a winner", self.id, match_id),
        }

        self.release_all_holds().await;
        self.reset_to_waiting();
        self.persist().await;
    }

    async fn release_all_holds(&self) {
        match self.finance.release_holds(self.id).await {
            Ok(released) => debug!("Table {}: released {} holds", self.id, released),
            Err(e) => error!("Table {}: releasing holds failed: {}", self.id, e),
        }
    }

    fn reset_to_waiting(&mut self) {
        self.timer.cancel();
        self.game = None;
        self.match_state = None;
        self.match_id = None;
        self.seats = vec![None; self.shape.no_of_players];
        self.grace.clear();
    }

    fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            table_id: self.id,
            shape: self.shape,
            seats: self.seats.clone(),
            game: self.game.clone(),
            match_id: self.match_id,
            match_state: self.match_state.clone(),
            processed_joins: self.processed_joins.iter().cloned().collect(),
            created_at: self.created_at,
            saved_at: Utc::now(),
        }
    }

    /// Saves a snapshot, or clears it once the table is an empty shell.
    /// Failures are logged and never block play.
    async fn persist(&self) {
        let result = if self.game.is_none() && self.seats.iter().all(Option::is_none) {
            self.snapshots.clear(self.id).await
        } else {
            self.snapshots.save(&self.snapshot()).await
        };
        if let Err(e) = result {
            warn!("Table {}: snapshot failed: {}", self.id, e);
        }
    }
}
