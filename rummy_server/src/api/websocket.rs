//! WebSocket handler carrying every game event.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws`
//! 2. `get-table` finds or creates a table of the wanted shape
//! 3. `join-table` (token checked) takes a seat and binds this socket to it
//! 4. Game events act on the bound seat; table broadcasts are pushed as
//!    they happen
//! 5. On disconnect the seat enters its reconnection grace; a `join-table`
//!    or `status` from a new socket within grace resumes it
//!
//! # Client Messages
//!
//! Every message is a JSON object with an `event` name and an optional
//! `request_id`, answered by exactly one ack:
//!
//! ```json
//! {"event": "join-table", "request_id": 7, "user_id": 42, "token": "eyJ...", "table_id": 1}
//! {"event": "ack", "request_id": 7, "ok": true, "data": {"table_id": 1, "seat": 0, ...}}
//! {"event": "ack", "request_id": 8, "ok": false, "code": 4090, "error": "CONFLICT", "message": "..."}
//! ```

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use rummy_engine::{
    ErrorCode, GameFormat, ServiceError,
    auth::AuthError,
    game::{Card, DrawSource, Groups, SeatIndex, UserId},
    security::{EventThrottle, ThrottleResult},
    table::{Session, SocketId, TableError, TableEvent, TableHandle},
    wallet::TableId,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::{logging, metrics};

/// Buffered table events per socket before the actor starts dropping them.
const EVENT_BUFFER: usize = 64;

/// Stake as sent by clients: `"100"` or `100`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BootValue {
    Label(String),
    Number(i64),
}

impl BootValue {
    fn label(&self) -> String {
        match self {
            BootValue::Label(label) => label.clone(),
            BootValue::Number(value) => value.to_string(),
        }
    }
}

/// Client events received via WebSocket
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    GetTable {
        boot_value: BootValue,
        no_of_players: usize,
        format: GameFormat,
    },
    JoinTable {
        user_id: UserId,
        token: String,
        table_id: TableId,
        #[serde(default)]
        idempotency_key: Option<String>,
    },
    /// Also resumes a seat after a reconnect
    Status {
        user_id: UserId,
        token: String,
        #[serde(default)]
        game_id: Option<Uuid>,
        /// Needed only when this socket is not bound yet
        #[serde(default)]
        table_id: Option<TableId>,
    },
    Draw {
        source: DrawSource,
    },
    Discard {
        card: Card,
    },
    PackGame,
    Declare {
        groups: Groups,
        finish_card: Card,
    },
    Arrange {
        groups: Groups,
    },
    LeaveTable,
}

/// Reply to one client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Always `"ack"`
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Ack {
    pub fn success(data: Value) -> Self {
        Self {
            event: "ack".to_string(),
            request_id: None,
            ok: true,
            code: None,
            error: None,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(err: ServiceError) -> Self {
        Self {
            event: "ack".to_string(),
            request_id: None,
            ok: false,
            code: Some(err.code.as_u16()),
            error: Some(err.code),
            message: Some(err.message),
            data: None,
        }
    }

    fn with_request_id(mut self, request_id: Option<Value>) -> Self {
        self.request_id = request_id;
        self
    }
}

fn table_error(err: TableError) -> ServiceError {
    ServiceError::from(&err)
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, ServiceError> {
    serde_json::to_value(value).map_err(|e| {
        warn!("Failed to serialize ack payload: {}", e);
        ServiceError::server("Internal server error")
    })
}

/// Upgrade HTTP connection to WebSocket.
///
/// No credentials are needed to connect; every event acting for a user
/// carries its own token.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel::<TableEvent>(EVENT_BUFFER);
    let mut connection = Connection::new(state, event_tx);

    metrics::websocket_connected();
    info!(socket_id = %connection.socket_id(), "WebSocket connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let ack = connection.handle_text(text.as_str()).await;
                    if send_json(&mut sender, &ack).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket error: {}", e);
                    break;
                }
            },
            Some(event) = event_rx.recv() => {
                connection.observe(&event).await;
                if send_json(&mut sender, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    let socket_id = connection.socket_id();
    connection.close().await;
    metrics::websocket_disconnected();
    info!(socket_id = %socket_id, "WebSocket disconnected");
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(payload) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize outgoing message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}

/// Per-socket event handling, independent of the socket transport.
pub struct Connection {
    socket_id: SocketId,
    state: AppState,
    throttle: EventThrottle,
    events: mpsc::Sender<TableEvent>,
}

impl Connection {
    pub fn new(state: AppState, events: mpsc::Sender<TableEvent>) -> Self {
        let throttle = EventThrottle::new(state.throttle.clone());
        Self {
            socket_id: Uuid::new_v4(),
            state,
            throttle,
            events,
        }
    }

    pub fn socket_id(&self) -> SocketId {
        self.socket_id
    }

    /// Handles one text frame and returns its ack.
    pub async fn handle_text(&mut self, text: &str) -> Ack {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => return self.fail(ServiceError::invalid("Malformed JSON"), None),
        };
        let request_id = value.get("request_id").cloned();
        let name = value
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        metrics::websocket_event_received(&name);

        if let ThrottleResult::Limited { retry_after } = self.throttle.check(&name) {
            metrics::rate_limit_hits_total(&name);
            let err = ServiceError::new(
                ErrorCode::RateLimited,
                format!("Too many {name} events, retry in {} ms", retry_after.as_millis()),
            );
            return self.fail(err, request_id);
        }

        let event = match serde_json::from_value::<ClientEvent>(value) {
            Ok(event) => event,
            Err(e) => {
                let err = ServiceError::invalid(format!("Invalid {name:?} event: {e}"));
                return self.fail(err, request_id);
            }
        };

        match self.dispatch(event).await {
            Ok(data) => Ack::success(data).with_request_id(request_id),
            Err(err) => self.fail(err, request_id),
        }
    }

    fn fail(&self, err: ServiceError, request_id: Option<Value>) -> Ack {
        metrics::ack_error(err.code);
        debug!(socket_id = %self.socket_id, code = %err.code, "Event rejected: {}", err.message);
        Ack::failure(err).with_request_id(request_id)
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<Value, ServiceError> {
        match event {
            ClientEvent::GetTable {
                boot_value,
                no_of_players,
                format,
            } => {
                let table_id = self
                    .state
                    .table_manager
                    .find_or_create_table(&boot_value.label(), no_of_players, format)
                    .await
                    .map_err(table_error)?;
                Ok(json!({ "table_id": table_id }))
            }

            ClientEvent::JoinTable {
                user_id,
                token,
                table_id,
                idempotency_key,
            } => {
                self.authenticate(&token, user_id)?;
                let ack = self
                    .state
                    .table_manager
                    .join_table(table_id, user_id, idempotency_key)
                    .await
                    .map_err(table_error)?;
                let handle = self.table(table_id).await?;
                self.bind(&handle, user_id, ack.seat, ack.game_id).await?;
                Ok(json!({
                    "table_id": table_id,
                    "seat": ack.seat,
                    "reconnected": ack.reconnected,
                    "game_id": ack.game_id,
                }))
            }

            ClientEvent::Status {
                user_id,
                token,
                game_id,
                table_id,
            } => {
                self.authenticate(&token, user_id)?;
                let bound = self
                    .state
                    .sessions
                    .get(self.socket_id)
                    .await
                    .filter(|s| s.user_id == user_id)
                    .map(|s| s.table_id);
                let table_id = bound.or(table_id).ok_or_else(|| {
                    ServiceError::not_found("No table for this user; send table_id")
                })?;
                let handle = self.table(table_id).await?;
                let status = handle.status(Some(user_id)).await.map_err(table_error)?;

                let running = status.game.as_ref().map(|g| g.game_id);
                if let Some(wanted) = game_id
                    && running != Some(wanted)
                {
                    return Err(ServiceError::not_found(format!(
                        "Game {wanted} is not running at table {table_id}"
                    )));
                }
                if bound.is_none()
                    && let Some(seat) = status.seat
                {
                    self.bind(&handle, user_id, seat, running).await?;
                    info!(socket_id = %self.socket_id, user_id, table_id, "Seat resumed");
                }
                to_data(&status)
            }

            ClientEvent::Draw { source } => {
                let (session, handle) = self.seated().await?;
                let drawn = handle
                    .draw(session.user_id, source)
                    .await
                    .map_err(table_error)?;
                to_data(&drawn)
            }

            ClientEvent::Discard { card } => {
                let (session, handle) = self.seated().await?;
                handle
                    .discard(session.user_id, card)
                    .await
                    .map_err(table_error)?;
                Ok(json!({ "discarded": card }))
            }

            ClientEvent::PackGame => {
                let (session, handle) = self.seated().await?;
                handle.pack(session.user_id).await.map_err(table_error)?;
                Ok(json!({ "packed": true }))
            }

            ClientEvent::Declare {
                groups,
                finish_card,
            } => {
                let (session, handle) = self.seated().await?;
                let outcome = handle
                    .declare(session.user_id, groups, finish_card)
                    .await
                    .map_err(table_error)?;
                to_data(&outcome)
            }

            ClientEvent::Arrange { groups } => {
                let (session, handle) = self.seated().await?;
                handle
                    .arrange(session.user_id, groups)
                    .await
                    .map_err(table_error)?;
                Ok(json!({ "arranged": true }))
            }

            ClientEvent::LeaveTable => {
                let (session, _) = self.seated().await?;
                let outcome = self
                    .state
                    .table_manager
                    .leave_table(session.table_id, session.user_id)
                    .await
                    .map_err(table_error)?;
                self.release().await;
                Ok(json!({ "table_id": session.table_id, "outcome": outcome }))
            }
        }
    }

    fn authenticate(&self, token: &str, user_id: UserId) -> Result<(), ServiceError> {
        match self.state.verifier.verify_user(token, user_id) {
            Ok(_) => Ok(()),
            Err(err) => {
                if let AuthError::UserMismatch { token_user, .. } = &err {
                    logging::log_audit_flag(
                        self.socket_id,
                        Some(user_id),
                        &format!("token issued to user {token_user}"),
                    );
                }
                Err(ServiceError::new(err.code(), err.client_message()))
            }
        }
    }

    async fn table(&self, table_id: TableId) -> Result<TableHandle, ServiceError> {
        self.state
            .table_manager
            .get_table(table_id)
            .await
            .map_err(table_error)
    }

    /// The session bound to this socket and its table.
    async fn seated(&self) -> Result<(Session, TableHandle), ServiceError> {
        let session = self
            .state
            .sessions
            .get(self.socket_id)
            .await
            .ok_or_else(|| ServiceError::new(ErrorCode::Unauthorized, "Join a table first"))?;
        let handle = self.table(session.table_id).await?;
        Ok((session, handle))
    }

    /// Binds this socket to a seat and subscribes it to the table's events.
    async fn bind(
        &self,
        handle: &TableHandle,
        user_id: UserId,
        seat: SeatIndex,
        game_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if let Some(previous) = self.state.sessions.get(self.socket_id).await
            && previous.table_id != handle.table_id()
        {
            self.release().await;
        }
        self.state
            .sessions
            .bind(self.socket_id, user_id, handle.table_id(), seat, game_id)
            .await;
        handle
            .subscribe(self.socket_id, user_id, self.events.clone())
            .await
            .map_err(table_error)
    }

    /// Drops this socket's binding and its table subscription.
    ///
    /// # Returns
    ///
    /// * `Option<(Session, bool)>` - The dropped session and whether the
    ///   user is still bound to that table through another socket
    async fn release(&self) -> Option<(Session, bool)> {
        let (session, still_bound) = self.state.sessions.unbind(self.socket_id).await?;
        if let Ok(handle) = self.state.table_manager.get_table(session.table_id).await {
            let _ = handle.unsubscribe(self.socket_id).await;
        }
        Some((session, still_bound))
    }

    /// Bookkeeping for a table event about to be pushed to this socket.
    pub async fn observe(&self, event: &TableEvent) {
        match event {
            TableEvent::StartGame {
                table_id, game_id, ..
            } => {
                self.state.sessions.set_game(*table_id, Some(*game_id)).await;
            }
            TableEvent::GameAborted { table_id, .. } => {
                self.state.sessions.set_game(*table_id, None).await;
            }
            TableEvent::RoundEnd { .. } | TableEvent::MatchEnd { .. } | TableEvent::Status { .. } => {}
        }
    }

    /// Ends the socket: the seat, if any, enters its reconnection grace.
    pub async fn close(self) {
        let Some((session, still_bound)) = self.release().await else {
            return;
        };
        if still_bound {
            return;
        }
        if let Ok(handle) = self.state.table_manager.get_table(session.table_id).await
            && let Err(e) = handle.disconnect(session.user_id).await
        {
            debug!("Disconnect of user {} not delivered: {}", session.user_id, e);
        }
    }
}
