//! Admin triggers for driving test tables.
//!
//! Both routes go through the table actor like any socket event: `advance`
//! runs the same code path as a timer expiry and `declare` the same
//! validation as a player's declare.

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::post,
};
use rummy_engine::{
    game::{Card, Groups, UserId},
    wallet::TableId,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{ApiError, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tables/{table_id}/advance", post(advance))
        .route("/tables/{table_id}/declare", post(declare))
}

#[derive(Debug, Deserialize)]
pub struct AdminDeclareRequest {
    pub user_id: UserId,
    pub groups: Groups,
    pub finish_card: Card,
}

/// Run the timer-expiry path for the seat on turn.
async fn advance(
    State(state): State<AppState>,
    Path(table_id): Path<TableId>,
) -> Result<Json<Value>, ApiError> {
    let handle = state.table_manager.get_table(table_id).await?;
    let outcome = handle.advance().await?;
    info!(table_id, ?outcome, "Admin advance");
    Ok(Json(json!({ "ok": true, "data": outcome })))
}

/// Declare on behalf of a user.
async fn declare(
    State(state): State<AppState>,
    Path(table_id): Path<TableId>,
    Json(request): Json<AdminDeclareRequest>,
) -> Result<Json<Value>, ApiError> {
    let handle = state.table_manager.get_table(table_id).await?;
    let outcome = handle
        .declare(request.user_id, request.groups, request.finish_card)
        .await?;
    info!(table_id, user_id = request.user_id, ?outcome, "Admin declare");
    Ok(Json(json!({ "ok": true, "data": outcome })))
}
