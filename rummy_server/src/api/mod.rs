//! HTTP/WebSocket API for the rummy server.
//!
//! # Endpoints Overview
//!
//! - `GET /ws` - WebSocket carrying every game event; each event is
//!   authenticated by the token it carries
//! - `GET /health` - Server health status
//! - `POST /api/v1/admin/tables/{id}/advance` - Run the timer-expiry path now
//! - `POST /api/v1/admin/tables/{id}/declare` - Declare on behalf of a user
//!
//! The admin routes are only mounted when `ADMIN_ENDPOINTS=true`. They
//! exist so test tables with disabled timers can be driven forward.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use rummy_engine::auth::JwtVerifier;
//! use rummy_engine::persistence::NoopSnapshotStore;
//! use rummy_engine::security::ThrottleConfig;
//! use rummy_engine::table::{SessionRegistry, TableConfig, TableManager};
//! use rummy_engine::wallet::{FinanceGateway, MemoryWalletStore};
//! use rummy_server::api::{AppState, create_router};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let finance = FinanceGateway::new(Arc::new(MemoryWalletStore::new()));
//! let state = AppState {
//!     table_manager: Arc::new(TableManager::new(
//!         TableConfig::default(),
//!         finance,
//!         Arc::new(NoopSnapshotStore),
//!     )),
//!     sessions: Arc::new(SessionRegistry::new()),
//!     verifier: Arc::new(JwtVerifier::new("secret-shared-with-the-auth-service")),
//!     throttle: ThrottleConfig::default(),
//!     database: None,
//!     admin_enabled: false,
//! };
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use rummy_engine::{
    ErrorCode, ServiceError,
    auth::TokenVerifier,
    db::Database,
    security::ThrottleConfig,
    table::{SessionRegistry, TableError, TableManager},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub table_manager: Arc<TableManager>,
    /// Socket to seat bindings
    pub sessions: Arc<SessionRegistry>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Throttle settings applied to each new socket
    pub throttle: ThrottleConfig,
    /// Present when wallets live in Postgres; checked by `/health`
    pub database: Option<Database>,
    pub admin_enabled: bool,
}

/// Create the API router.
///
/// ```text
/// GET  /health                               - Health check
/// GET  /ws                                   - WebSocket
/// POST /api/v1/admin/tables/{id}/advance     - Admin only
/// POST /api/v1/admin/tables/{id}/declare     - Admin only
/// ```
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::websocket_handler));

    if state.admin_enabled {
        router = router.nest("/api/v1/admin", admin::router());
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// HTTP status matching an error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::InsufficientWallet => StatusCode::PAYMENT_REQUIRED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error body shared by the HTTP routes: same fields as a failed ack.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ServiceError { code, message } = self.0;
        let body = json!({
            "ok": false,
            "code": code.as_u16(),
            "error": code,
            "message": message,
        });
        (status_for(code), Json(body)).into_response()
    }
}

impl From<TableError> for ApiError {
    fn from(err: TableError) -> Self {
        ApiError(ServiceError::from(&err))
    }
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` if the database (when configured) answers, or
/// `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:6969/health
/// # {"status":"healthy","database":null,"tables":{"active_count":3},...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.database {
        Some(db) => Some(db.health_check().await.is_ok()),
        None => None,
    };
    let healthy = database.unwrap_or(true);

    let table_count = state.table_manager.active_table_count().await;
    crate::metrics::active_tables(table_count);

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "tables": {
            "active_count": table_count
        },
        "sessions": state.sessions.len().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
