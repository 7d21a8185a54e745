//! Structured logging configuration.
//!
//! The engine logs through the `log` facade; `init` installs a tracing
//! subscriber that also captures those records, so table and wallet logs
//! carry the same formatting and filtering as the server's own spans.

use rummy_engine::{
    game::{Money, UserId},
    table::SocketId,
    wallet::TableId,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Default directives when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize structured logging
///
/// Log levels come from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// Records emitted through the `log` crate are forwarded into tracing.
///
/// # Example
///
/// ```no_run
/// use rummy_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    // try_init also installs the log-to-tracing bridge
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global subscriber already installed");
        return;
    }

    tracing::info!("Structured logging initialized");
}

/// Log a settled round or match with structured fields
///
/// # Arguments
///
/// * `kind` - `"round"` or `"match"`
/// * `table_id` - Table that played it
/// * `reference` - Game id for rounds, match id for matches
/// * `winner` - Winning user, if any
/// * `amount` - Rake for rounds, prize for matches
pub fn log_settlement_event(
    kind: &str,
    table_id: TableId,
    reference: Uuid,
    winner: Option<UserId>,
    amount: Money,
) {
    tracing::info!(
        event_type = "settlement",
        kind = kind,
        table_id = table_id,
        reference = %reference,
        winner = winner,
        amount = amount,
        "SETTLEMENT: {} at table {}",
        kind,
        table_id
    );
}

/// Flag suspicious client behavior for later review
///
/// # Arguments
///
/// * `socket_id` - Offending socket
/// * `user_id` - Claimed user, when the event named one
/// * `reason` - What was flagged
pub fn log_audit_flag(socket_id: SocketId, user_id: Option<UserId>, reason: &str) {
    tracing::warn!(
        event_type = "audit",
        socket_id = %socket_id,
        user_id = user_id,
        "AUDIT: {}",
        reason
    );
}
