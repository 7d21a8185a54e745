//! Prometheus metrics for monitoring server health.
//!
//! Counters are recorded whether or not an exporter is installed; without
//! one the `metrics` macros are no-ops.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use rummy_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//! metrics::websocket_connected();
//! ```

use rummy_engine::{
    ErrorCode,
    format::RoundDeltas,
    game::{Money, UserId},
    table::SettlementObserver,
    wallet::TableId,
};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::logging;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

pub fn websocket_connected() {
    metrics::counter!("websocket_connections_total").increment(1);
    metrics::gauge!("websocket_connections_active").increment(1.0);
}

pub fn websocket_disconnected() {
    metrics::gauge!("websocket_connections_active").decrement(1.0);
}

/// Increment received events, labelled by event name.
pub fn websocket_event_received(event: &str) {
    metrics::counter!("websocket_events_received",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Increment failed acks, labelled by error code.
pub fn ack_error(code: ErrorCode) {
    metrics::counter!("ack_errors_total",
        "code" => code.to_string()
    )
    .increment(1);
}

/// Increment events dropped by the socket throttle.
pub fn rate_limit_hits_total(event: &str) {
    metrics::counter!("rate_limit_hits_total",
        "event" => event.to_string()
    )
    .increment(1);
}

// ============================================================================
// Game Metrics
// ============================================================================

pub fn active_tables(count: usize) {
    metrics::gauge!("active_tables").set(count as f64);
}

pub fn rounds_settled_total() {
    metrics::counter!("rounds_settled_total").increment(1);
}

pub fn matches_settled_total() {
    metrics::counter!("matches_settled_total").increment(1);
}

/// Counts and logs settlements as table actors report them, so every
/// round is recorded once whether or not its players are connected.
#[derive(Debug, Default, Clone, Copy)]
pub struct SettlementRecorder;

impl SettlementObserver for SettlementRecorder {
    fn round_settled(&self, table_id: TableId, game_id: Uuid, deltas: &RoundDeltas) {
        rounds_settled_total();
        logging::log_settlement_event("round", table_id, game_id, deltas.winner, deltas.rake_amount);
    }

    fn match_settled(&self, table_id: TableId, match_id: Uuid, winner: UserId, prize: Money) {
        matches_settled_total();
        logging::log_settlement_event("match", table_id, match_id, Some(winner), prize);
    }
}

/// Holds released by the stale-hold sweep.
pub fn stale_holds_released(count: usize) {
    metrics::counter!("stale_holds_released_total").increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_handles_rounds_without_winner() {
        let recorder = SettlementRecorder;
        let deltas = RoundDeltas {
            per_user: Vec::new(),
            winner: None,
            rake_percent: 0,
            rake_amount: 0,
        };
        recorder.round_settled(1, Uuid::new_v4(), &deltas);
        recorder.match_settled(1, Uuid::new_v4(), 7, 200);
    }
}
