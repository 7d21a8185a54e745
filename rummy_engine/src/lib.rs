//! # Rummy Engine
//!
//! Authoritative session engine for 13-card rummy with three scoring
//! formats: points, deals and pool.
//!
//! Every table runs as its own Tokio task. Socket events become typed
//! commands on the table's inbox, so all mutations of one table happen in
//! receipt order while tables interleave freely on the runtime.
//!
//! ## Round lifecycle
//!
//! - **Waiting**: seats fill; every join places a reserve hold
//! - **Started**: draw and discard in turn under a per-turn deadline
//! - **Declaring / AllButOnePacked**: a valid declare or the last seat
//!   standing ends the round
//! - **Settling**: format rules compute deltas; the finance gateway
//!   settles them exactly once and releases holds
//! - **Closed**: the table resets to waiting or deals the next round of
//!   its match
//!
//! ## Core Modules
//!
//! - [`game`]: Cards, melds and the turn state machine
//! - [`format`]: Points, deals and pool scoring
//! - [`wallet`]: Reserve holds, settlement and the ledger
//! - [`table`]: Matchmaking, table actors and socket sessions
//! - [`timer`]: Turn deadlines and timeout actions
//!
//! ## Example
//!
//! ```
//! use rummy_engine::format::RulesConfig;
//! use rummy_engine::game::{DrawSource, GameSession};
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut game = GameSession::new(1, &[10, 20], RulesConfig::for_tests()).unwrap();
//! game.deal_initial_hands(Some(5), &mut StdRng::seed_from_u64(7)).unwrap();
//! let drawn = game.draw(0, DrawSource::Stock).unwrap();
//! game.discard(0, drawn.card).unwrap();
//! assert_eq!(game.current_turn, 1);
//! ```

/// Token verification for socket events.
pub mod auth;

/// Postgres connection management and store implementations.
pub mod db;

/// Client-facing error codes.
pub mod errors;

/// Scoring formats and rule configuration.
pub mod format;

/// Cards, melds and the round state machine.
pub mod game;

/// Best-effort table snapshots.
pub mod persistence;

/// Per-socket throttling.
pub mod security;

/// Matchmaking, table actors and sessions.
pub mod table;

/// Turn deadlines.
pub mod timer;

/// Holds, settlement and the ledger.
pub mod wallet;

pub use errors::{ErrorCode, ServiceError};
pub use format::{GameFormat, RulesConfig};
pub use game::{Card, GameSession, Suit};
pub use table::{TableManager, TableShape};
pub use wallet::FinanceGateway;
