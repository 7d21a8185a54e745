//! Wallet module: reserve holds, idempotent settlement and an append-only
//! ledger.
//!
//! This module implements:
//! - Reserve-hold computation per table format
//! - Hold placement and release with one ledger entry per mutation
//! - Round settlement idempotent on (user, reference, reason)
//! - Durable match outcomes written before match-end money moves
//! - Stale-hold sweep for holds left behind by vanished tables
//!
//! ## Example
//!
//! ```
//! use rummy_engine::wallet::{FinanceGateway, MemoryWalletStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryWalletStore::new());
//!     store.set_balance(1, 5_000).await;
//!     let gateway = FinanceGateway::new(store);
//!
//!     let hold = gateway.place_hold(1, 101, 800).await?;
//!     assert_eq!(gateway.balance(1).await?, 4_200);
//!     assert_eq!(hold.amount, 800);
//!
//!     gateway.release_holds(101).await?;
//!     assert_eq!(gateway.balance(1).await?, 5_000);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod store;

pub use errors::{WalletError, WalletResult};
pub use manager::FinanceGateway;
pub use models::{
    LedgerReason, MatchOutcome, MatchStatus, RoundResult, TableId, UserRoundResult, Wallet,
    WalletHold, WalletLedgerEntry,
};
pub use store::{MemoryWalletStore, WalletStore};
