//! Matchmaking and table lifecycle.
//!
//! This module implements:
//! - TableActor: one Tokio task per table, consuming an mpsc inbox so every
//!   command for a table runs in receipt order
//! - TableManager: registry that finds or spawns tables by shape
//! - SessionRegistry: socket to seat bindings
//! - SettlementObserver: hook for every settled round and match
//!
//! ## Example
//!
//! ```no_run
//! use rummy_engine::format::GameFormat;
//! use rummy_engine::persistence::NoopSnapshotStore;
//! use rummy_engine::table::{TableConfig, TableManager};
//! use rummy_engine::wallet::{FinanceGateway, MemoryWalletStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let finance = FinanceGateway::new(Arc::new(MemoryWalletStore::new()));
//! let manager = TableManager::new(TableConfig::default(), finance, Arc::new(NoopSnapshotStore));
//!
//! let table_id = manager.find_or_create_table("100", 2, GameFormat::Points).await?;
//! let ack = manager.join_table(table_id, 42, Some("join-1".into())).await?;
//! println!("seated at {}", ack.seat);
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod errors;
pub mod manager;
pub mod messages;
pub mod observer;
pub mod sessions;

pub use actor::{TableActor, TableHandle};
pub use config::{DEFAULT_RECONNECT_GRACE, TableConfig, TableShape};
pub use errors::{TableError, TableResult};
pub use manager::TableManager;
pub use messages::{
    AdvanceOutcome, JoinAck, LeaveOutcome, TableEvent, TableMessage, TableMetadata, TableState,
    TableStatus,
};
pub use observer::{NoopSettlementObserver, SettlementObserver};
pub use sessions::{Session, SessionRegistry, SocketId};
