//! Best-effort table snapshots.
//!
//! A table saves a snapshot after every state change and clears it once a
//! round or match is fully settled. On startup the table manager respawns
//! actors from whatever snapshots survive. Failures here are logged by the
//! caller and never block play.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::format::MatchState;
use crate::game::{GameSession, UserId};
use crate::table::TableShape;
use crate::wallet::TableId;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Everything needed to respawn a table actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub table_id: TableId,
    pub shape: TableShape,
    pub seats: Vec<Option<UserId>>,
    pub game: Option<GameSession>,
    pub match_id: Option<Uuid>,
    pub match_state: Option<MatchState>,
    /// Join idempotency keys already accepted
    #[serde(default)]
    pub processed_joins: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &TableSnapshot) -> PersistenceResult<()>;

    async fn load_all(&self) -> PersistenceResult<Vec<TableSnapshot>>;

    async fn clear(&self, table_id: TableId) -> PersistenceResult<()>;
}

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSnapshotStore;

#[async_trait]
impl SnapshotStore for NoopSnapshotStore {
    async fn save(&self, _snapshot: &TableSnapshot) -> PersistenceResult<()> {
        Ok(())
    }

    async fn load_all(&self) -> PersistenceResult<Vec<TableSnapshot>> {
        Ok(Vec::new())
    }

    async fn clear(&self, _table_id: TableId) -> PersistenceResult<()> {
        Ok(())
    }
}

/// Keeps snapshots as JSON in memory, which also exercises the serde path.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<BTreeMap<TableId, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.lock().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &TableSnapshot) -> PersistenceResult<()> {
        let json = serde_json::to_string(snapshot)?;
        self.snapshots.lock().await.insert(snapshot.table_id, json);
        Ok(())
    }

    async fn load_all(&self) -> PersistenceResult<Vec<TableSnapshot>> {
        let snapshots = self.snapshots.lock().await;
        snapshots
            .values()
            .map(|json| serde_json::from_str(json).map_err(PersistenceError::from))
            .collect()
    }

    async fn clear(&self, table_id: TableId) -> PersistenceResult<()> {
        self.snapshots.lock().await.remove(&table_id);
        Ok(())
    }
}
