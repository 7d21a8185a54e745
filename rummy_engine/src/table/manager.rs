//! Table manager for matchmaking and the registry of running table actors.

use chrono::Utc;
use log::{info, warn};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::{Mutex, RwLock};

use super::{
    actor::{TableActor, TableHandle},
    config::{TableConfig, TableShape},
    errors::{TableError, TableResult},
    messages::{JoinAck, LeaveOutcome, TableMetadata},
    observer::{NoopSettlementObserver, SettlementObserver},
};
use crate::format::GameFormat;
use crate::game::UserId;
use crate::persistence::SnapshotStore;
use crate::wallet::{FinanceGateway, TableId, WalletResult};

/// Registry of table actors, passed by `Arc` into every handler.
pub struct TableManager {
    config: TableConfig,
    finance: FinanceGateway,
    snapshots: Arc<dyn SnapshotStore>,
    observer: Arc<dyn SettlementObserver>,

    /// Active table handles
    tables: Arc<RwLock<HashMap<TableId, TableHandle>>>,

    /// Next table ID
    next_table_id: Arc<RwLock<TableId>>,

    /// Serialises find-or-create so two requests never both spawn a table
    /// for the same shape
    matchmaking: Mutex<()>,
}

impl TableManager {
    /// Create a new table manager
    ///
    /// # Arguments
    ///
    /// * `config` - Rules and settings for every spawned table
    /// * `finance` - Finance gateway
    /// * `snapshots` - Snapshot store
    pub fn new(
        config: TableConfig,
        finance: FinanceGateway,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config,
            finance,
            snapshots,
            observer: Arc::new(NoopSettlementObserver),
            tables: Arc::new(RwLock::new(HashMap::new())),
            next_table_id: Arc::new(RwLock::new(1)),
            matchmaking: Mutex::new(()),
        }
    }

    /// Reports every settled round and match to `observer`. Applies to
    /// tables spawned or restored afterwards.
    pub fn with_observer(mut self, observer: Arc<dyn SettlementObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn finance(&self) -> &FinanceGateway {
        &self.finance
    }

    /// Respawns actors from saved snapshots.
    ///
    /// # Returns
    ///
    /// * `TableResult<usize>` - Number of tables restored
    pub async fn restore_tables(&self) -> TableResult<usize> {
        let snapshots = self.snapshots.load_all().await?;
        let mut max_id = 0;
        let mut restored = 0;

        for snapshot in snapshots {
            let table_id = snapshot.table_id;
            max_id = max_id.max(table_id);
            let (actor, handle) = TableActor::restore(
                snapshot,
                self.config.clone(),
                self.finance.clone(),
                self.snapshots.clone(),
                self.observer.clone(),
            );
            self.tables.write().await.insert(table_id, handle);
            tokio::spawn(actor.run());
            info!("Restored table {} from snapshot", table_id);
            restored += 1;
        }

        let mut next_id = self.next_table_id.write().await;
        *next_id = (*next_id).max(max_id + 1);
        Ok(restored)
    }

    /// Create and spawn a new table
    pub async fn create_table(&self, shape: TableShape) -> TableId {
        let table_id = {
            let mut next_id = self.next_table_id.write().await;
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (actor, handle) = TableActor::new(
            table_id,
            shape,
            self.config.clone(),
            self.finance.clone(),
            self.snapshots.clone(),
            self.observer.clone(),
        );
        self.tables.write().await.insert(table_id, handle);
        tokio::spawn(actor.run());

        info!("Created table {} ({})", table_id, shape);
        table_id
    }

    /// Finds a waiting table of the requested shape with a free seat, or
    /// spawns one.
    ///
    /// # Arguments
    ///
    /// * `boot_label` - Stake label sent by the client
    /// * `no_of_players` - Seats at the table
    /// * `format` - Scoring format
    ///
    /// # Errors
    ///
    /// * `TableError::InvalidBootValue` / `TableError::InvalidPlayerCount`
    pub async fn find_or_create_table(
        &self,
        boot_label: &str,
        no_of_players: usize,
        format: GameFormat,
    ) -> TableResult<TableId> {
        let shape = TableShape::parse(boot_label, no_of_players, format)?;
        let _guard = self.matchmaking.lock().await;

        let mut open: Vec<TableMetadata> = Vec::new();
        for handle in self.handles().await {
            match handle.metadata().await {
                Ok(meta) if meta.shape == shape && meta.is_open() => open.push(meta),
                Ok(_) => {}
                Err(e) => warn!("Table {} did not answer: {}", handle.table_id(), e),
            }
        }
        // Fill the fullest table first so waiting players start sooner
        if let Some(best) = open
            .iter()
            .max_by_key(|m| (m.seated, std::cmp::Reverse(m.id)))
        {
            return Ok(best.id);
        }
        Ok(self.create_table(shape).await)
    }

    /// Get a table handle
    pub async fn get_table(&self, table_id: TableId) -> TableResult<TableHandle> {
        self.tables
            .read()
            .await
            .get(&table_id)
            .cloned()
            .ok_or(TableError::TableNotFound(table_id))
    }

    async fn handles(&self) -> Vec<TableHandle> {
        let mut handles: Vec<TableHandle> = self.tables.read().await.values().cloned().collect();
        handles.sort_by_key(TableHandle::table_id);
        handles
    }

    /// Join a table
    ///
    /// # Arguments
    ///
    /// * `table_id` - Table ID
    /// * `user_id` - User ID
    /// * `idempotency_key` - Client key; a repeated key is rejected
    pub async fn join_table(
        &self,
        table_id: TableId,
        user_id: UserId,
        idempotency_key: Option<String>,
    ) -> TableResult<JoinAck> {
        self.get_table(table_id)
            .await?
            .join(user_id, idempotency_key)
            .await
    }

    /// Leave a table
    pub async fn leave_table(&self, table_id: TableId, user_id: UserId) -> TableResult<LeaveOutcome> {
        self.get_table(table_id).await?.leave(user_id).await
    }

    /// Metadata of every table that answers
    pub async fn list_tables(&self) -> Vec<TableMetadata> {
        let mut tables = Vec::new();
        for handle in self.handles().await {
            if let Ok(meta) = handle.metadata().await {
                tables.push(meta);
            }
        }
        tables
    }

    /// Ids of tables whose actor is still running
    pub async fn running_tables(&self) -> HashSet<TableId> {
        self.tables
            .read()
            .await
            .iter()
            .filter(|(_, handle)| !handle.is_closed())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Get active table count
    pub async fn active_table_count(&self) -> usize {
        self.running_tables().await.len()
    }

    /// Releases holds older than `max_age` at tables that are no longer
    /// running.
    pub async fn sweep_stale_holds(&self, max_age: chrono::Duration) -> WalletResult<usize> {
        let running = self.running_tables().await;
        self.finance
            .sweep_stale_holds(Utc::now() - max_age, &running)
            .await
    }

    /// Stops one table after saving its snapshot
    pub async fn close_table(&self, table_id: TableId) -> TableResult<()> {
        let handle = self.get_table(table_id).await?;
        handle.shutdown().await?;
        self.tables.write().await.remove(&table_id);
        info!("Closed table {}", table_id);
        Ok(())
    }

    /// Stops every table; used on graceful shutdown.
    pub async fn shutdown_all(&self) {
        for handle in self.handles().await {
            if let Err(e) = handle.shutdown().await {
                warn!("Table {} shutdown failed: {}", handle.table_id(), e);
            }
        }
        self.tables.write().await.clear();
    }
}
