//! Finance gateway: reserve holds, round and match settlement.

use chrono::{DateTime, Utc};
use log::{info, warn};
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

use super::{
    errors::{WalletError, WalletResult},
    models::{
        LedgerReason, MatchOutcome, MatchStatus, RoundResult, TableId, UserRoundResult,
        WalletHold, WalletLedgerEntry,
    },
    store::WalletStore,
};
use crate::format::{GameFormat, RoundDeltas, RulesConfig};
use crate::game::{Money, UserId};
use crate::table::TableShape;

/// Money movements driven by table events
#[derive(Clone)]
pub struct FinanceGateway {
    store: Arc<dyn WalletStore>,
}

impl FinanceGateway {
    /// Create a new finance gateway
    ///
    /// # Arguments
    ///
    /// * `store` - Wallet storage backend
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    /// Amount reserved from a player's wallet when taking a seat.
    ///
    /// * points - `max(boot, max_points * point_value)`
    /// * deals - `boot`
    /// * pool - `boot + max(0, max_points * point_value)`
    pub fn compute_reserve_hold(shape: &TableShape, rules: &RulesConfig) -> Money {
        let max_loss = rules.max_round_loss();
        match shape.format {
            GameFormat::Points => shape.boot_value.max(max_loss),
            GameFormat::Deals => shape.boot_value,
            GameFormat::Pool => shape.boot_value + max_loss.max(0),
        }
    }

    /// Reserves `amount` for a seat.
    ///
    /// # Errors
    ///
    /// * `WalletError::InsufficientWallet` - Balance below `amount`
    /// * `WalletError::HoldExists` - The user already holds funds at the table
    pub async fn place_hold(
        &self,
        user_id: UserId,
        table_id: TableId,
        amount: Money,
    ) -> WalletResult<WalletHold> {
        let hold = self.store.place_hold(user_id, table_id, amount).await?;
        info!(
            "Placed hold {} of {} for user {} at table {}",
            hold.id, amount, user_id, table_id
        );
        Ok(hold)
    }

    /// Applies every non-zero delta of a round exactly once.
    ///
    /// # Returns
    ///
    /// * `WalletResult<usize>` - Number of entries newly applied; a repeated
    ///   call for the same game returns 0
    pub async fn settle_round(&self, game_id: Uuid, deltas: &RoundDeltas) -> WalletResult<usize> {
        let reference = game_id.to_string();
        let mut applied = 0;
        for entry in deltas.per_user.iter().filter(|d| d.delta != 0) {
            if self
                .store
                .apply_entry(
                    entry.user_id,
                    entry.delta,
                    LedgerReason::RoundSettlement,
                    &reference,
                )
                .await?
            {
                applied += 1;
            }
        }
        if applied > 0 {
            info!("Settled game {game_id}: {applied} ledger entries");
        }
        Ok(applied)
    }

    /// Releases every active hold at a table. Safe to repeat.
    pub async fn release_holds(&self, table_id: TableId) -> WalletResult<usize> {
        let mut released = 0;
        for hold in self.store.active_holds(table_id).await? {
            if self.store.release_hold(hold.id).await? {
                released += 1;
            }
        }
        Ok(released)
    }

    /// Releases the hold of one user leaving a waiting table.
    pub async fn release_user_hold(&self, table_id: TableId, user_id: UserId) -> WalletResult<bool> {
        let mut released = false;
        for hold in self.store.active_holds(table_id).await? {
            if hold.user_id == user_id {
                released |= self.store.release_hold(hold.id).await?;
            }
        }
        Ok(released)
    }

    /// Stores the round result once per game id.
    pub async fn record_round_result(
        &self,
        table_id: TableId,
        game_id: Uuid,
        point_value: Money,
        deltas: &RoundDeltas,
    ) -> WalletResult<bool> {
        let result = RoundResult {
            table_id,
            game_id,
            point_value,
            winner: deltas.winner,
            per_user: deltas
                .per_user
                .iter()
                .map(|d| UserRoundResult {
                    user_id: d.user_id,
                    points: d.points,
                    delta: d.delta,
                })
                .collect(),
            rake_amount: deltas.rake_amount,
            rake_percent: deltas.rake_percent,
            created_at: Utc::now(),
        };
        self.store.record_round_result(&result).await
    }

    /// Durably records a concluded match as pending settlement.
    pub async fn record_match_outcome(&self, outcome: &MatchOutcome) -> WalletResult<bool> {
        let created = self.store.record_match_outcome(outcome).await?;
        if created {
            info!(
                "Recorded {} match {} at table {}: winner {}",
                outcome.format, outcome.match_id, outcome.table_id, outcome.winner
            );
        }
        Ok(created)
    }

    /// Moves the boot of every loser to the winner, minus rake, then marks
    /// the outcome settled. Idempotent per match id.
    ///
    /// # Returns
    ///
    /// * `WalletResult<usize>` - Number of entries newly applied
    pub async fn settle_match(&self, match_id: Uuid) -> WalletResult<usize> {
        let outcome = self
            .store
            .match_outcome(match_id)
            .await?
            .ok_or(WalletError::MatchNotFound(match_id))?;
        if outcome.status == MatchStatus::Settled {
            return Ok(0);
        }

        let reference = match_id.to_string();
        let mut applied = 0;
        for loser in outcome.losers() {
            if self
                .store
                .apply_entry(
                    loser,
                    -outcome.boot_amount,
                    LedgerReason::MatchSettlement,
                    &reference,
                )
                .await?
            {
                applied += 1;
            }
        }
        let prize = outcome.prize();
        if prize != 0
            && self
                .store
                .apply_entry(
                    outcome.winner,
                    prize,
                    LedgerReason::MatchSettlement,
                    &reference,
                )
                .await?
        {
            applied += 1;
        }
        self.store.mark_match_settled(match_id).await?;
        info!("Settled match {match_id}: {applied} ledger entries, prize {prize}");
        Ok(applied)
    }

    /// Outcomes recorded but never settled, for recovery at startup
    pub async fn pending_match_outcomes(&self) -> WalletResult<Vec<MatchOutcome>> {
        self.store.pending_match_outcomes().await
    }

    /// Settles every pending match outcome. Failures are logged and skipped.
    pub async fn recover_pending_matches(&self) -> WalletResult<usize> {
        let mut settled = 0;
        for outcome in self.pending_match_outcomes().await? {
            match self.settle_match(outcome.match_id).await {
                Ok(_) => settled += 1,
                Err(e) => warn!("Failed to settle pending match {}: {}", outcome.match_id, e),
            }
        }
        Ok(settled)
    }

    /// Releases active holds older than `older_than` whose table is not in
    /// `running_tables`.
    pub async fn sweep_stale_holds(
        &self,
        older_than: DateTime<Utc>,
        running_tables: &HashSet<TableId>,
    ) -> WalletResult<usize> {
        let mut released = 0;
        for hold in self.store.holds_older_than(older_than).await? {
            if running_tables.contains(&hold.table_id) {
                continue;
            }
            if self.store.release_hold(hold.id).await? {
                warn!(
                    "Released stale hold {} for user {} at table {}",
                    hold.id, hold.user_id, hold.table_id
                );
                released += 1;
            }
        }
        Ok(released)
    }

    pub async fn balance(&self, user_id: UserId) -> WalletResult<Money> {
        Ok(self.store.get_wallet(user_id).await?.balance)
    }

    pub async fn ledger(&self, user_id: UserId) -> WalletResult<Vec<WalletLedgerEntry>> {
        self.store.ledger(user_id).await
    }
}
