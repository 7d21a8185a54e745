//! Wallet storage abstraction and the in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    errors::{WalletError, WalletResult},
    models::{
        LedgerReason, MatchOutcome, MatchStatus, RoundResult, TableId, Wallet, WalletHold,
        WalletLedgerEntry,
    },
};
use crate::game::{Money, UserId};

/// Storage operations behind the finance gateway.
///
/// Every method is atomic: a hold, its ledger entry and the balance change
/// are written together or not at all.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Get wallet for user
    async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet>;

    /// Create the hold, write a `hold` entry and debit the wallet.
    ///
    /// Fails with `InsufficientWallet` when the balance is short and with
    /// `HoldExists` when the user already has an active hold at the table.
    async fn place_hold(
        &self,
        user_id: UserId,
        table_id: TableId,
        amount: Money,
    ) -> WalletResult<WalletHold>;

    /// Deactivates one hold and credits it back with a `hold_release` entry.
    /// Returns false when the hold was already inactive.
    async fn release_hold(&self, hold_id: i64) -> WalletResult<bool>;

    /// Active holds at a table
    async fn active_holds(&self, table_id: TableId) -> WalletResult<Vec<WalletHold>>;

    /// Active holds created before `cutoff`
    async fn holds_older_than(&self, cutoff: DateTime<Utc>) -> WalletResult<Vec<WalletHold>>;

    /// Applies `delta` to the wallet with a ledger entry.
    /// Returns false if an entry for (user, reference, reason) already exists.
    async fn apply_entry(
        &self,
        user_id: UserId,
        delta: Money,
        reason: LedgerReason,
        reference: &str,
    ) -> WalletResult<bool>;

    /// Ledger entries of a user, oldest first
    async fn ledger(&self, user_id: UserId) -> WalletResult<Vec<WalletLedgerEntry>>;

    /// Write-once by game id. Returns false if already recorded.
    async fn record_round_result(&self, result: &RoundResult) -> WalletResult<bool>;

    async fn round_result(&self, game_id: Uuid) -> WalletResult<Option<RoundResult>>;

    /// Write-once by match id. Returns false if already recorded.
    async fn record_match_outcome(&self, outcome: &MatchOutcome) -> WalletResult<bool>;

    async fn match_outcome(&self, match_id: Uuid) -> WalletResult<Option<MatchOutcome>>;

    async fn mark_match_settled(&self, match_id: Uuid) -> WalletResult<()>;

    async fn pending_match_outcomes(&self) -> WalletResult<Vec<MatchOutcome>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    wallets: HashMap<UserId, Wallet>,
    holds: Vec<WalletHold>,
    ledger: Vec<WalletLedgerEntry>,
    rounds: HashMap<Uuid, RoundResult>,
    matches: HashMap<Uuid, MatchOutcome>,
}

impl MemoryState {
    fn append(
        &mut self,
        user_id: UserId,
        delta: Money,
        reason: LedgerReason,
        reference: String,
    ) -> WalletResult<Money> {
        let wallet = self
            .wallets
            .get_mut(&user_id)
            .ok_or(WalletError::WalletNotFound(user_id))?;
        wallet.balance += delta;
        wallet.updated_at = Utc::now();
        let balance_after = wallet.balance;
        let id = self.ledger.len() as i64 + 1;
        self.ledger.push(WalletLedgerEntry {
            id,
            user_id,
            delta,
            reason,
            reference,
            balance_after,
            created_at: Utc::now(),
        });
        Ok(balance_after)
    }

    fn has_entry(&self, user_id: UserId, reason: LedgerReason, reference: &str) -> bool {
        self.ledger
            .iter()
            .any(|e| e.user_id == user_id && e.reason == reason && e.reference == reference)
    }
}

/// Process-local wallet store used by tests and database-less deployments.
#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    state: Mutex<MemoryState>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or tops up a wallet to exactly `balance`.
    pub async fn set_balance(&self, user_id: UserId, balance: Money) {
        let mut state = self.state.lock().await;
        state.wallets.insert(
            user_id,
            Wallet {
                user_id,
                balance,
                updated_at: Utc::now(),
            },
        );
    }

    /// All holds ever placed, active or not
    pub async fn all_holds(&self) -> Vec<WalletHold> {
        self.state.lock().await.holds.clone()
    }

    /// Backdates a hold; used to exercise the stale-hold sweep.
    pub async fn set_hold_created_at(&self, hold_id: i64, created_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(hold) = state.holds.iter_mut().find(|h| h.id == hold_id) {
            hold.created_at = created_at;
        }
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        self.state
            .lock()
            .await
            .wallets
            .get(&user_id)
            .cloned()
            .ok_or(WalletError::WalletNotFound(user_id))
    }

    async fn place_hold(
        &self,
        user_id: UserId,
        table_id: TableId,
        amount: Money,
    ) -> WalletResult<WalletHold> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        let mut state = self.state.lock().await;
        let available = state
            .wallets
            .get(&user_id)
            .map(|w| w.balance)
            .ok_or(WalletError::WalletNotFound(user_id))?;
        if state
            .holds
            .iter()
            .any(|h| h.active && h.user_id == user_id && h.table_id == table_id)
        {
            return Err(WalletError::HoldExists { user_id, table_id });
        }
        if available < amount {
            return Err(WalletError::InsufficientWallet {
                available,
                required: amount,
            });
        }

        let hold = WalletHold {
            id: state.holds.len() as i64 + 1,
            user_id,
            table_id,
            amount,
            active: true,
            created_at: Utc::now(),
        };
        state.append(user_id, -amount, LedgerReason::Hold, format!("hold:{}", hold.id))?;
        state.holds.push(hold.clone());
        Ok(hold)
    }

    async fn release_hold(&self, hold_id: i64) -> WalletResult<bool> {
        let mut state = self.state.lock().await;
        let Some(hold) = state.holds.iter_mut().find(|h| h.id == hold_id && h.active) else {
            return Ok(false);
        };
        hold.active = false;
        let (user_id, amount) = (hold.user_id, hold.amount);
        state.append(
            user_id,
            amount,
            LedgerReason::HoldRelease,
            format!("hold:{hold_id}"),
        )?;
        Ok(true)
    }

    async fn active_holds(&self, table_id: TableId) -> WalletResult<Vec<WalletHold>> {
        Ok(self
            .state
            .lock()
            .await
            .holds
            .iter()
            .filter(|h| h.active && h.table_id == table_id)
            .cloned()
            .collect())
    }

    async fn holds_older_than(&self, cutoff: DateTime<Utc>) -> WalletResult<Vec<WalletHold>> {
        Ok(self
            .state
            .lock()
            .await
            .holds
            .iter()
            .filter(|h| h.active && h.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn apply_entry(
        &self,
        user_id: UserId,
        delta: Money,
        reason: LedgerReason,
        reference: &str,
    ) -> WalletResult<bool> {
        let mut state = self.state.lock().await;
        if state.has_entry(user_id, reason, reference) {
            return Ok(false);
        }
        state.append(user_id, delta, reason, reference.to_string())?;
        Ok(true)
    }

    async fn ledger(&self, user_id: UserId) -> WalletResult<Vec<WalletLedgerEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn record_round_result(&self, result: &RoundResult) -> WalletResult<bool> {
        let mut state = self.state.lock().await;
        if state.rounds.contains_key(&result.game_id) {
            return Ok(false);
        }
        state.rounds.insert(result.game_id, result.clone());
        Ok(true)
    }

    async fn round_result(&self, game_id: Uuid) -> WalletResult<Option<RoundResult>> {
        Ok(self.state.lock().await.rounds.get(&game_id).cloned())
    }

    async fn record_match_outcome(&self, outcome: &MatchOutcome) -> WalletResult<bool> {
        let mut state = self.state.lock().await;
        if state.matches.contains_key(&outcome.match_id) {
            return Ok(false);
        }
        state.matches.insert(outcome.match_id, outcome.clone());
        Ok(true)
    }

    async fn match_outcome(&self, match_id: Uuid) -> WalletResult<Option<MatchOutcome>> {
        Ok(self.state.lock().await.matches.get(&match_id).cloned())
    }

    async fn mark_match_settled(&self, match_id: Uuid) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        let outcome = state
            .matches
            .get_mut(&match_id)
            .ok_or(WalletError::MatchNotFound(match_id))?;
        outcome.status = MatchStatus::Settled;
        Ok(())
    }

    async fn pending_match_outcomes(&self) -> WalletResult<Vec<MatchOutcome>> {
        Ok(self
            .state
            .lock()
            .await
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Pending)
            .cloned()
            .collect())
    }
}
