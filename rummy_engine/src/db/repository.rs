//! PostgreSQL implementations of the wallet and snapshot stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::format::{GameFormat, Standing};
use crate::game::{Money, UserId};
use crate::persistence::{PersistenceResult, SnapshotStore, TableSnapshot};
use crate::wallet::{
    LedgerReason, MatchOutcome, MatchStatus, RoundResult, TableId, UserRoundResult, Wallet,
    WalletError, WalletHold, WalletLedgerEntry, WalletResult, WalletStore,
};

/// Wallet store on PostgreSQL. Each operation runs in one transaction and
/// locks the wallet row before touching the balance.
#[derive(Clone)]
pub struct PgWalletStore {
    pool: PgPool,
}

impl PgWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the wallet if missing and sets its balance.
    pub async fn upsert_wallet(&self, user_id: UserId, balance: Money) -> WalletResult<()> {
        sqlx::query(
            "INSERT INTO wallets (user_id, balance) VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET balance = EXCLUDED.balance, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn lock_balance(tx: &mut Transaction<'_, Postgres>, user_id: UserId) -> WalletResult<Money> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(WalletError::WalletNotFound(user_id))?;
        Ok(row.get("balance"))
    }

    async fn set_balance(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
        balance: Money,
    ) -> WalletResult<()> {
        sqlx::query("UPDATE wallets SET balance = $1, updated_at = NOW() WHERE user_id = $2")
            .bind(balance)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Inserts a ledger entry unless (user, reference, reason) exists.
    async fn insert_entry(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
        delta: Money,
        reason: LedgerReason,
        reference: &str,
        balance_after: Money,
    ) -> WalletResult<bool> {
        let row = sqlx::query(
            "INSERT INTO wallet_ledger (user_id, delta, reason, reference, balance_after)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id, reference, reason) DO NOTHING
             RETURNING id",
        )
        .bind(user_id)
        .bind(delta)
        .bind(reason.to_string())
        .bind(reference)
        .bind(balance_after)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.is_some())
    }
}

fn hold_from_row(row: &PgRow) -> WalletHold {
    WalletHold {
        id: row.get("id"),
        user_id: row.get("user_id"),
        table_id: row.get("table_id"),
        amount: row.get("amount"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    }
}

fn match_from_row(row: &PgRow) -> WalletResult<MatchOutcome> {
    let format: String = row.get("format");
    let status: String = row.get("status");
    let Json(standings): Json<Vec<Standing>> = row.get("standings");
    Ok(MatchOutcome {
        match_id: row.get("match_id"),
        table_id: row.get("table_id"),
        format: format
            .parse::<GameFormat>()
            .map_err(WalletError::Storage)?,
        winner: row.get("winner"),
        standings,
        boot_amount: row.get("boot_amount"),
        rake_percent: row.get::<i16, _>("rake_percent").clamp(0, 100) as u8,
        status: if status == "settled" {
            MatchStatus::Settled
        } else {
            MatchStatus::Pending
        },
        created_at: row.get("created_at"),
    })
}

const HOLD_COLUMNS: &str = "id, user_id, table_id, amount, active, created_at";
const MATCH_COLUMNS: &str =
    "match_id, table_id, format, winner, standings, boot_amount, rake_percent, status, created_at";

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        let row = sqlx::query("SELECT user_id, balance, updated_at FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WalletError::WalletNotFound(user_id))?;
        Ok(Wallet {
            user_id: row.get("user_id"),
            balance: row.get("balance"),
            updated_at: row.get("updated_at"),
        })
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
        let mut tx = self.pool.begin().await?;
        let available = Self::lock_balance(&mut tx, user_id).await?;

        let existing = sqlx::query(
            "SELECT id FROM wallet_holds WHERE user_id = $1 AND table_id = $2 AND active",
        )
        .bind(user_id)
        .bind(table_id)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(WalletError::HoldExists { user_id, table_id });
        }
        if available < amount {
            return Err(WalletError::InsufficientWallet {
                available,
                required: amount,
            });
        }

        let row = sqlx::query(&format!(
            "INSERT INTO wallet_holds (user_id, table_id, amount) VALUES ($1, $2, $3)
             RETURNING {HOLD_COLUMNS}"
        ))
        .bind(user_id)
        .bind(table_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;
        let hold = hold_from_row(&row);

        let balance_after = available - amount;
        Self::set_balance(&mut tx, user_id, balance_after).await?;
        Self::insert_entry(
            &mut tx,
            user_id,
            -amount,
            LedgerReason::Hold,
            &format!("hold:{}", hold.id),
            balance_after,
        )
        .await?;
        tx.commit().await?;
        Ok(hold)
    }

    async fn release_hold(&self, hold_id: i64) -> WalletResult<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = sqlx::query(
            "UPDATE wallet_holds SET active = FALSE, released_at = NOW()
             WHERE id = $1 AND active
             RETURNING user_id, amount",
        )
        .bind(hold_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(false);
        };
        let user_id: UserId = row.get("user_id");
        let amount: Money = row.get("amount");

        let balance_after = Self::lock_balance(&mut tx, user_id).await? + amount;
        if !Self::insert_entry(
            &mut tx,
            user_id,
            amount,
            LedgerReason::HoldRelease,
            &format!("hold:{hold_id}"),
            balance_after,
        )
        .await?
        {
            return Ok(false);
        }
        Self::set_balance(&mut tx, user_id, balance_after).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn active_holds(&self, table_id: TableId) -> WalletResult<Vec<WalletHold>> {
        let rows = sqlx::query(&format!(
            "SELECT {HOLD_COLUMNS} FROM wallet_holds WHERE table_id = $1 AND active ORDER BY id"
        ))
        .bind(table_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(hold_from_row).collect())
    }

    async fn holds_older_than(&self, cutoff: DateTime<Utc>) -> WalletResult<Vec<WalletHold>> {
        let rows = sqlx::query(&format!(
            "SELECT {HOLD_COLUMNS} FROM wallet_holds WHERE active AND created_at < $1 ORDER BY id"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(hold_from_row).collect())
    }

    async fn apply_entry(
        &self,
        user_id: UserId,
        delta: Money,
        reason: LedgerReason,
        reference: &str,
    ) -> WalletResult<bool> {
        let mut tx = self.pool.begin().await?;
        let balance_after = Self::lock_balance(&mut tx, user_id).await? + delta;
        if !Self::insert_entry(&mut tx, user_id, delta, reason, reference, balance_after).await? {
            return Ok(false);
        }
        Self::set_balance(&mut tx, user_id, balance_after).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn ledger(&self, user_id: UserId) -> WalletResult<Vec<WalletLedgerEntry>> {
        let rows = sqlx::query(
            "SELECT id, user_id, delta, reason, reference, balance_after, created_at
             FROM wallet_ledger WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let reason: String = row.get("reason");
                Ok(WalletLedgerEntry {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    delta: row.get("delta"),
                    reason: reason.parse().map_err(WalletError::Storage)?,
                    reference: row.get("reference"),
                    balance_after: row.get("balance_after"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn record_round_result(&self, result: &RoundResult) -> WalletResult<bool> {
        let row = sqlx::query(
            "INSERT INTO round_results
                (game_id, table_id, point_value, winner, per_user, rake_amount, rake_percent, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (game_id) DO NOTHING
             RETURNING game_id",
        )
        .bind(result.game_id)
        .bind(result.table_id)
        .bind(result.point_value)
        .bind(result.winner)
        .bind(Json(&result.per_user))
        .bind(result.rake_amount)
        .bind(i16::from(result.rake_percent))
        .bind(result.created_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn round_result(&self, game_id: Uuid) -> WalletResult<Option<RoundResult>> {
        let row = sqlx::query(
            "SELECT game_id, table_id, point_value, winner, per_user, rake_amount, rake_percent, created_at
             FROM round_results WHERE game_id = $1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| {
            let Json(per_user): Json<Vec<UserRoundResult>> = row.get("per_user");
            RoundResult {
                table_id: row.get("table_id"),
                game_id: row.get("game_id"),
                point_value: row.get("point_value"),
                winner: row.get("winner"),
                per_user,
                rake_amount: row.get("rake_amount"),
                rake_percent: row.get::<i16, _>("rake_percent").clamp(0, 100) as u8,
                created_at: row.get("created_at"),
            }
        }))
    }

    async fn record_match_outcome(&self, outcome: &MatchOutcome) -> WalletResult<bool> {
        let row = sqlx::query(
            "INSERT INTO match_outcomes
                (match_id, table_id, format, winner, standings, boot_amount, rake_percent, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (match_id) DO NOTHING
             RETURNING match_id",
        )
        .bind(outcome.match_id)
        .bind(outcome.table_id)
        .bind(outcome.format.to_string())
        .bind(outcome.winner)
        .bind(Json(&outcome.standings))
        .bind(outcome.boot_amount)
        .bind(i16::from(outcome.rake_percent))
        .bind(outcome.status.to_string())
        .bind(outcome.created_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn match_outcome(&self, match_id: Uuid) -> WalletResult<Option<MatchOutcome>> {
        let row = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_outcomes WHERE match_id = $1"
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn mark_match_settled(&self, match_id: Uuid) -> WalletResult<()> {
        let result = sqlx::query(
            "UPDATE match_outcomes SET status = 'settled', settled_at = NOW() WHERE match_id = $1",
        )
        .bind(match_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(WalletError::MatchNotFound(match_id));
        }
        Ok(())
    }

    async fn pending_match_outcomes(&self) -> WalletResult<Vec<MatchOutcome>> {
        let rows = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_outcomes WHERE status = 'pending' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(match_from_row).collect()
    }
}

/// Table snapshots stored as JSONB, one row per table.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn save(&self, snapshot: &TableSnapshot) -> PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO table_snapshots (table_id, snapshot, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (table_id) DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = NOW()",
        )
        .bind(snapshot.table_id)
        .bind(Json(snapshot))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_all(&self) -> PersistenceResult<Vec<TableSnapshot>> {
        let rows = sqlx::query("SELECT snapshot FROM table_snapshots ORDER BY table_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<Json<TableSnapshot>, _>("snapshot").0)
            .collect())
    }

    async fn clear(&self, table_id: TableId) -> PersistenceResult<()> {
        sqlx::query("DELETE FROM table_snapshots WHERE table_id = $1")
            .bind(table_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
