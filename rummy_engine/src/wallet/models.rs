//! Wallet data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use crate::format::{GameFormat, Standing};
use crate::game::{Money, UserId};

/// Table ID type
pub type TableId = i64;

/// Wallet model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Money,
    pub updated_at: DateTime<Utc>,
}

/// Reservation of funds for a seat at a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletHold {
    pub id: i64,
    pub user_id: UserId,
    pub table_id: TableId,
    pub amount: Money,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    Hold,
    HoldRelease,
    RoundSettlement,
    MatchSettlement,
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerReason::Hold => write!(f, "hold"),
            LedgerReason::HoldRelease => write!(f, "hold_release"),
            LedgerReason::RoundSettlement => write!(f, "round_settlement"),
            LedgerReason::MatchSettlement => write!(f, "match_settlement"),
        }
    }
}

impl FromStr for LedgerReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hold" => Ok(LedgerReason::Hold),
            "hold_release" => Ok(LedgerReason::HoldRelease),
            "round_settlement" => Ok(LedgerReason::RoundSettlement),
            "match_settlement" => Ok(LedgerReason::MatchSettlement),
            other => Err(format!("unknown ledger reason {other:?}")),
        }
    }
}

/// Immutable ledger entry. Unique on (user, reference, reason).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    pub delta: Money,
    pub reason: LedgerReason,
    pub reference: String,
    pub balance_after: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoundResult {
    pub user_id: UserId,
    pub points: u32,
    pub delta: Money,
}

/// Result of one round, written once per game id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub table_id: TableId,
    pub game_id: Uuid,
    pub point_value: Money,
    pub winner: Option<UserId>,
    pub per_user: Vec<UserRoundResult>,
    pub rake_amount: Money,
    pub rake_percent: u8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Settled,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Pending => write!(f, "pending"),
            MatchStatus::Settled => write!(f, "settled"),
        }
    }
}

/// Concluded deals or pool match. Written as pending before any match-end
/// money moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub match_id: Uuid,
    pub table_id: TableId,
    pub format: GameFormat,
    pub winner: UserId,
    pub standings: Vec<Standing>,
    pub boot_amount: Money,
    pub rake_percent: u8,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

impl MatchOutcome {
    pub fn losers(&self) -> impl Iterator<Item = UserId> + '_ {
        self.standings
            .iter()
            .map(|s| s.user_id)
            .filter(move |user| *user != self.winner)
    }

    /// Prize paid to the winner: every loser's boot, minus rake.
    pub fn prize(&self) -> Money {
        let gross = self.boot_amount * self.losers().count() as Money;
        gross * Money::from(100 - self.rake_percent) / 100
    }
}
