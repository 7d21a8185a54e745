//! Table shape and per-table configuration.

use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use super::errors::{TableError, TableResult};
use crate::format::{GameFormat, RulesConfig, RulesError};
use crate::game::{
    Money,
    constants::{MAX_PLAYERS, MIN_PLAYERS},
};

/// Default time a disconnected seat is kept before it is vacated or packed.
pub const DEFAULT_RECONNECT_GRACE: Duration = Duration::from_secs(30);

/// What matchmaking groups tables by: stake, seat count and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableShape {
    /// Stake in minor currency units
    pub boot_value: Money,
    pub no_of_players: usize,
    pub format: GameFormat,
}

impl TableShape {
    /// Parses a matchmaking request.
    ///
    /// # Arguments
    ///
    /// * `boot_label` - Stake as sent by the client, e.g. `"100"`
    /// * `no_of_players` - Seats at the table (2-6)
    /// * `format` - Scoring format
    ///
    /// # Errors
    ///
    /// * `TableError::InvalidBootValue` - Label is not a positive integer
    /// * `TableError::InvalidPlayerCount` - Seat count outside 2-6
    pub fn parse(boot_label: &str, no_of_players: usize, format: GameFormat) -> TableResult<Self> {
        let boot_value = boot_label
            .trim()
            .parse::<Money>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| TableError::InvalidBootValue(boot_label.to_string()))?;
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&no_of_players) {
            return Err(TableError::InvalidPlayerCount(no_of_players));
        }
        Ok(Self {
            boot_value,
            no_of_players,
            format,
        })
    }
}

impl fmt::Display for TableShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} boot {} x{}",
            self.format, self.boot_value, self.no_of_players
        )
    }
}

/// Settings shared by every table spawned by one manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub rules: RulesConfig,

    /// How long a disconnected seat survives before it is vacated or packed
    pub reconnect_grace: Duration,

    /// Capacity of each actor's inbox
    pub inbox_capacity: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            rules: RulesConfig::default(),
            reconnect_grace: DEFAULT_RECONNECT_GRACE,
            inbox_capacity: 100,
        }
    }
}

impl TableConfig {
    /// Configuration for test tables: timers disabled.
    pub fn for_tests() -> Self {
        Self {
            rules: RulesConfig::for_tests(),
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.reconnect_grace.is_zero() {
            return Err(RulesError::Zero("reconnect_grace"));
        }
        if self.inbox_capacity == 0 {
            return Err(RulesError::Zero("inbox_capacity"));
        }
        self.rules.validate()
    }
}
