//! Per-table turn timer.
//!
//! A table owns exactly one `TurnTimer`. Arming replaces whatever deadline
//! was armed before, so at most one deadline is live per table. Each armed
//! deadline carries a `TimerToken`; the table only acts on an expiry whose
//! token still names the seat on turn and the current turn sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::game::SeatIndex;

/// Whether deadlines are armed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    Enabled,
    /// Rounds only advance through explicit admin calls.
    Disabled,
}

/// What happens to the seat on turn when its deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    AutoDiscard,
    AutoPack,
}

impl std::fmt::Display for TimeoutAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutAction::AutoDiscard => write!(f, "auto_discard"),
            TimeoutAction::AutoPack => write!(f, "auto_pack"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Turn,
    DeclareWindow,
}

/// Identifies what an armed deadline was armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub seat: SeatIndex,
    pub turn_seq: u64,
}

/// Decision taken for a seat whose turn deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// Draw from stock if needed, then throw the cheapest card.
    Discard,
    Pack,
}

/// Chooses the timeout outcome for a seat.
///
/// # Arguments
///
/// * `action` - Configured timeout action
/// * `missed_turns` - Consecutive timeouts including this one
/// * `max_missed_turns` - Limit after which the seat is packed
pub fn timeout_outcome(action: TimeoutAction, missed_turns: u32, max_missed_turns: u32) -> TimeoutOutcome {
    match action {
        TimeoutAction::AutoPack => TimeoutOutcome::Pack,
        TimeoutAction::AutoDiscard if missed_turns >= max_missed_turns => TimeoutOutcome::Pack,
        TimeoutAction::AutoDiscard => TimeoutOutcome::Discard,
    }
}

#[derive(Debug)]
pub struct TurnTimer {
    mode: TimerMode,
    armed: Option<(TimerToken, Instant)>,
}

impl TurnTimer {
    pub fn new(mode: TimerMode) -> Self {
        Self { mode, armed: None }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    /// Arms a deadline `duration` from now, replacing any previous one.
    ///
    /// Returns the wall-clock deadline for clients, or `None` when timers
    /// are disabled.
    pub fn arm(&mut self, token: TimerToken, duration: Duration) -> Option<DateTime<Utc>> {
        if self.mode == TimerMode::Disabled {
            self.armed = None;
            return None;
        }
        self.armed = Some((token, Instant::now() + duration));
        let wall = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        Some(Utc::now() + wall)
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn armed_token(&self) -> Option<TimerToken> {
        self.armed.map(|(token, _)| token)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Resolves when the armed deadline passes and disarms the timer.
    /// Never resolves while nothing is armed.
    pub async fn wait(&mut self) -> TimerToken {
        match self.armed {
            Some((token, deadline)) => {
                tokio::time::sleep_until(deadline).await;
                self.armed = None;
                token
            }
            None => std::future::pending().await,
        }
    }
}
