//! Deals format: a fixed number of rounds, lowest total wins.

use serde::{Deserialize, Serialize};

use super::{RoundDeltas, Standing};
use crate::game::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealsState {
    pub remaining: u32,
    /// Seat-ordered running totals.
    pub cumulative: Vec<(UserId, u32)>,
}

impl DealsState {
    pub fn new(players: &[UserId], deals_count: u32) -> Self {
        Self {
            remaining: deals_count,
            cumulative: players.iter().map(|user| (*user, 0)).collect(),
        }
    }

    /// Folds a completed round. A no-result round still uses up a deal.
    pub fn apply_round(&mut self, deltas: &RoundDeltas) {
        self.remaining = self.remaining.saturating_sub(1);
        for (user, total) in &mut self.cumulative {
            if let Some(points) = deltas.points_of(*user) {
                *total += points;
            }
        }
    }

    pub fn is_over(&self) -> bool {
        self.remaining == 0
    }

    /// Lowest cumulative total once the deals are used up; ties go to the
    /// earliest seat.
    pub fn winner(&self) -> Option<UserId> {
        if !self.is_over() {
            return None;
        }
        self.cumulative
            .iter()
            .enumerate()
            .min_by_key(|(seat, (_, total))| (*total, *seat))
            .map(|(_, (user, _))| *user)
    }

    pub fn players(&self) -> Vec<UserId> {
        self.cumulative.iter().map(|(user, _)| *user).collect()
    }

    pub fn total_of(&self, user_id: UserId) -> Option<u32> {
        self.cumulative
            .iter()
            .find(|(user, _)| *user == user_id)
            .map(|(_, total)| *total)
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.cumulative
            .iter()
            .map(|(user_id, points)| Standing {
                user_id: *user_id,
                points: *points,
                eliminated: false,
            })
            .collect()
    }
}
