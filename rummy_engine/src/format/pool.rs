//! Pool format: players are knocked out once their total reaches the
//! threshold; the last player standing wins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{RoundDeltas, Standing};
use crate::game::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub threshold: u32,
    /// Seat-ordered running totals. Totals never decrease.
    pub cumulative: Vec<(UserId, u32)>,
    pub eliminated: BTreeSet<UserId>,
    /// Users knocked out by the latest round
    #[serde(default)]
    pub last_knocked_out: Vec<UserId>,
}

impl PoolState {
    pub fn new(players: &[UserId], threshold: u32) -> Self {
        Self {
            threshold,
            cumulative: players.iter().map(|user| (*user, 0)).collect(),
            eliminated: BTreeSet::new(),
            last_knocked_out: Vec::new(),
        }
    }

    /// Folds a round and returns the users eliminated by it.
    pub fn apply_round(&mut self, deltas: &RoundDeltas) -> Vec<UserId> {
        let mut knocked_out = Vec::new();
        for (user, total) in &mut self.cumulative {
            if self.eliminated.contains(user) {
                continue;
            }
            if let Some(points) = deltas.points_of(*user) {
                *total = total.saturating_add(points);
            }
            if *total >= self.threshold {
                self.eliminated.insert(*user);
                knocked_out.push(*user);
            }
        }
        self.last_knocked_out = knocked_out.clone();
        knocked_out
    }

    pub fn survivors(&self) -> Vec<UserId> {
        self.cumulative
            .iter()
            .map(|(user, _)| *user)
            .filter(|user| !self.eliminated.contains(user))
            .collect()
    }

    pub fn is_over(&self) -> bool {
        self.survivors().len() <= 1
    }

    /// The sole survivor. If the last round knocked out everyone left,
    /// the lowest total among those knocked out by it wins.
    pub fn winner(&self) -> Option<UserId> {
        if !self.is_over() {
            return None;
        }
        let survivors = self.survivors();
        if let [only] = survivors.as_slice() {
            return Some(*only);
        }
        self.cumulative
            .iter()
            .enumerate()
            .filter(|(_, (user, _))| self.last_knocked_out.contains(user))
            .min_by_key(|(seat, (_, total))| (*total, *seat))
            .map(|(_, (user, _))| *user)
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
                eliminated: self.eliminated.contains(user_id),
            })
            .collect()
    }
}
