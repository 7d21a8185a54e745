//! Settlement hook called by table actors.

use uuid::Uuid;

use crate::format::RoundDeltas;
use crate::game::{Money, UserId};
use crate::wallet::TableId;

/// Receives every settled round and match, whether or not any player is
/// connected.
pub trait SettlementObserver: Send + Sync {
    /// Called once per round after its deltas are settled, including
    /// rounds that ended without a winner.
    fn round_settled(&self, table_id: TableId, game_id: Uuid, deltas: &RoundDeltas);

    /// Called once per deals or pool match after its prize is settled.
    fn match_settled(&self, table_id: TableId, match_id: Uuid, winner: UserId, prize: Money);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSettlementObserver;

impl SettlementObserver for NoopSettlementObserver {
    fn round_settled(&self, _table_id: TableId, _game_id: Uuid, _deltas: &RoundDeltas) {}

    fn match_settled(&self, _table_id: TableId, _match_id: Uuid, _winner: UserId, _prize: Money) {}
}
