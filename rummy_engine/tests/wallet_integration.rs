//! Wallet integration tests against the in-memory store.

use chrono::Utc;
use rummy_engine::format::{GameFormat, Standing};
use rummy_engine::wallet::{
    FinanceGateway, LedgerReason, MatchOutcome, MatchStatus, MemoryWalletStore, WalletError,
    WalletStore,
};
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

async fn setup() -> (FinanceGateway, Arc<MemoryWalletStore>) {
    let store = Arc::new(MemoryWalletStore::new());
    for user in 1..=4 {
        store.set_balance(user, 1_000).await;
    }
    (FinanceGateway::new(store.clone()), store)
}

fn pending_outcome(table_id: i64, winner: i64, players: &[i64]) -> MatchOutcome {
    MatchOutcome {
        match_id: Uuid::new_v4(),
        table_id,
        format: GameFormat::Pool,
        winner,
        standings: players
            .iter()
            .map(|user_id| Standing {
                user_id: *user_id,
                points: if *user_id == winner { 30 } else { 120 },
                eliminated: *user_id != winner,
            })
            .collect(),
        boot_amount: 50,
        rake_percent: 0,
        status: MatchStatus::Pending,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_ledger_tracks_every_balance_change() {
    let (gw, _) = setup().await;
    gw.place_hold(1, 10, 300).await.unwrap();
    gw.release_user_hold(10, 1).await.unwrap();
    gw.place_hold(1, 11, 200).await.unwrap();

    let ledger = gw.ledger(1).await.unwrap();
    let deltas: Vec<i64> = ledger.iter().map(|e| e.delta).collect();
    assert_eq!(deltas, vec![-300, 300, -200]);

    let mut balance = 1_000;
    for entry in &ledger {
        balance += entry.delta;
        assert_eq!(entry.balance_after, balance);
    }
    assert_eq!(gw.balance(1).await.unwrap(), 800);
}

#[tokio::test]
async fn test_hold_rejections() {
    let (gw, _) = setup().await;

    let err = gw.place_hold(1, 10, 1_001).await.unwrap_err();
    assert!(matches!(err, WalletError::InsufficientWallet { .. }));
    assert_eq!(gw.balance(1).await.unwrap(), 1_000);

    let err = gw.place_hold(99, 10, 1).await.unwrap_err();
    assert!(matches!(err, WalletError::WalletNotFound(99)));

    // One hold per user per table, but other tables are fine
    gw.place_hold(1, 10, 100).await.unwrap();
    assert!(matches!(
        gw.place_hold(1, 10, 100).await,
        Err(WalletError::HoldExists { .. })
    ));
    gw.place_hold(1, 11, 100).await.unwrap();
}

#[tokio::test]
async fn test_release_user_hold_leaves_other_seats() {
    let (gw, store) = setup().await;
    gw.place_hold(1, 10, 100).await.unwrap();
    gw.place_hold(2, 10, 100).await.unwrap();

    assert!(gw.release_user_hold(10, 1).await.unwrap());
    assert!(!gw.release_user_hold(10, 1).await.unwrap());

    let active = store.active_holds(10).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].user_id, 2);
}

#[tokio::test]
async fn test_apply_entry_is_unique_per_reference_and_reason() {
    let (_, store) = setup().await;
    assert!(
        store
            .apply_entry(1, 50, LedgerReason::RoundSettlement, "game-a")
            .await
            .unwrap()
    );
    assert!(
        !store
            .apply_entry(1, 50, LedgerReason::RoundSettlement, "game-a")
            .await
            .unwrap()
    );
    // Same reference, different reason is a different entry
    assert!(
        store
            .apply_entry(1, -20, LedgerReason::MatchSettlement, "game-a")
            .await
            .unwrap()
    );
    assert_eq!(store.get_wallet(1).await.unwrap().balance, 1_030);
}

#[tokio::test]
async fn test_recover_pending_matches_after_restart() {
    let (gw, store) = setup().await;
    let first = pending_outcome(1, 1, &[1, 2]);
    let second = pending_outcome(2, 3, &[3, 4]);
    gw.record_match_outcome(&first).await.unwrap();
    gw.record_match_outcome(&second).await.unwrap();

    // Simulates a crash after the second match was partly settled
    store
        .apply_entry(
            4,
            -50,
            LedgerReason::MatchSettlement,
            &second.match_id.to_string(),
        )
        .await
        .unwrap();

    let restarted = FinanceGateway::new(store.clone());
    assert_eq!(restarted.recover_pending_matches().await.unwrap(), 2);
    assert!(restarted.pending_match_outcomes().await.unwrap().is_empty());

    assert_eq!(restarted.balance(1).await.unwrap(), 1_050);
    assert_eq!(restarted.balance(2).await.unwrap(), 950);
    assert_eq!(restarted.balance(3).await.unwrap(), 1_050);
    assert_eq!(restarted.balance(4).await.unwrap(), 950);

    let stored = store.match_outcome(first.match_id).await.unwrap().unwrap();
    assert_eq!(stored.status, MatchStatus::Settled);
    assert_eq!(restarted.recover_pending_matches().await.unwrap(), 0);
}

#[tokio::test]
async fn test_settle_unknown_match() {
    let (gw, _) = setup().await;
    let missing = Uuid::new_v4();
    assert!(matches!(
        gw.settle_match(missing).await,
        Err(WalletError::MatchNotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn test_sweep_releases_only_old_orphaned_holds() {
    let (gw, store) = setup().await;
    let orphan = gw.place_hold(1, 10, 100).await.unwrap();
    let fresh = gw.place_hold(2, 11, 100).await.unwrap();
    let running = gw.place_hold(3, 12, 100).await.unwrap();
    let long_ago = Utc::now() - chrono::Duration::minutes(30);
    store.set_hold_created_at(orphan.id, long_ago).await;
    store.set_hold_created_at(running.id, long_ago).await;

    let cutoff = Utc::now() - chrono::Duration::minutes(10);
    let tables = HashSet::from([12]);
    assert_eq!(gw.sweep_stale_holds(cutoff, &tables).await.unwrap(), 1);
    assert_eq!(gw.sweep_stale_holds(cutoff, &tables).await.unwrap(), 0);

    let active: Vec<i64> = store
        .all_holds()
        .await
        .iter()
        .filter(|h| h.active)
        .map(|h| h.id)
        .collect();
    assert_eq!(active, vec![fresh.id, running.id]);
}
