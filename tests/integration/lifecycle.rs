//! Parlay lifecycle and economy rules, driven through the gateway and engine.

use chrono::Duration;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use selfparlay::types::{
    Account, CapWindow, LedgerReason, LegOutcome, Outcome, ParlayError, ParlayStatus, Snapshot,
};

use crate::harness::{at, legs, Harness};

#[tokio::test]
async fn test_stake_debit_is_atomic_with_parlay() {
    let h = Harness::new();
    let now = at(14, 9, 0);
    let parlay = assert_ok!(
        h.engine
            .create("alice", 60, &legs(&["gym", "read"]), at(14, 23, 0), now)
            .await
    );

    let snap = h.engine.ledger().snapshot().await;
    assert!(snap.parlays.contains_key(&parlay.id));
    assert_eq!(snap.users["alice"].balance, 1000 - 60);
    assert_eq!(snap.users["alice"].daily_used, 60);
    assert_eq!(snap.users["alice"].weekly_used, 60);

    // With the store down, neither the stake nor the parlay appear.
    h.store.set_failing(true);
    let err = assert_err!(
        h.engine
            .create("alice", 30, &legs(&["walk"]), at(14, 23, 0), now)
            .await
    );
    assert!(matches!(err, ParlayError::IoFailure(_)));

    let after = h.engine.ledger().snapshot().await;
    assert_eq!(*after, *snap);

    h.store.set_failing(false);
    assert_ok!(
        h.engine
            .create("alice", 30, &legs(&["walk"]), at(14, 23, 0), now)
            .await
    );
    assert_eq!(h.account("alice").await.balance, 1000 - 90);
}

#[tokio::test]
async fn test_three_leg_win_pays_180_and_clears_cooldown() {
    let h = Harness::new();
    let three = assert_ok!(
        h.engine
            .create("alice", 100, &legs(&["a", "b", "c"]), at(14, 23, 0), at(14, 9, 0))
            .await
    );
    let single = assert_ok!(
        h.engine
            .create("alice", 20, &legs(&["d"]), at(14, 23, 0), at(14, 9, 5))
            .await
    );

    assert_ok!(h.engine.mark_leg(&single.id, 0, LegOutcome::Failed, at(14, 10, 0)).await);
    assert!(h.account("alice").await.cooldown_until.is_some());

    for i in 0..3 {
        assert_ok!(
            h.engine
                .mark_leg(&three.id, i, LegOutcome::Completed, at(14, 11, 0))
                .await
        );
    }

    let won = h.engine.get(&three.id).await.unwrap();
    assert_eq!(won.status, ParlayStatus::Won);
    assert_eq!(won.payout(), 180);

    let account = h.account("alice").await;
    assert_eq!(account.balance, 1000 - 120 + 180);
    assert_eq!(account.streak, 1);
    assert_eq!(account.cooldown_until, None);
    assert_eq!(account.recent_results[0].outcome, Outcome::Won);
    assert_eq!(account.recent_results[0].payout, 180);
    assert_eq!(account.recent_results[1].outcome, Outcome::Lost);
}

#[tokio::test]
async fn test_failed_leg_loses_and_freezes_parlay() {
    let h = Harness::new();
    let parlay = assert_ok!(
        h.engine
            .create("alice", 40, &legs(&["a", "b", "c"]), at(14, 23, 0), at(14, 9, 0))
            .await
    );
    assert_ok!(h.engine.mark_leg(&parlay.id, 0, LegOutcome::Completed, at(14, 10, 0)).await);
    let lost = assert_ok!(h.engine.mark_leg(&parlay.id, 2, LegOutcome::Failed, at(14, 10, 5)).await);
    assert_eq!(lost.status, ParlayStatus::Lost);

    for (index, outcome) in [(1, LegOutcome::Completed), (1, LegOutcome::Failed)] {
        let err = assert_err!(h.engine.mark_leg(&parlay.id, index, outcome, at(14, 10, 6)).await);
        assert!(matches!(err, ParlayError::NotActive { status: ParlayStatus::Lost, .. }));
    }
    let err = assert_err!(h.engine.resolve_now(&parlay.id, at(14, 10, 6)).await);
    assert!(matches!(err, ParlayError::NotActive { .. }));
}

#[tokio::test]
async fn test_bet_example_with_failed_first_leg() {
    let h = Harness::new();
    let parlay = assert_ok!(
        h.gateway
            .bet_command("alice", 50, "(a)(b)", "10/14/2025 11:59 PM", at(14, 9, 0))
            .await
    );
    assert_eq!(h.account("alice").await.balance, 950);

    let now = at(14, 13, 0);
    let lost = assert_ok!(
        h.gateway
            .select_leg_action("alice", &parlay.id, 0, LegOutcome::Failed, now)
            .await
    );
    assert_eq!(lost.status, ParlayStatus::Lost);

    let account = h.account("alice").await;
    assert_eq!(account.balance, 950);
    assert_eq!(account.streak, 0);
    assert_eq!(account.cooldown_until, Some(now + Duration::minutes(60)));

    let snap = h.engine.ledger().snapshot().await;
    let last = snap.ledger.last().unwrap();
    assert_eq!(last.reason, LedgerReason::Loss);
    assert_eq!(last.delta, 0);
}

#[tokio::test]
async fn test_concurrent_sweeps_settle_exactly_once() {
    let h = Harness::new();
    let parlay = assert_ok!(
        h.engine
            .create("alice", 30, &legs(&["a", "b"]), at(14, 12, 0), at(14, 9, 0))
            .await
    );
    assert_ok!(h.engine.mark_leg(&parlay.id, 0, LegOutcome::Completed, at(14, 10, 0)).await);

    let now = at(14, 12, 5);
    let sweeps: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move { engine.resolve_due(now).await })
        })
        .collect();
    let mut resolved = 0;
    for sweep in futures::future::join_all(sweeps).await {
        resolved += sweep.unwrap().resolved.len();
    }
    assert_eq!(resolved, 1);

    let snap = h.engine.ledger().snapshot().await;
    assert_eq!(snap.parlays[&parlay.id].status, ParlayStatus::Lost);
    let settlements = snap
        .ledger
        .iter()
        .filter(|e| e.parlay_id.as_deref() == Some(parlay.id.as_str()) && e.reason != LedgerReason::Stake)
        .count();
    assert_eq!(settlements, 1);
    assert_eq!(snap.users["alice"].balance, 970);
    assert_eq!(snap.users["alice"].recent_results.len(), 1);
}

#[tokio::test]
async fn test_manual_resolve_and_sweep_race() {
    let h = Harness::new();
    let parlay = assert_ok!(
        h.engine
            .create("alice", 30, &legs(&["a"]), at(14, 12, 0), at(14, 9, 0))
            .await
    );

    let now = at(14, 12, 5);
    let engine = Arc::clone(&h.engine);
    let id = parlay.id.clone();
    let manual = tokio::spawn(async move { engine.resolve_now(&id, now).await });
    let sweep = h.engine.resolve_due(now).await;
    let manual = manual.await.unwrap();

    let winners = sweep.resolved.len() + usize::from(manual.is_ok());
    assert_eq!(winners, 1);
    if let Err(e) = manual {
        assert!(matches!(e, ParlayError::NotActive { .. }));
    }
    assert_eq!(h.account("alice").await.recent_results.len(), 1);
}

#[tokio::test]
async fn test_daily_cap_rejects_without_mutation() {
    let h = Harness::new();
    let now = at(14, 9, 0);
    assert_ok!(h.engine.create("alice", 140, &legs(&["a"]), at(14, 23, 0), now).await);
    let before = h.engine.ledger().snapshot().await;
    let saves = h.store.saves();

    let err = assert_err!(h.engine.create("alice", 20, &legs(&["b"]), at(14, 23, 0), now).await);
    assert_eq!(
        err,
        ParlayError::CapExceeded {
            window: CapWindow::Daily,
            used: 140,
            cap: 150,
            requested: 20,
        }
    );
    assert_eq!(*h.engine.ledger().snapshot().await, *before);
    assert_eq!(h.store.saves(), saves);

    // quote agrees with create
    assert!(h.engine.quote("alice", 20, &now).await.is_err());
    assert_ok!(h.engine.quote("alice", 10, &now).await);
}

#[tokio::test]
async fn test_daily_window_rolls_at_local_midnight() {
    let h = Harness::new();
    assert_ok!(h.engine.create("alice", 150, &legs(&["a"]), at(31, 0, 0), at(14, 22, 0)).await);
    assert_err!(h.engine.create("alice", 1, &legs(&["b"]), at(31, 0, 0), at(14, 23, 59)).await);

    assert_ok!(h.engine.create("alice", 150, &legs(&["c"]), at(31, 0, 0), at(15, 0, 0)).await);
    let account = h.account("alice").await;
    assert_eq!(account.daily_used, 150);
    assert_eq!(account.weekly_used, 300);
}

#[tokio::test]
async fn test_weekly_cap_and_monday_reset() {
    let h = Harness::new();
    let deadline = at(31, 12, 0);

    // 2025-10-13 is a Monday.
    for day in 13..=17 {
        assert_ok!(h.engine.create("alice", 150, &legs(&["x"]), deadline, at(day, 9, 0)).await);
    }
    assert_ok!(h.engine.create("alice", 50, &legs(&["x"]), deadline, at(18, 9, 0)).await);

    let err = assert_err!(h.engine.create("alice", 1, &legs(&["x"]), deadline, at(19, 9, 0)).await);
    assert!(matches!(err, ParlayError::CapExceeded { window: CapWindow::Weekly, used: 800, .. }));

    assert_ok!(h.engine.create("alice", 100, &legs(&["x"]), deadline, at(20, 0, 1)).await);
    let account = h.account("alice").await;
    assert_eq!(account.weekly_used, 100);
    assert_eq!(account.balance, 1000 - 900);
}

#[tokio::test]
async fn test_cooldown_blocks_any_new_parlay() {
    let h = Harness::new();
    let parlay = assert_ok!(
        h.engine
            .create("alice", 10, &legs(&["a"]), at(14, 23, 0), at(14, 9, 0))
            .await
    );
    assert_ok!(h.engine.mark_leg(&parlay.id, 0, LegOutcome::Failed, at(14, 9, 30)).await);

    let err = assert_err!(h.engine.create("alice", 1, &legs(&["b"]), at(14, 23, 0), at(14, 10, 29)).await);
    assert!(matches!(err, ParlayError::OnCooldown { .. }));

    assert_ok!(h.engine.create("alice", 1, &legs(&["b"]), at(14, 23, 0), at(14, 10, 30)).await);
}

#[tokio::test]
async fn test_insufficient_balance() {
    let mut snap = Snapshot::default();
    snap.users
        .insert("bob".to_string(), Account::new(30, at(14, 0, 0), at(13, 0, 0)));
    let h = Harness::with_snapshot(snap);

    let err = assert_err!(h.engine.create("bob", 40, &legs(&["a"]), at(14, 23, 0), at(14, 9, 0)).await);
    assert_eq!(err, ParlayError::InsufficientBalance { needed: 40, available: 30 });
    assert_eq!(h.account("bob").await.balance, 30);
}

#[tokio::test]
async fn test_ledger_sums_to_balance() {
    let h = Harness::new();
    let a = assert_ok!(h.engine.create("alice", 100, &legs(&["a", "b"]), at(14, 23, 0), at(14, 9, 0)).await);
    let b = assert_ok!(h.engine.create("alice", 20, &legs(&["c"]), at(14, 12, 0), at(14, 9, 0)).await);
    assert_ok!(h.engine.mark_leg(&a.id, 0, LegOutcome::Completed, at(14, 10, 0)).await);
    assert_ok!(h.engine.mark_leg(&a.id, 1, LegOutcome::Completed, at(14, 10, 0)).await);
    h.engine.resolve_due(at(14, 12, 0)).await;
    assert_eq!(h.engine.get(&b.id).await.unwrap().status, ParlayStatus::Lost);

    let snap = h.engine.ledger().snapshot().await;
    let sum: i64 = snap
        .ledger
        .iter()
        .filter(|e| e.user_id == "alice")
        .map(|e| e.delta)
        .sum();
    assert_eq!(sum, 1000 - 120 + 150);
    assert_eq!(sum, snap.users["alice"].balance as i64);
}
