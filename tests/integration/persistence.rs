//! Restart behaviour: what was persisted is exactly what comes back.

use std::path::PathBuf;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use selfparlay::clock::ReferenceZone;
use selfparlay::config::EconomyConfig;
use selfparlay::engine::{Accountant, ParlayEngine};
use selfparlay::storage::{JsonFileStore, LedgerStore, MemoryStore, SharedLedger};
use selfparlay::types::{DisplayRef, LegOutcome, LegStatus, ParlayStatus};

use crate::harness::{at, legs, Harness};

fn temp_path() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("selfparlay_it_{}.json", uuid::Uuid::new_v4()));
    p
}

async fn engine_on(path: &PathBuf) -> ParlayEngine {
    let store: Arc<dyn LedgerStore> = Arc::new(JsonFileStore::new(path));
    let ledger = assert_ok!(SharedLedger::open(store).await);
    ParlayEngine::new(
        Arc::new(ledger),
        Accountant::new(EconomyConfig::default(), ReferenceZone::default()),
    )
}

#[tokio::test]
async fn test_json_file_survives_restart() {
    let path = temp_path();

    let before = {
        let engine = engine_on(&path).await;
        let won = assert_ok!(engine.create("alice", 100, &legs(&["a", "b", "c"]), at(14, 23, 0), at(14, 9, 0)).await);
        for i in 0..3 {
            assert_ok!(engine.mark_leg(&won.id, i, LegOutcome::Completed, at(14, 10, 0)).await);
        }
        let open = assert_ok!(engine.create("alice", 30, &legs(&["d", "e"]), at(15, 20, 0), at(14, 11, 0)).await);
        assert_ok!(engine.mark_leg(&open.id, 1, LegOutcome::Completed, at(14, 11, 5)).await);
        assert_ok!(engine.attach_display(&open.id, DisplayRef { channel_id: 3, message_id: 4 }).await);
        engine.ledger().snapshot().await
    };

    let engine = engine_on(&path).await;
    let after = engine.ledger().snapshot().await;
    assert_eq!(*after, *before);

    let account = &after.users["alice"];
    assert_eq!(account.balance, 1000 - 130 + 180);
    assert_eq!(account.streak, 1);

    let active = engine.list_active("alice").await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].legs[1].status, LegStatus::Completed);
    assert_eq!(active[0].display, Some(DisplayRef { channel_id: 3, message_id: 4 }));

    // The restored engine keeps going where the old one stopped.
    let lost = assert_ok!(engine.mark_leg(&active[0].id, 0, LegOutcome::Failed, at(14, 12, 0)).await);
    assert_eq!(lost.status, ParlayStatus::Lost);

    assert_ok!(JsonFileStore::new(&path).delete().await);
}

#[tokio::test]
async fn test_failed_save_is_invisible_after_restart() {
    let store = Arc::new(MemoryStore::new());
    let h = Harness::reopen(store.clone()).await;
    let kept = assert_ok!(
        h.engine
            .create("alice", 25, &legs(&["a"]), at(14, 23, 0), at(14, 9, 0))
            .await
    );

    store.set_failing(true);
    assert_err!(h.engine.mark_leg(&kept.id, 0, LegOutcome::Completed, at(14, 10, 0)).await);
    assert_err!(h.engine.create("alice", 25, &legs(&["b"]), at(14, 23, 0), at(14, 10, 0)).await);
    store.set_failing(false);

    let restarted = Harness::reopen(store).await;
    let snap = restarted.engine.ledger().snapshot().await;
    assert_eq!(*snap, *h.engine.ledger().snapshot().await);
    assert_eq!(snap.parlays.len(), 1);
    assert!(snap.parlays[&kept.id].is_active());
    assert_eq!(snap.users["alice"].balance, 975);
}

#[tokio::test]
async fn test_sweep_after_restart_settles_overdue() {
    let store = Arc::new(MemoryStore::new());
    let id = {
        let h = Harness::reopen(store.clone()).await;
        assert_ok!(h.engine.create("alice", 25, &legs(&["a"]), at(14, 12, 0), at(14, 9, 0)).await).id
    };

    // down over the deadline, back up afterwards
    let h = Harness::reopen(store).await;
    let report = h.engine.resolve_due(at(14, 18, 0)).await;
    assert_eq!(report.resolved, vec![(id, ParlayStatus::Lost)]);
}
