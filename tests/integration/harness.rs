//! Shared fixtures for the end-to-end tests.
//!
//! Builds the full stack (ledger, engine, gateway) over a controllable
//! in-memory store, with a fixed reference zone and explicit clocks.

use chrono::{Duration, NaiveDate};
use std::sync::Arc;

use selfparlay::clock::ReferenceZone;
use selfparlay::config::EconomyConfig;
use selfparlay::engine::{Accountant, ParlayEngine};
use selfparlay::gateway::Gateway;
use selfparlay::storage::{LedgerStore, MemoryStore, SharedLedger};
use selfparlay::types::{Account, Snapshot, Timestamp};

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<ParlayEngine>,
    pub gateway: Gateway,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::default())
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::over(store.clone(), SharedLedger::with_snapshot(store, snapshot))
    }

    /// Reopen whatever `store` last persisted, as a restart would.
    pub async fn reopen(store: Arc<MemoryStore>) -> Self {
        let backend: Arc<dyn LedgerStore> = store.clone();
        let ledger = SharedLedger::open(backend).await.unwrap();
        Self::over(store, ledger)
    }

    fn over(store: Arc<MemoryStore>, ledger: SharedLedger) -> Self {
        let zone = ReferenceZone::default();
        let engine = Arc::new(ParlayEngine::new(
            Arc::new(ledger),
            Accountant::new(EconomyConfig::default(), zone),
        ));
        let gateway = Gateway::new(engine.clone(), zone, Duration::seconds(60));
        Self { store, engine, gateway }
    }

    pub async fn account(&self, user_id: &str) -> Account {
        self.engine.ledger().snapshot().await.users[user_id].clone()
    }
}

/// 2025-10-`day` `hour`:`min` New York time.
pub fn at(day: u32, hour: u32, min: u32) -> Timestamp {
    ReferenceZone::default()
        .resolve_local(
            NaiveDate::from_ymd_opt(2025, 10, day)
                .unwrap()
                .and_hms_opt(hour, min, 0)
                .unwrap(),
        )
        .unwrap()
}

pub fn legs(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| t.to_string()).collect()
}
