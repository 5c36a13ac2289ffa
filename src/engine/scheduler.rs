//! Deadline sweeper: the background task that settles expired parlays.
//!
//! Holds no state of its own. Each tick reads the clock in the reference
//! zone and calls [`ParlayEngine::resolve_due`] inside its own task, so a
//! panicking tick is logged and the loop carries on with the next one.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::clock::ReferenceZone;
use crate::engine::parlay::{ParlayEngine, SweepReport};

pub struct DeadlineSweeper {
    engine: Arc<ParlayEngine>,
    zone: ReferenceZone,
    interval: Duration,
}

impl DeadlineSweeper {
    pub fn new(engine: Arc<ParlayEngine>, zone: ReferenceZone, interval: Duration) -> Self {
        Self {
            engine,
            zone,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Run the sweep loop in the background until `shutdown` flips to `true`
    /// or its sender is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs_f64(),
            timezone = self.zone.name(),
            "Deadline sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Deadline sweeper stopped");
    }

    /// One sweep at the current instant. `None` if the sweep task panicked.
    pub async fn tick(&self) -> Option<SweepReport> {
        let engine = self.engine.clone();
        let now = self.zone.now();

        match tokio::spawn(async move { engine.resolve_due(now).await }).await {
            Ok(report) => {
                if report.is_empty() {
                    debug!("Sweep tick: nothing due");
                } else {
                    info!(
                        resolved = report.resolved.len(),
                        skipped = report.skipped,
                        failed = report.failed,
                        "Sweep tick complete"
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Sweep tick aborted, retrying next tick");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    use crate::config::EconomyConfig;
    use crate::engine::accountant::Accountant;
    use crate::storage::{MemoryStore, SharedLedger};
    use crate::types::{ParlayStatus, Snapshot};

    fn engine() -> Arc<ParlayEngine> {
        let ledger = Arc::new(SharedLedger::with_snapshot(
            Arc::new(MemoryStore::new()),
            Snapshot::default(),
        ));
        Arc::new(ParlayEngine::new(
            ledger,
            Accountant::new(EconomyConfig::default(), ReferenceZone::default()),
        ))
    }

    /// A parlay created two hours ago whose deadline passed an hour ago.
    async fn expired_parlay(engine: &ParlayEngine) -> String {
        let now = ReferenceZone::default().now();
        let created = now - ChronoDuration::hours(2);
        engine
            .create("u", 25, &["run".to_string()], created + ChronoDuration::hours(1), created)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_tick_resolves_expired() {
        let engine = engine();
        let id = expired_parlay(&engine).await;
        let sweeper = DeadlineSweeper::new(engine.clone(), ReferenceZone::default(), Duration::from_secs(60));

        let report = sweeper.tick().await.unwrap();
        assert_eq!(report.resolved, vec![(id.clone(), ParlayStatus::Lost)]);
        assert_eq!(engine.get(&id).await.unwrap().status, ParlayStatus::Lost);

        let report = sweeper.tick().await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_tick_leaves_future_deadlines() {
        let engine = engine();
        let now = ReferenceZone::default().now();
        let p = engine
            .create("u", 10, &["read".to_string()], now + ChronoDuration::hours(3), now)
            .await
            .unwrap();
        let sweeper = DeadlineSweeper::new(engine.clone(), ReferenceZone::default(), Duration::from_secs(60));

        assert!(sweeper.tick().await.unwrap().is_empty());
        assert!(engine.get(&p.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_loop_sweeps_and_stops_on_shutdown() {
        let engine = engine();
        let id = expired_parlay(&engine).await;
        let (tx, rx) = watch::channel(false);

        let handle = DeadlineSweeper::new(engine.clone(), ReferenceZone::default(), Duration::from_millis(10))
            .spawn(rx);

        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if engine.get(&id).await.is_some_and(|p| !p.is_active()) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(settled.is_ok());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let handle = DeadlineSweeper::new(engine(), ReferenceZone::default(), Duration::from_secs(60))
            .spawn(rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
