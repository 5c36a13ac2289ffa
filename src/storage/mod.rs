//! Persistence layer.
//!
//! `LedgerStore` is the durable backend: it loads and atomically replaces
//! the whole [`Snapshot`]. `SharedLedger` owns the in-memory copy and is
//! the only writer. Every mutation runs as read-modify-persist under one
//! process-wide lock, and the in-memory copy only advances after the
//! backend accepted the new snapshot.

pub mod json;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::types::{ParlayError, Snapshot};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Durable home of the snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Full snapshot; empty when nothing has been persisted yet.
    async fn load(&self) -> Result<Snapshot>;

    /// Replace the persisted snapshot. Must never leave a partial write.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Single-writer holder of the live snapshot.
pub struct SharedLedger {
    backend: Arc<dyn LedgerStore>,
    /// Last successfully persisted snapshot; the write lock.
    state: Mutex<Snapshot>,
    /// Published copy for readers, swapped after each successful save.
    view: RwLock<Arc<Snapshot>>,
}

impl SharedLedger {
    /// Load the backend's snapshot and take ownership of it.
    pub async fn open(backend: Arc<dyn LedgerStore>) -> Result<Self> {
        let snapshot = backend.load().await?;
        info!(
            store = %backend.describe(),
            users = snapshot.users.len(),
            parlays = snapshot.parlays.len(),
            active = snapshot.active_parlays().count(),
            ledger = snapshot.ledger.len(),
            "Ledger opened"
        );
        Ok(Self::with_snapshot(backend, snapshot))
    }

    pub fn with_snapshot(backend: Arc<dyn LedgerStore>, snapshot: Snapshot) -> Self {
        Self {
            backend,
            view: RwLock::new(Arc::new(snapshot.clone())),
            state: Mutex::new(snapshot),
        }
    }

    /// Read-only view of the last persisted snapshot. Does not take the
    /// write lock, so it may trail an in-flight mutation.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.view.read().await.clone()
    }

    /// Apply `f` to a draft of the snapshot and persist it.
    ///
    /// The draft is committed only if `f` succeeds and the backend saves
    /// it; on any error the live snapshot is left exactly as it was.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T, ParlayError>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, ParlayError>,
    {
        let mut state = self.state.lock().await;
        let mut draft = state.clone();
        let value = f(&mut draft)?;

        if let Err(e) = self.backend.save(&draft).await {
            error!(store = %self.backend.describe(), error = %e, "Failed to persist snapshot");
            return Err(ParlayError::IoFailure(format!("{e:#}")));
        }

        let published = Arc::new(draft.clone());
        *state = draft;
        *self.view.write().await = published;
        debug!("Snapshot committed");
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
