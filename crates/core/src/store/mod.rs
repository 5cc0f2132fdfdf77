//! # Catalog Stores
//!
//! A store holds one collection of product records keyed by id and pushes a
//! full snapshot to every live subscriber whenever the collection changes.
//!
//! ## Backends
//!
//! - `realtime` - hosted real-time database over its REST/streaming protocol
//! - `sqlite` - local single-process SQLite file
//! - `memory` - in-process map, for tests and demos

pub mod memory;
pub mod realtime;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use realtime::RealtimeStore;
pub use sqlite::SqliteStore;

use crate::config::{BackendKind, CatalogConfig};
use crate::error::StoreError;
use crate::model::{ProductRecord, Snapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Item delivered by a live subscription
pub type SnapshotResult = std::result::Result<Snapshot, StoreError>;

/// Keyed write/delete plus live full-snapshot subscription
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Overwrite the record at `id`
    async fn set(&self, id: &str, record: &ProductRecord) -> std::result::Result<(), StoreError>;

    /// Remove the record at `id`; removing a missing id is not an error
    async fn remove(&self, id: &str) -> std::result::Result<(), StoreError>;

    /// One-shot read of the whole collection
    async fn snapshot(&self) -> std::result::Result<Snapshot, StoreError>;

    /// Attach a live listener. The first item is the initial read.
    async fn subscribe(&self) -> std::result::Result<Subscription, StoreError>;
}

/// Handle to a live listener.
///
/// Each item is authoritative and total. Dropping the handle stops the
/// listener task.
pub struct Subscription {
    rx: mpsc::Receiver<SnapshotResult>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<SnapshotResult>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// Wait for the next snapshot; `None` once the listener has stopped
    pub async fn next(&mut self) -> Option<SnapshotResult> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// In-process fan-out of full snapshots for the local backends
pub(crate) struct SnapshotFeed {
    tx: watch::Sender<Snapshot>,
}

impl SnapshotFeed {
    pub(crate) fn new(initial: Snapshot) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub(crate) fn publish(&self, snapshot: Snapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Edit the current snapshot in place and notify subscribers in one step
    pub(crate) fn modify(&self, f: impl FnOnce(&mut Snapshot)) {
        self.tx.send_modify(f);
    }

    pub(crate) fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        let mut watch_rx = self.tx.subscribe();
        let (tx, rx) = mpsc::channel::<SnapshotResult>(16);

        let task = tokio::spawn(async move {
            let initial = watch_rx.borrow_and_update().clone();
            if tx.send(Ok(initial)).await.is_err() {
                return;
            }
            while watch_rx.changed().await.is_ok() {
                let snapshot = watch_rx.borrow_and_update().clone();
                if tx.send(Ok(snapshot)).await.is_err() {
                    return;
                }
            }
        });

        Subscription::new(rx, task)
    }
}

/// Build the store selected by the configuration
pub async fn open(config: &CatalogConfig) -> Result<Arc<dyn CatalogStore>> {
    let store: Arc<dyn CatalogStore> = match config.backend {
        BackendKind::Realtime => Arc::new(
            RealtimeStore::connect(&config.store)
                .await
                .context("Failed to connect to the real-time database")?,
        ),
        BackendKind::Sqlite => Arc::new(
            SqliteStore::open_at(&config.sqlite_path, &config.store.collection)
                .context("Failed to open catalog database")?,
        ),
        BackendKind::Memory => Arc::new(InMemoryStore::new()),
    };

    tracing::info!(
        backend = config.backend.as_str(),
        collection = %config.store.collection,
        "Store opened"
    );

    Ok(store)
}
