//! In-process catalog store.
//!
//! Holds the collection in a map and fans every change out to live
//! subscribers. Useful for tests, demos, and single-process use.

use super::{CatalogStore, SnapshotFeed, Subscription};
use crate::error::StoreError;
use crate::model::{ProductRecord, Snapshot};
use async_trait::async_trait;

/// The feed's current value is the collection itself
pub struct InMemoryStore {
    feed: SnapshotFeed,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::new())
    }

    /// Start from existing contents
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            feed: SnapshotFeed::new(snapshot),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn set(&self, id: &str, record: &ProductRecord) -> Result<(), StoreError> {
        self.feed.modify(|records| records.insert(id, record.clone()));
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.feed.modify(|records| {
            records.remove(id);
        });
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.feed.current())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        Ok(self.feed.subscribe())
    }
}
