//! Persistence interface for snapshots

use async_trait::async_trait;

use super::record::Record;
use super::snapshot::Snapshot;
use crate::infrastructure::harvest_error::StoreError;

/// Durable home of the snapshot and of the latest new batch
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the prior snapshot; a store that has never been written returns
    /// an empty snapshot rather than an error.
    async fn load(&self) -> Result<Snapshot, StoreError>;

    /// Persists the full snapshot and, when `new_batch` is non-empty, the new
    /// batch on its own.
    async fn save(&self, snapshot: &Snapshot, new_batch: &[Record]) -> Result<(), StoreError>;
}
