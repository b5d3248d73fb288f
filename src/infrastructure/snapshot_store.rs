//! JSON file snapshot store
//!
//! The full snapshot lives in one pretty-printed JSON array, the latest new
//! batch in a second one. Writes go through a temp file and a rename so a
//! crash mid-write leaves the previous snapshot intact.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::domain::record::Record;
use crate::domain::repositories::SnapshotStore;
use crate::domain::snapshot::Snapshot;
use crate::infrastructure::harvest_error::StoreError;

#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    snapshot_path: PathBuf,
    new_batch_path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(snapshot_path: impl Into<PathBuf>, new_batch_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            new_batch_path: new_batch_path.into(),
        }
    }

    #[must_use]
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    #[must_use]
    pub fn new_batch_path(&self) -> &Path {
        &self.new_batch_path
    }

    /// Moves an unreadable snapshot aside so the next save does not destroy it
    async fn back_up_corrupt_file(&self) {
        let mut backup = self.snapshot_path.clone().into_os_string();
        backup.push(".corrupted");
        let backup = PathBuf::from(backup);
        match fs::copy(&self.snapshot_path, &backup).await {
            Ok(_) => info!("Backed up unreadable snapshot to: {:?}", backup),
            Err(e) => warn!("Failed to back up unreadable snapshot: {}", e),
        }
    }
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value).map_err(|e| StoreError::Serialize {
        reason: e.to_string(),
    })?;

    let write_error = |e: std::io::Error| StoreError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(write_error)?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    fs::write(&temp_path, content).await.map_err(write_error)?;
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(write_error(e));
    }
    Ok(())
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let content = match fs::read_to_string(&self.snapshot_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No prior snapshot at {:?}, starting empty", self.snapshot_path);
                return Ok(Snapshot::new());
            }
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.snapshot_path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Snapshot::new());
        }

        match serde_json::from_str::<Snapshot>(&content) {
            Ok(snapshot) => {
                info!("Loaded {} records from {:?}", snapshot.len(), self.snapshot_path);
                Ok(snapshot)
            }
            Err(e) => {
                self.back_up_corrupt_file().await;
                Err(StoreError::Parse {
                    path: self.snapshot_path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot, new_batch: &[Record]) -> Result<(), StoreError> {
        write_json_atomic(&self.snapshot_path, snapshot).await?;

        if !new_batch.is_empty() {
            write_json_atomic(&self.new_batch_path, new_batch).await?;
        }

        info!(
            "💾 Saved {} records to {:?} ({} new)",
            snapshot.len(),
            self.snapshot_path,
            new_batch.len()
        );
        Ok(())
    }
}
