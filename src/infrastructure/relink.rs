//! Re-attach extra images already present in the local image store
//!
//! A run that crashed after writing images but before saving, or a snapshot
//! restored from an older copy, can leave `other_images_local` shorter than
//! what is on disk. This pass rebuilds the list from the record directories.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::domain::snapshot::Snapshot;
use crate::infrastructure::image_store::LocalImageStore;

lazy_static! {
    static ref EXTRA_IMAGE_PATTERN: Regex =
        Regex::new(r"^extra_(\d+)\.[A-Za-z0-9]+$").expect("extra image pattern compiles");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelinkReport {
    /// Records with a local main image whose directory was inspected
    pub scanned: usize,
    /// Records whose extra image list changed
    pub updated: usize,
}

/// Rebuilds `other_images_local` for every record with a local main image.
///
/// The list is only replaced when the directory holds at least as many extra
/// images as are already recorded.
pub async fn relink_local_images(snapshot: &mut Snapshot, store: &LocalImageStore) -> RelinkReport {
    let mut report = RelinkReport::default();

    for record in snapshot.iter_mut() {
        if record.main_image_local.as_deref().is_none_or(str::is_empty) {
            continue;
        }

        let dir = store.record_dir(&record.identity());
        let Some(found) = scan_extra_images(&dir).await else {
            continue;
        };
        report.scanned += 1;

        if found.len() >= record.other_images_local.len() && found != record.other_images_local {
            debug!(
                "Relinked {} extra images for {}",
                found.len(),
                record.identity()
            );
            record.other_images_local = found;
            report.updated += 1;
        }
    }

    info!(
        "🔗 Relink finished: {} scanned, {} updated",
        report.scanned, report.updated
    );
    report
}

/// Extra image paths in `dir`, ordered by their index. `None` when the
/// directory does not exist or cannot be read.
async fn scan_extra_images(dir: &Path) -> Option<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Cannot read image directory {:?}: {}", dir, e);
            return None;
        }
    };

    let mut indexed: Vec<(u64, PathBuf)> = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some(index) = EXTRA_IMAGE_PATTERN
                    .captures(name)
                    .and_then(|caps| caps[1].parse::<u64>().ok())
                else {
                    continue;
                };
                indexed.push((index, entry.path()));
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error while listing {:?}: {}", dir, e);
                return None;
            }
        }
    }

    indexed.sort_by_key(|(index, _)| *index);
    Some(
        indexed
            .into_iter()
            .map(|(_, path)| path.display().to_string())
            .collect(),
    )
}
