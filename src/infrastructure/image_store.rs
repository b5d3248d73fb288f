//! Local storage layout for enriched images
//!
//! One directory per record, `main.jpg` plus `extra_<n>.jpg`. The directory
//! name is derived from the record identity, so two records never share one and
//! concurrent writes cannot collide.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::domain::identity::IdentityKey;
use crate::domain::record::ImageSlot;
use crate::infrastructure::harvest_error::EnrichmentError;
use crate::infrastructure::image_transform::STORED_IMAGE_EXTENSION;

const MAX_SLUG_LEN: usize = 48;
const HASH_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every image of one record
    #[must_use]
    pub fn record_dir(&self, identity: &IdentityKey) -> PathBuf {
        self.root.join(record_dir_name(identity))
    }

    #[must_use]
    pub fn slot_path(&self, identity: &IdentityKey, slot: ImageSlot) -> PathBuf {
        self.record_dir(identity)
            .join(format!("{}.{}", slot.file_stem(), STORED_IMAGE_EXTENSION))
    }

    /// Writes an encoded image to its slot; the file appears atomically
    pub async fn write(
        &self,
        identity: &IdentityKey,
        slot: ImageSlot,
        bytes: &[u8],
    ) -> Result<PathBuf, EnrichmentError> {
        let path = self.slot_path(identity, slot);
        let dir = self.record_dir(identity);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| EnrichmentError::write(&dir, e))?;

        let temp_path = path.with_extension(format!("{STORED_IMAGE_EXTENSION}.tmp"));
        fs::write(&temp_path, bytes)
            .await
            .map_err(|e| EnrichmentError::write(&temp_path, e))?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(EnrichmentError::write(&path, e));
        }

        debug!("🖼️ Stored {} bytes at {:?}", bytes.len(), path);
        Ok(path)
    }
}

/// `<slug>-<hash>`: slug from the last path segment of the identity for
/// readability, hash of the full identity for uniqueness
#[must_use]
pub fn record_dir_name(identity: &IdentityKey) -> String {
    let last_segment = identity
        .as_str()
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default();

    let mut slug: String = last_segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    slug = slug.trim_matches('-').to_string();
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "record" } else { slug };

    let hash = blake3::hash(identity.as_str().as_bytes()).to_hex();
    format!("{slug}-{}", &hash.as_str()[..HASH_LEN])
}
