//! Image enrichment pipeline
//!
//! Per image: fetch, transform on the blocking pool, write to the local image
//! store. Per record: main image first, then every extra in order, with a
//! fixed pause between successive fetches. A failure costs exactly one slot.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::identity::IdentityKey;
use crate::domain::record::{ImageSlot, Record};
use crate::domain::services::ImageFetcher;
use crate::infrastructure::config::EnrichmentConfig;
use crate::infrastructure::harvest_error::EnrichmentError;
use crate::infrastructure::image_store::LocalImageStore;
use crate::infrastructure::image_transform::ImageTransformer;

/// A record after its enrichment attempt, with per-image tallies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEnrichment {
    pub record: Record,
    pub images_stored: usize,
    pub images_failed: usize,
}

impl RecordEnrichment {
    /// Whether the main image made it to local storage
    #[must_use]
    pub fn main_stored(&self) -> bool {
        self.record
            .main_image_local
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }

    /// Outcome for a record whose enrichment task never completed; the record
    /// is returned untouched.
    #[must_use]
    pub fn abandoned(record: Record) -> Self {
        let images_failed = record.remote_images().count();
        Self {
            record,
            images_stored: 0,
            images_failed,
        }
    }
}

/// Fetches, transforms and stores the images of one record at a time
pub struct RecordEnricher {
    fetcher: Arc<dyn ImageFetcher>,
    transformer: Arc<ImageTransformer>,
    store: LocalImageStore,
    inter_request_delay: Duration,
}

impl RecordEnricher {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        transformer: ImageTransformer,
        store: LocalImageStore,
    ) -> Self {
        Self {
            fetcher,
            transformer: Arc::new(transformer),
            store,
            inter_request_delay: Duration::ZERO,
        }
    }

    pub fn from_config(
        fetcher: Arc<dyn ImageFetcher>,
        config: &EnrichmentConfig,
        store: LocalImageStore,
    ) -> Self {
        Self::new(fetcher, ImageTransformer::from_config(config), store)
            .with_inter_request_delay(Duration::from_millis(config.inter_request_delay_ms))
    }

    #[must_use]
    pub const fn with_inter_request_delay(mut self, delay: Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &LocalImageStore {
        &self.store
    }

    /// Enriches a single image and returns the stored path
    pub async fn enrich_image(
        &self,
        identity: &IdentityKey,
        slot: ImageSlot,
        remote_url: &str,
    ) -> Result<String, EnrichmentError> {
        let bytes = self.fetcher.fetch(remote_url).await?;

        // decode and resize are CPU bound
        let transformer = Arc::clone(&self.transformer);
        let source = remote_url.to_string();
        let encoded = tokio::task::spawn_blocking(move || transformer.transform(&source, &bytes))
            .await
            .map_err(|e| EnrichmentError::TaskPanicked {
                reason: e.to_string(),
            })??;

        let path = self.store.write(identity, slot, &encoded).await?;
        Ok(path.display().to_string())
    }

    /// Enriches every image of `record`.
    ///
    /// Local fields are rebuilt from this attempt only: a failed main image
    /// leaves `main_image_local` empty, failed extras are left out of
    /// `other_images_local` without disturbing the order of the rest.
    pub async fn enrich_record(&self, mut record: Record) -> RecordEnrichment {
        let identity = record.identity();
        let mut main_local = None;
        let mut extras_local = Vec::with_capacity(record.other_images_remote.len());
        let mut images_stored = 0usize;
        let mut images_failed = 0usize;

        for (position, (slot, url)) in record.remote_images().enumerate() {
            if position > 0 && !self.inter_request_delay.is_zero() {
                sleep(self.inter_request_delay).await;
            }

            match self.enrich_image(&identity, slot, url).await {
                Ok(path) => {
                    images_stored += 1;
                    match slot {
                        ImageSlot::Main => main_local = Some(path),
                        ImageSlot::Extra(_) => extras_local.push(path),
                    }
                }
                Err(e) => {
                    images_failed += 1;
                    warn!(
                        identity = %identity,
                        slot = %slot,
                        retryable = e.is_retryable(),
                        "⚠️ Image enrichment failed: {}",
                        e
                    );
                }
            }
        }

        debug!(
            "Enriched {}: {} stored, {} failed",
            identity, images_stored, images_failed
        );

        record.main_image_local = main_local;
        record.other_images_local = extras_local;
        RecordEnrichment {
            record,
            images_stored,
            images_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::RawRecord;
    use async_trait::async_trait;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::collections::HashSet;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_1x1() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(1, 1, Rgb([10, 20, 30]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Serves a valid image for every URL except the failing ones
    struct FakeFetcher {
        failing: HashSet<String>,
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, EnrichmentError> {
            if self.failing.contains(url) {
                Err(EnrichmentError::fetch(url, "connection reset"))
            } else if url.ends_with(".txt") {
                Ok(b"plain text".to_vec())
            } else {
                Ok(png_1x1())
            }
        }
    }

    fn enricher(dir: &TempDir, failing: &[&str]) -> RecordEnricher {
        let fetcher = Arc::new(FakeFetcher {
            failing: failing.iter().map(|s| (*s).to_string()).collect(),
        });
        RecordEnricher::new(
            fetcher,
            ImageTransformer::new(1000, 80),
            LocalImageStore::new(dir.path()),
        )
    }

    fn record(images: &[&str]) -> Record {
        Record::admit(&RawRecord::new("A", "100", "http://s/a", images)).unwrap()
    }

    #[tokio::test]
    async fn all_images_stored() {
        let temp_dir = TempDir::new().unwrap();
        let enricher = enricher(&temp_dir, &[]);

        let outcome = enricher
            .enrich_record(record(&["http://i/1.jpg", "http://i/2.jpg"]))
            .await;

        assert!(outcome.main_stored());
        assert_eq!(outcome.images_stored, 2);
        assert_eq!(outcome.images_failed, 0);
        assert_eq!(outcome.record.other_images_local.len(), 1);
        assert!(outcome.record.other_images_local[0].ends_with("extra_1.jpg"));
    }

    #[tokio::test]
    async fn failed_extra_is_dropped_without_reordering() {
        let temp_dir = TempDir::new().unwrap();
        let enricher = enricher(&temp_dir, &["http://i/2.jpg"]);

        let outcome = enricher
            .enrich_record(record(&[
                "http://i/1.jpg",
                "http://i/2.jpg",
                "http://i/3.jpg",
                "http://i/4.txt",
            ]))
            .await;

        assert!(outcome.main_stored());
        assert_eq!(outcome.images_failed, 2);
        let extras = &outcome.record.other_images_local;
        assert_eq!(extras.len(), 1);
        assert!(extras[0].ends_with("extra_2.jpg"));
        assert!(extras.len() <= outcome.record.other_images_remote.len());
    }

    #[tokio::test]
    async fn surviving_extras_keep_remote_order() {
        let temp_dir = TempDir::new().unwrap();
        let enricher = enricher(&temp_dir, &["http://i/3.jpg"]);

        let outcome = enricher
            .enrich_record(record(&[
                "http://i/1.jpg",
                "http://i/2.jpg",
                "http://i/3.jpg",
                "http://i/4.jpg",
            ]))
            .await;

        assert_eq!(outcome.images_stored, 3);
        assert_eq!(outcome.images_failed, 1);
        let extras = &outcome.record.other_images_local;
        assert_eq!(extras.len(), 2);
        assert!(extras[0].ends_with("extra_1.jpg"), "{}", extras[0]);
        assert!(extras[1].ends_with("extra_3.jpg"), "{}", extras[1]);
    }

    #[tokio::test]
    async fn failed_main_leaves_local_main_absent() {
        let temp_dir = TempDir::new().unwrap();
        let enricher = enricher(&temp_dir, &["http://i/1.jpg"]);

        let outcome = enricher
            .enrich_record(record(&["http://i/1.jpg", "http://i/2.jpg"]))
            .await;

        assert!(!outcome.main_stored());
        assert!(outcome.record.main_image_local.is_none());
        assert_eq!(outcome.record.other_images_local.len(), 1);
        assert_eq!(outcome.record.main_image_remote, "http://i/1.jpg");
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_fetches_of_one_record() {
        let temp_dir = TempDir::new().unwrap();
        let enricher =
            enricher(&temp_dir, &[]).with_inter_request_delay(Duration::from_millis(500));
        let started = tokio::time::Instant::now();

        enricher
            .enrich_record(record(&["http://i/1.jpg", "http://i/2.jpg", "http://i/3.jpg"]))
            .await;

        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[test]
    fn abandoned_counts_every_image_as_failed() {
        let outcome = RecordEnrichment::abandoned(record(&["m", "e1", "e2"]));
        assert_eq!(outcome.images_failed, 3);
        assert!(!outcome.main_stored());
    }
}
