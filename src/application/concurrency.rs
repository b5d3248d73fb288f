//! Chunked concurrency controller
//!
//! The new batch is split into consecutive chunks of `concurrency` records.
//! Every record of a chunk is enriched on its own task; the chunk is joined
//! all-settled, handed to a [`ChunkSink`] and only then does the next chunk
//! start. Tasks never touch shared state, they return their record by value.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::enrichment::{RecordEnricher, RecordEnrichment};
use crate::domain::record::Record;

/// Receives each chunk's results before the next chunk starts
#[async_trait]
pub trait ChunkSink: Send {
    /// `chunk_index` is 0-based
    async fn chunk_completed(&mut self, chunk_index: usize, results: &[RecordEnrichment]);
}

/// Sink that discards chunk notifications
pub struct NoopSink;

#[async_trait]
impl ChunkSink for NoopSink {
    async fn chunk_completed(&mut self, _chunk_index: usize, _results: &[RecordEnrichment]) {}
}

#[derive(Clone)]
pub struct ConcurrencyController {
    enricher: Arc<RecordEnricher>,
    concurrency: usize,
}

impl ConcurrencyController {
    /// `concurrency` below 1 is treated as 1
    pub fn new(enricher: Arc<RecordEnricher>, concurrency: usize) -> Self {
        Self {
            enricher,
            concurrency: concurrency.max(1),
        }
    }

    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Enriches `new_batch` chunk by chunk and returns every outcome in batch
    /// order.
    pub async fn run<S>(&self, new_batch: Vec<Record>, sink: &mut S) -> Vec<RecordEnrichment>
    where
        S: ChunkSink + ?Sized,
    {
        let total_chunks = new_batch.len().div_ceil(self.concurrency);
        let mut outcomes = Vec::with_capacity(new_batch.len());

        info!(
            "🚀 Enriching {} new records in {} chunks of up to {}",
            new_batch.len(),
            total_chunks,
            self.concurrency
        );

        for (chunk_index, chunk) in new_batch.chunks(self.concurrency).enumerate() {
            let results = self.run_chunk(chunk).await;

            let main_stored = results.iter().filter(|r| r.main_stored()).count();
            info!(
                chunk = chunk_index + 1,
                "📦 Chunk {}/{} done: {} of {} records have a local main image",
                chunk_index + 1,
                total_chunks,
                main_stored,
                results.len()
            );

            sink.chunk_completed(chunk_index, &results).await;
            outcomes.extend(results);
        }

        outcomes
    }

    /// Runs one chunk to completion, all-settled
    async fn run_chunk(&self, chunk: &[Record]) -> Vec<RecordEnrichment> {
        let tasks: Vec<_> = chunk
            .iter()
            .cloned()
            .map(|record| {
                let enricher = Arc::clone(&self.enricher);
                tokio::spawn(async move { enricher.enrich_record(record).await })
            })
            .collect();

        join_all(tasks)
            .await
            .into_iter()
            .zip(chunk)
            .map(|(result, original)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        identity = %original.identity(),
                        "❌ Enrichment task join failed: {}",
                        e
                    );
                    RecordEnrichment::abandoned(original.clone())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::RawRecord;
    use crate::domain::services::ImageFetcher;
    use crate::infrastructure::harvest_error::EnrichmentError;
    use crate::infrastructure::image_store::LocalImageStore;
    use crate::infrastructure::image_transform::ImageTransformer;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Tracks the highest number of fetches in flight at once
    #[derive(Default)]
    struct GaugedFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ImageFetcher for GaugedFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, EnrichmentError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut bytes = Vec::new();
            RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .map_err(|e| EnrichmentError::Encode {
                    reason: e.to_string(),
                })?;
            Ok(bytes)
        }
    }

    /// Records the chunk sizes it was handed
    #[derive(Default)]
    struct RecordingSink {
        chunks: Vec<(usize, usize)>,
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn chunk_completed(&mut self, chunk_index: usize, results: &[RecordEnrichment]) {
            self.chunks.push((chunk_index, results.len()));
        }
    }

    fn batch(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                let link = format!("http://s/{i}");
                let image = format!("http://i/{i}.jpg");
                Record::admit(&RawRecord::new("T", "1", &link, &[image.as_str()])).unwrap()
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_never_exceeds_concurrency() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = Arc::new(GaugedFetcher::default());
        let enricher = RecordEnricher::new(
            fetcher.clone(),
            ImageTransformer::new(100, 80),
            LocalImageStore::new(temp_dir.path()),
        );
        let controller = ConcurrencyController::new(Arc::new(enricher), 2);
        let mut sink = RecordingSink::default();

        let outcomes = controller.run(batch(5), &mut sink).await;

        assert_eq!(outcomes.len(), 5);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(sink.chunks, vec![(0, 2), (1, 2), (2, 1)]);
    }

    #[tokio::test]
    async fn outcomes_keep_batch_order() {
        let temp_dir = TempDir::new().unwrap();
        let enricher = RecordEnricher::new(
            Arc::new(GaugedFetcher::default()),
            ImageTransformer::new(100, 80),
            LocalImageStore::new(temp_dir.path()),
        );
        let controller = ConcurrencyController::new(Arc::new(enricher), 3);
        let input = batch(7);

        let outcomes = controller.run(input.clone(), &mut NoopSink).await;

        let links: Vec<_> = outcomes.iter().map(|o| o.record.link.clone()).collect();
        let expected: Vec<_> = input.iter().map(|r| r.link.clone()).collect();
        assert_eq!(links, expected);
        assert!(outcomes.iter().all(RecordEnrichment::main_stored));
    }

    #[tokio::test]
    async fn zero_concurrency_is_clamped() {
        let temp_dir = TempDir::new().unwrap();
        let enricher = RecordEnricher::new(
            Arc::new(GaugedFetcher::default()),
            ImageTransformer::new(100, 80),
            LocalImageStore::new(temp_dir.path()),
        );
        let controller = ConcurrencyController::new(Arc::new(enricher), 0);
        assert_eq!(controller.concurrency(), 1);

        let outcomes = controller.run(Vec::new(), &mut NoopSink).await;
        assert!(outcomes.is_empty());
    }
}
