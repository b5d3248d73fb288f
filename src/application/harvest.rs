//! One harvest run, end to end
//!
//! source → admissibility gate → merge → chunked enrichment → save → CSV.
//! The coordinating flow owns the merged snapshot; enriched records are
//! folded into it at chunk boundaries only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::concurrency::{ChunkSink, ConcurrencyController};
use crate::application::enrichment::{RecordEnricher, RecordEnrichment};
use crate::domain::merge::{MergeOutcome, admit_all, merge};
use crate::domain::record::Record;
use crate::domain::repositories::SnapshotStore;
use crate::domain::services::ListingSource;
use crate::domain::snapshot::Snapshot;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::csv_export::export_csv;
use crate::infrastructure::harvest_error::HarvestError;

/// Counts reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Raw candidates yielded by the source
    pub harvested: usize,
    /// Candidates that passed the admissibility gate
    pub admitted: usize,
    pub new: usize,
    /// New records whose main image was stored locally
    pub enriched_success: usize,
    pub enriched_failure: usize,
    pub images_stored: usize,
    pub images_failed: usize,
    /// Records in the saved snapshot
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestOptions {
    pub concurrency: usize,
    pub checkpoint_each_chunk: bool,
    /// Tabular export written after a successful save
    pub csv_path: Option<PathBuf>,
}

impl HarvestOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.enrichment.concurrency,
            checkpoint_each_chunk: config.enrichment.checkpoint_each_chunk,
            csv_path: config
                .paths
                .export_csv
                .then(|| config.paths.csv_path.clone()),
        }
    }
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            checkpoint_each_chunk: false,
            csv_path: None,
        }
    }
}

pub struct HarvestRun {
    source: Arc<dyn ListingSource>,
    store: Arc<dyn SnapshotStore>,
    enricher: Arc<RecordEnricher>,
    options: HarvestOptions,
}

impl HarvestRun {
    pub fn new(
        source: Arc<dyn ListingSource>,
        store: Arc<dyn SnapshotStore>,
        enricher: Arc<RecordEnricher>,
        options: HarvestOptions,
    ) -> Self {
        Self {
            source,
            store,
            enricher,
            options,
        }
    }

    /// Executes the run.
    ///
    /// Fails when the source fails (before anything is written) or when the
    /// final save fails. Enrichment, checkpoint and CSV failures are logged and
    /// the run carries on.
    pub async fn execute(&self) -> Result<HarvestReport, HarvestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "🌾 Harvest run starting with source '{}'", self.source.name());

        let raw = self.source.fetch().await?;

        let prior = self.load_prior().await;
        let admitted = admit_all(&raw);
        let MergeOutcome {
            mut merged,
            new_batch,
            refreshed,
        } = merge(&prior, &admitted);

        info!(
            "🔀 {} candidates, {} admitted, {} new, {} refreshed",
            raw.len(),
            admitted.len(),
            new_batch.len(),
            refreshed
        );

        // Checkpoints hold the prior snapshot plus re-observed records, and
        // gain new records only once their chunk is folded. Records of chunks
        // that never ran stay out of storage and are new again next run.
        let checkpoint = self.options.checkpoint_each_chunk.then(|| {
            let known: Vec<Record> = admitted
                .iter()
                .filter(|record| prior.contains(&record.identity()))
                .cloned()
                .collect();
            merge(&prior, &known).merged
        });
        drop(prior);

        let new_count = new_batch.len();
        let controller =
            ConcurrencyController::new(Arc::clone(&self.enricher), self.options.concurrency);
        let mut folder = SnapshotFolder {
            merged: &mut merged,
            checkpoint,
            store: self.store.as_ref(),
        };
        let outcomes = controller.run(new_batch, &mut folder).await;

        let enriched_batch: Vec<Record> = outcomes
            .iter()
            .filter_map(|o| merged.get(&o.record.identity()).cloned())
            .collect();
        self.store.save(&merged, &enriched_batch).await?;

        if let Some(csv_path) = &self.options.csv_path {
            if let Err(e) = export_csv(merged.iter(), csv_path) {
                warn!("CSV export failed, snapshot is saved: {:#}", e);
            }
        }

        let enriched_success = outcomes.iter().filter(|o| o.main_stored()).count();
        let report = HarvestReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            harvested: raw.len(),
            admitted: admitted.len(),
            new: new_count,
            enriched_success,
            enriched_failure: new_count - enriched_success,
            images_stored: outcomes.iter().map(|o| o.images_stored).sum(),
            images_failed: outcomes.iter().map(|o| o.images_failed).sum(),
            total: merged.len(),
        };

        info!(
            %run_id,
            "✅ Harvest complete: {} admitted, {} new, {} enriched, {} failed, {} total",
            report.admitted,
            report.new,
            report.enriched_success,
            report.enriched_failure,
            report.total
        );
        Ok(report)
    }

    /// An unreadable store counts as no history
    async fn load_prior(&self) -> Snapshot {
        match self.store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("⚠️ Prior snapshot unavailable, starting empty: {}", e);
                Snapshot::new()
            }
        }
    }
}

/// Folds enriched records into the merged snapshot at chunk boundaries
struct SnapshotFolder<'a> {
    merged: &'a mut Snapshot,
    /// Durable view of the run so far, present when checkpointing
    checkpoint: Option<Snapshot>,
    store: &'a dyn SnapshotStore,
}

impl SnapshotFolder<'_> {
    /// Annotates the merged entry with the enrichment result. Only the local
    /// image fields are taken from the outcome; everything else stays as the
    /// merge decided.
    fn fold(&mut self, outcome: &RecordEnrichment) -> Option<Record> {
        let key = outcome.record.identity();
        let Some(entry) = self.merged.get_mut(&key) else {
            warn!(identity = %key, "Enriched record missing from merged snapshot");
            return None;
        };
        entry
            .main_image_local
            .clone_from(&outcome.record.main_image_local);
        entry
            .other_images_local
            .clone_from(&outcome.record.other_images_local);
        Some(entry.clone())
    }
}

#[async_trait]
impl ChunkSink for SnapshotFolder<'_> {
    async fn chunk_completed(&mut self, chunk_index: usize, results: &[RecordEnrichment]) {
        let folded: Vec<Record> = results.iter().filter_map(|o| self.fold(o)).collect();

        let Some(checkpoint) = self.checkpoint.as_mut() else {
            return;
        };
        for record in folded {
            checkpoint.upsert(record);
        }
        // new batch file is left to the final save
        if let Err(e) = self.store.save(checkpoint, &[]).await {
            error!(
                chunk = chunk_index + 1,
                "Checkpoint save failed, continuing: {}", e
            );
        }
    }
}
