//! Application layer module
//!
//! Orchestrates the domain: the per-record enrichment pipeline, the chunked
//! concurrency controller and the end-to-end harvest run.

pub mod concurrency;
pub mod enrichment;
pub mod harvest;

pub use concurrency::{ChunkSink, ConcurrencyController, NoopSink};
pub use enrichment::{RecordEnricher, RecordEnrichment};
pub use harvest::{HarvestOptions, HarvestReport, HarvestRun};
