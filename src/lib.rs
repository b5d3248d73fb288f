//! Listing Harvester - incremental listing snapshots with local image copies
//!
//! Raw listings from a collector are gated, merged into the prior snapshot by
//! normalized link identity, and every newly discovered record gets its images
//! fetched, bounded, re-encoded and stored locally, a few records at a time.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
