//! Collaborator interfaces the harvest pipeline depends on
//!
//! Browsers, HTTP clients and files all sit behind these traits so the core
//! can be driven by in-memory fakes in tests.

use async_trait::async_trait;

use super::record::RawRecord;
use crate::infrastructure::harvest_error::{EnrichmentError, SourceError};

/// Producer of raw listing candidates for one harvest run
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError>;
}

/// Retrieves the raw bytes behind a remote image reference
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EnrichmentError>;
}
