//! Listing source adapters
//!
//! The browser-driven collector is an external process; what reaches the core
//! is its dump of raw candidates. These adapters read that dump, hold fixed
//! candidates for tests, and wrap any source in the shared retry policy.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::domain::record::RawRecord;
use crate::domain::services::ListingSource;
use crate::infrastructure::harvest_error::SourceError;
use crate::infrastructure::retry_policy::RetryPolicy;

/// Reads a JSON array of raw candidates from a file
#[derive(Debug, Clone)]
pub struct JsonFileListingSource {
    path: PathBuf,
    name: String,
}

impl JsonFileListingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }
}

#[async_trait]
impl ListingSource for JsonFileListingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::Unavailable {
                source_name: self.name.clone(),
                reason: e.to_string(),
            })?;

        let records: Vec<RawRecord> =
            serde_json::from_str(&content).map_err(|e| SourceError::Malformed {
                source_name: self.name.clone(),
                reason: e.to_string(),
            })?;

        debug!("Read {} raw candidates from {:?}", records.len(), self.path);
        Ok(records)
    }
}

/// Fixed in-memory candidates
#[derive(Debug, Clone, Default)]
pub struct StaticListingSource {
    records: Vec<RawRecord>,
}

impl StaticListingSource {
    #[must_use]
    pub const fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ListingSource for StaticListingSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self.records.clone())
    }
}

/// Applies a [`RetryPolicy`] to every fetch of the wrapped source
pub struct RetryingListingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: ListingSource> RetryingListingSource<S> {
    pub const fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: ListingSource> ListingSource for RetryingListingSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let label = format!("Listing source '{}'", self.inner.name());
        match self
            .policy
            .run(&label, || self.inner.fetch(), SourceError::is_retryable)
            .await
        {
            Ok(records) => {
                info!("📥 {} yielded {} candidates", label, records.len());
                Ok(records)
            }
            // Non-retryable errors surface as they are
            Err((error, _)) if !error.is_retryable() => Err(error),
            Err((error, attempts)) => Err(SourceError::Exhausted {
                attempts,
                last_error: error.to_string(),
            }),
        }
    }
}
