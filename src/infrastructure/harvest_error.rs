//! Error types for the harvest pipeline
//!
//! Failures are contained at the granularity where they happen: an
//! [`EnrichmentError`] only ever costs one image slot, a [`SourceError`] aborts
//! a run before anything is written, and a [`StoreError`] on save is the one
//! failure that reaches the process exit status (see [`HarvestError`]).

use thiserror::Error;

/// Failure of the fetch, decode, transform or write step for a single image
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("Invalid image URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Image fetch failed: {url} - {reason}")]
    Fetch { url: String, reason: String },

    #[error("Image request returned HTTP {status}: {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Payload is not a usable image: {url} - {reason}")]
    Decode { url: String, reason: String },

    #[error("Image encoding failed: {reason}")]
    Encode { reason: String },

    #[error("Image write failed: {path} - {reason}")]
    Write { path: String, reason: String },

    #[error("Enrichment task panicked: {reason}")]
    TaskPanicked { reason: String },
}

impl EnrichmentError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(url: &str, reason: impl ToString) -> Self {
        Self::Decode {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::Write {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether a later run could plausibly succeed for the same image.
    ///
    /// Only used to grade log output; enrichment is never retried in-run.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { .. } | Self::Write { .. } | Self::TaskPanicked { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidUrl { .. } | Self::Decode { .. } | Self::Encode { .. } => false,
        }
    }
}

/// Snapshot persistence failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read snapshot {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse snapshot {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Failed to write snapshot {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Failed to serialize snapshot: {reason}")]
    Serialize { reason: String },
}

/// Listing source failure
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("Listing source '{source_name}' unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Listing source '{source_name}' returned malformed data: {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("Listing source gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl SourceError {
    /// Malformed payloads will not fix themselves on retry
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Failure that ends a harvest run
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Raised before anything is written; the prior snapshot is untouched
    #[error("Listing source failed, nothing was written: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to save snapshot, this run's results are lost: {0}")]
    Save(#[from] StoreError),
}

impl HarvestError {
    /// Only a lost save is reflected in the process exit status
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Save(_))
    }
}
