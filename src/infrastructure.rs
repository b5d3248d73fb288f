//! Infrastructure layer for files, HTTP, images and process setup
//!
//! Implements the collaborator traits declared in `domain` and carries the
//! ambient pieces: configuration, logging, retry policy and error types.

pub mod config;
pub mod csv_export;
pub mod harvest_error;
pub mod http_client;
pub mod image_store;
pub mod image_transform;
pub mod listing_source;
pub mod logging;
pub mod relink;
pub mod retry_policy;
pub mod snapshot_store;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager};
pub use csv_export::export_csv;
pub use harvest_error::{EnrichmentError, HarvestError, SourceError, StoreError};
pub use http_client::{HttpClientConfig, HttpImageFetcher};
pub use image_store::LocalImageStore;
pub use image_transform::ImageTransformer;
pub use listing_source::{JsonFileListingSource, RetryingListingSource, StaticListingSource};
pub use logging::{get_log_directory, init_logging, init_logging_with_config, log_system_info};
pub use relink::{RelinkReport, relink_local_images};
pub use retry_policy::RetryPolicy;
pub use snapshot_store::JsonSnapshotStore;
