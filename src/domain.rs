//! Domain module - identity, records and the merge engine
//!
//! Everything here is pure apart from the collaborator traits, which are
//! implemented in `infrastructure`.

pub mod identity;
pub mod merge;
pub mod record;
pub mod repositories;
pub mod services;
pub mod snapshot;

pub use identity::{IdentityKey, normalize_image_url, normalize_link};
pub use merge::{MergeOutcome, admit_all, merge};
pub use record::{ImageSlot, RawRecord, Record};
pub use repositories::SnapshotStore;
pub use services::{ImageFetcher, ListingSource};
pub use snapshot::Snapshot;
