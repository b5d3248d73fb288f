//! Record identity normalization
//!
//! A listing is identified by its source link. Tracking parameters, trailing
//! slashes and letter case must not fragment identity, so every comparison goes
//! through [`normalize_link`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identity of a listing, derived from its link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Derives the identity key for a link
    #[must_use]
    pub fn from_link(link: &str) -> Self {
        Self(normalize_link(link))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalizes a link into an identity string.
///
/// Drops everything from the first `?`, strips trailing `/`, trims surrounding
/// whitespace and lower-cases the rest. Total and idempotent; the empty string
/// maps to itself.
///
/// ```
/// use listing_harvester::domain::identity::normalize_link;
///
/// assert_eq!(normalize_link("https://x/a?ref=1"), normalize_link("https://x/a/"));
/// ```
#[must_use]
pub fn normalize_link(link: &str) -> String {
    let without_query = link.split_once('?').map_or(link, |(head, _)| head);
    strip_tail(without_query).to_lowercase()
}

/// Normalizes an image reference for de-duplication among a record's images.
///
/// Unlike [`normalize_link`] the case is preserved, image hosts are frequently
/// case-sensitive in their paths.
#[must_use]
pub fn normalize_image_url(url: &str) -> String {
    let without_query = url.split_once('?').map_or(url, |(head, _)| head);
    strip_tail(without_query).to_string()
}

// Slashes and whitespace interleave in the wild ("a/ /"), strip them together.
fn strip_tail(value: &str) -> &str {
    value
        .trim_start()
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace())
}
