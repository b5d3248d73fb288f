//! Listing records and the admissibility gate
//!
//! Raw candidates arrive from a listing source with best-effort fields. They
//! are validated exactly once by [`Record::admit`]; everything downstream works
//! with the strongly-shaped [`Record`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::identity::{IdentityKey, normalize_image_url, normalize_link};

/// Candidate record as yielded by a listing source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRecord {
    pub title: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "url")]
    pub link: Option<String>,
    #[serde(alias = "image_urls")]
    pub image_urls: Vec<String>,
    /// Single-image form emitted by list-page scrapers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl RawRecord {
    /// Convenience constructor for the common case of a fully populated candidate
    #[must_use]
    pub fn new(title: &str, price: &str, link: &str, image_urls: &[&str]) -> Self {
        Self {
            title: Some(title.to_string()),
            price: Some(price.to_string()),
            link: Some(link.to_string()),
            image_urls: image_urls.iter().map(|u| (*u).to_string()).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    /// All image references in discovery order, including the single-image alias
    fn all_image_urls(&self) -> impl Iterator<Item = &str> {
        self.image_urls
            .iter()
            .map(String::as_str)
            .chain(self.image.as_deref())
    }
}

/// One admitted listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub price: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(alias = "url")]
    pub link: String,
    #[serde(rename = "main_image", alias = "image")]
    pub main_image_remote: String,
    #[serde(rename = "other_images", default)]
    pub other_images_remote: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_image_local: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_images_local: Vec<String>,
}

impl Record {
    /// Validates a raw candidate.
    ///
    /// Returns `None` when the title, price or link is blank, when the link
    /// normalizes to an empty identity, or when no image reference survives. Image references are trimmed and de-duplicated by
    /// their normalized value, first occurrence wins; the first one becomes the
    /// main image.
    #[must_use]
    pub fn admit(raw: &RawRecord) -> Option<Self> {
        let title = non_blank(raw.title.as_deref())?;
        let price = non_blank(raw.price.as_deref())?;
        let link = non_blank(raw.link.as_deref())?;
        if normalize_link(&link).is_empty() {
            return None;
        }

        let mut seen = HashSet::new();
        let mut images = raw
            .all_image_urls()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .filter(|url| {
                let key = normalize_image_url(url);
                !key.is_empty() && seen.insert(key)
            })
            .map(str::to_string);

        let main_image_remote = images.next()?;
        let other_images_remote = images.collect();

        Some(Self {
            title,
            price,
            description: raw.description.as_deref().map(str::trim).unwrap_or_default().to_string(),
            location: raw.location.as_deref().map(str::trim).unwrap_or_default().to_string(),
            link,
            main_image_remote,
            other_images_remote,
            main_image_local: None,
            other_images_local: Vec::new(),
        })
    }

    /// Identity of this record, recomputed from the link on every call
    #[must_use]
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::from_link(&self.link)
    }

    /// Whether any local image field is populated
    #[must_use]
    pub fn has_local_images(&self) -> bool {
        self.main_image_local.as_deref().is_some_and(|p| !p.is_empty())
            || !self.other_images_local.is_empty()
    }

    /// Remote references in enrichment order: main first, then extras
    pub fn remote_images(&self) -> impl Iterator<Item = (ImageSlot, &str)> {
        std::iter::once((ImageSlot::Main, self.main_image_remote.as_str())).chain(
            self.other_images_remote
                .iter()
                .enumerate()
                .map(|(i, url)| (ImageSlot::Extra(i + 1), url.as_str())),
        )
    }
}

/// Position of an image within its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Main,
    /// 1-based position among the extra images
    Extra(usize),
}

impl ImageSlot {
    /// File stem used for this slot in local storage
    #[must_use]
    pub fn file_stem(self) -> String {
        match self {
            Self::Main => "main".to_string(),
            Self::Extra(n) => format!("extra_{n}"),
        }
    }
}

impl std::fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_stem())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn admits_complete_candidate() {
        let raw = RawRecord::new("A", "100", "http://s/a?x=1", &["http://i/1.jpg", "http://i/2.jpg"])
            .with_location(" Nairobi ");
        let record = Record::admit(&raw).expect("complete candidate is admissible");

        assert_eq!(record.main_image_remote, "http://i/1.jpg");
        assert_eq!(record.other_images_remote, vec!["http://i/2.jpg"]);
        assert_eq!(record.location, "Nairobi");
        assert_eq!(record.description, "");
        assert_eq!(record.identity().as_str(), "http://s/a");
        assert!(record.main_image_local.is_none());
    }

    #[test]
    fn rejects_missing_required_fields() {
        let base = RawRecord::new("A", "100", "http://s/a", &["http://i/1.jpg"]);

        let no_title = RawRecord { title: Some("   ".into()), ..base.clone() };
        let no_price = RawRecord { price: None, ..base.clone() };
        let no_link = RawRecord { link: Some(String::new()), ..base.clone() };
        let no_images = RawRecord { image_urls: vec![" ".into()], ..base.clone() };

        assert!(Record::admit(&no_title).is_none());
        assert!(Record::admit(&no_price).is_none());
        assert!(Record::admit(&no_link).is_none());
        assert!(Record::admit(&no_images).is_none());
        assert!(Record::admit(&base).is_some());
    }

    #[rstest]
    #[case("?ref=1")]
    #[case("///")]
    #[case(" / ")]
    fn rejects_link_without_identity(#[case] link: &str) {
        let raw = RawRecord::new("A", "100", link, &["http://i/1.jpg"]);
        assert!(Record::admit(&raw).is_none());
    }

    #[test]
    fn deduplicates_images_by_normalized_url() {
        let raw = RawRecord::new(
            "A",
            "1",
            "http://s/a",
            &[
                "http://i/1.jpg?w=100",
                "http://i/2.jpg",
                "http://i/1.jpg",
                "http://i/2.jpg/",
                "http://i/3.jpg",
            ],
        );
        let record = Record::admit(&raw).unwrap();

        assert_eq!(record.main_image_remote, "http://i/1.jpg?w=100");
        assert_eq!(record.other_images_remote, vec!["http://i/2.jpg", "http://i/3.jpg"]);
    }

    #[test]
    fn single_image_alias_is_accepted() {
        let raw: RawRecord = serde_json::from_str(
            r#"{"title":"T","price":"KSh 5","url":"http://s/t","image":"http://i/t.jpg"}"#,
        )
        .unwrap();
        let record = Record::admit(&raw).unwrap();

        assert_eq!(record.link, "http://s/t");
        assert_eq!(record.main_image_remote, "http://i/t.jpg");
    }

    #[test]
    fn remote_images_are_ordered_main_first() {
        let raw = RawRecord::new("A", "1", "http://s/a", &["m", "e1", "e2"]);
        let record = Record::admit(&raw).unwrap();
        let slots: Vec<_> = record.remote_images().collect();

        assert_eq!(
            slots,
            vec![
                (ImageSlot::Main, "m"),
                (ImageSlot::Extra(1), "e1"),
                (ImageSlot::Extra(2), "e2"),
            ]
        );
        assert_eq!(ImageSlot::Extra(2).file_stem(), "extra_2");
    }

    #[test]
    fn snapshot_fields_use_snake_case_keys() {
        let mut record = Record::admit(&RawRecord::new("A", "1", "http://s/a", &["m"])).unwrap();
        record.main_image_local = Some("images/a/main.jpg".into());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["main_image"], "m");
        assert_eq!(json["main_image_local"], "images/a/main.jpg");
        assert!(json.get("other_images_local").is_none());
    }
}
