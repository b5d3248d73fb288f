//! Incremental merge of a harvest into the prior snapshot
//!
//! The merge is additive: nothing in the prior snapshot is dropped because a
//! harvest failed to observe it again. Re-harvested records replace their prior
//! version wholesale, except that already downloaded images are carried forward
//! when the incoming record has none.

use std::collections::HashSet;
use tracing::debug;

use super::identity::IdentityKey;
use super::record::{RawRecord, Record};
use super::snapshot::Snapshot;

/// Outcome of one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: Snapshot,
    /// Records whose identity was absent from the prior snapshot, in harvest
    /// order, one per identity
    pub new_batch: Vec<Record>,
    /// Harvested records re-observing a known identity
    pub refreshed: usize,
}

/// Admissibility gate applied to a raw harvest.
///
/// Returns the admitted records in harvest order; rejected candidates are
/// only reflected in the shorter result.
#[must_use]
pub fn admit_all(raw: &[RawRecord]) -> Vec<Record> {
    let admitted: Vec<Record> = raw.iter().filter_map(Record::admit).collect();
    if admitted.len() < raw.len() {
        debug!(
            "Admissibility gate rejected {} of {} candidates",
            raw.len() - admitted.len(),
            raw.len()
        );
    }
    admitted
}

/// Merges admitted harvest records into `prior`.
///
/// Pure: persistence is the caller's job. Within the harvest, a later record
/// with the same identity overwrites an earlier one in `merged`, while
/// `new_batch` keeps the first occurrence.
#[must_use]
pub fn merge(prior: &Snapshot, harvested: &[Record]) -> MergeOutcome {
    let mut merged = prior.clone();
    let mut new_batch = Vec::new();
    let mut batched: HashSet<IdentityKey> = HashSet::new();
    let mut refreshed = 0usize;

    for record in harvested {
        let key = record.identity();

        if prior.contains(&key) {
            refreshed += 1;
        } else if batched.insert(key.clone()) {
            new_batch.push(record.clone());
        }

        let incoming = match merged.get(&key) {
            Some(existing) => carry_forward_local_images(existing, record.clone()),
            None => record.clone(),
        };
        merged.upsert(incoming);
    }

    debug!(
        "Merged {} harvested records into {} prior: {} new, {} refreshed, {} total",
        harvested.len(),
        prior.len(),
        new_batch.len(),
        refreshed,
        merged.len()
    );

    MergeOutcome {
        merged,
        new_batch,
        refreshed,
    }
}

/// Keeps the existing record's local image fields when the incoming version
/// lacks them.
fn carry_forward_local_images(existing: &Record, mut incoming: Record) -> Record {
    let incoming_main_missing = incoming
        .main_image_local
        .as_deref()
        .is_none_or(str::is_empty);
    if incoming_main_missing {
        if let Some(path) = existing.main_image_local.as_deref().filter(|p| !p.is_empty()) {
            incoming.main_image_local = Some(path.to_string());
        }
    }
    if incoming.other_images_local.is_empty() && !existing.other_images_local.is_empty() {
        incoming
            .other_images_local
            .clone_from(&existing.other_images_local);
    }
    incoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(link: &str) -> Record {
        Record::admit(&RawRecord::new("T", "1", link, &["http://i/1.jpg"])).unwrap()
    }

    fn enriched(link: &str, main: &str, extras: &[&str]) -> Record {
        let mut r = record(link);
        r.main_image_local = Some(main.to_string());
        r.other_images_local = extras.iter().map(|e| (*e).to_string()).collect();
        r
    }

    #[test]
    fn empty_prior_makes_everything_new() {
        let outcome = merge(&Snapshot::new(), &[record("http://s/a?x=1")]);

        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.new_batch.len(), 1);
        assert_eq!(outcome.new_batch[0].identity().as_str(), "http://s/a");
    }

    #[test]
    fn known_identities_are_not_new() {
        let prior = Snapshot::from_records(vec![record("http://s/a")]);
        let outcome = merge(&prior, &[record("http://s/A/?ref=2"), record("http://s/b")]);

        assert_eq!(outcome.merged.len(), 2);
        assert_eq!(outcome.refreshed, 1);
        let new_keys: Vec<_> = outcome.new_batch.iter().map(Record::identity).collect();
        assert_eq!(new_keys, vec![IdentityKey::from_link("http://s/b")]);
    }

    #[test]
    fn duplicate_harvest_entries_enter_new_batch_once() {
        let mut second = record("http://s/a?page=2");
        second.title = "second".into();
        let outcome = merge(&Snapshot::new(), &[record("http://s/a"), second]);

        assert_eq!(outcome.new_batch.len(), 1);
        assert_eq!(outcome.new_batch[0].title, "T");
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged.records()[0].title, "second");
    }

    #[test]
    fn unobserved_prior_records_survive() {
        let prior = Snapshot::from_records(vec![record("http://s/a"), record("http://s/b")]);
        let outcome = merge(&prior, &[]);

        assert_eq!(outcome.merged, prior);
        assert!(outcome.new_batch.is_empty());
    }

    #[test]
    fn re_harvest_keeps_downloaded_images() {
        let prior = Snapshot::from_records(vec![enriched(
            "http://s/a",
            "img/1.jpg",
            &["img/1_extra.jpg"],
        )]);
        let mut rescraped = record("http://s/a/");
        rescraped.price = "200".into();
        let outcome = merge(&prior, &[rescraped]);

        let merged = outcome.merged.get(&IdentityKey::from_link("http://s/a")).unwrap();
        assert_eq!(merged.price, "200");
        assert_eq!(merged.main_image_local.as_deref(), Some("img/1.jpg"));
        assert_eq!(merged.other_images_local, vec!["img/1_extra.jpg"]);
    }

    #[test]
    fn incoming_local_images_win_over_prior() {
        let prior = Snapshot::from_records(vec![enriched("http://s/a", "old.jpg", &["old_1.jpg"])]);
        let incoming = enriched("http://s/a", "new.jpg", &["new_1.jpg"]);
        let outcome = merge(&prior, &[incoming]);

        let merged = &outcome.merged.records()[0];
        assert_eq!(merged.main_image_local.as_deref(), Some("new.jpg"));
        assert_eq!(merged.other_images_local, vec!["new_1.jpg"]);
    }

    #[test]
    fn admit_all_filters_inadmissible_candidates() {
        let raw = vec![
            RawRecord::new("A", "1", "http://s/a", &["http://i/a.jpg"]),
            RawRecord::new("", "1", "http://s/b", &["http://i/b.jpg"]),
            RawRecord::new("C", "1", "http://s/c", &[]),
        ];

        let admitted = admit_all(&raw);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].link, "http://s/a");
    }

    fn link_strategy() -> impl Strategy<Value = String> {
        (0u8..12, prop::bool::ANY, prop::bool::ANY).prop_map(|(id, slash, query)| {
            let mut link = format!("http://s/item-{id}");
            if slash {
                link.push('/');
            }
            if query {
                link.push_str("?ref=feed");
            }
            link
        })
    }

    proptest! {
        #[test]
        fn merge_is_additive_and_new_batch_exact(
            prior_links in prop::collection::vec(link_strategy(), 0..10),
            harvest_links in prop::collection::vec(link_strategy(), 0..10),
        ) {
            let prior = Snapshot::from_records(prior_links.iter().map(|l| record(l)));
            let harvest: Vec<Record> = harvest_links.iter().map(|l| record(l)).collect();
            let outcome = merge(&prior, &harvest);

            for key in prior.keys() {
                prop_assert!(outcome.merged.contains(&key));
            }

            let expected: HashSet<IdentityKey> = harvest
                .iter()
                .map(Record::identity)
                .filter(|k| !prior.contains(k))
                .collect();
            let actual: Vec<IdentityKey> = outcome.new_batch.iter().map(Record::identity).collect();
            let actual_set: HashSet<IdentityKey> = actual.iter().cloned().collect();
            prop_assert_eq!(actual.len(), actual_set.len());
            prop_assert_eq!(actual_set, expected);

            let union: HashSet<IdentityKey> = prior.keys().chain(harvest.iter().map(Record::identity)).collect();
            prop_assert_eq!(outcome.merged.len(), union.len());
        }
    }
}
