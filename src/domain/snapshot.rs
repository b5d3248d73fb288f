//! Keyed, insertion-ordered record set

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

use super::identity::IdentityKey;
use super::record::Record;

/// Every known record, unique by identity.
///
/// Insertion order is kept so persisted snapshots diff cleanly between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: Vec<Record>,
    index: HashMap<IdentityKey, usize>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from stored records; a later record with an already
    /// seen identity replaces the earlier one in place.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.upsert(record);
        }
        snapshot
    }

    /// Inserts or replaces by identity, returning the replaced record
    pub fn upsert(&mut self, record: Record) -> Option<Record> {
        let key = record.identity();
        if let Some(&position) = self.index.get(&key) {
            Some(std::mem::replace(&mut self.records[position], record))
        } else {
            self.index.insert(key, self.records.len());
            self.records.push(record);
            None
        }
    }

    #[must_use]
    pub fn get(&self, key: &IdentityKey) -> Option<&Record> {
        self.index.get(key).map(|&position| &self.records[position])
    }

    pub fn get_mut(&mut self, key: &IdentityKey) -> Option<&mut Record> {
        self.index.get(key).map(|&position| &mut self.records[position])
    }

    #[must_use]
    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.index.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Mutable access for in-place field updates; identity-changing edits are
    /// not allowed, the link must stay as is.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Record> {
        self.records.iter_mut()
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn keys(&self) -> impl Iterator<Item = IdentityKey> + '_ {
        self.records.iter().map(Record::identity)
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<Record> for Snapshot {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self::from_records(iter)
    }
}

// Persisted as a plain array, the identity index is rebuilt on load.
impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<Record>::deserialize(deserializer)?;
        Ok(Self::from_records(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::RawRecord;

    fn record(link: &str, title: &str) -> Record {
        Record::admit(&RawRecord::new(title, "1", link, &["http://i/x.jpg"])).unwrap()
    }

    #[test]
    fn upsert_replaces_by_identity_in_place() {
        let mut snapshot = Snapshot::new();
        snapshot.upsert(record("http://s/a", "first"));
        snapshot.upsert(record("http://s/b", "second"));
        let replaced = snapshot.upsert(record("HTTP://S/A/?ref=9", "updated"));

        assert_eq!(replaced.map(|r| r.title), Some("first".to_string()));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.records()[0].title, "updated");
        assert_eq!(snapshot.records()[1].title, "second");
    }

    #[test]
    fn json_round_trip_rebuilds_index() {
        let snapshot: Snapshot = vec![record("http://s/a", "a"), record("http://s/b", "b")]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: Snapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, snapshot);
        assert!(restored.contains(&IdentityKey::from_link("http://s/b/")));
    }

    #[test]
    fn loading_collapses_duplicate_identities() {
        let restored = Snapshot::from_records(vec![
            record("http://s/a", "old"),
            record("http://s/a?dup=1", "new"),
        ]);

        assert_eq!(restored.len(), 1);
        assert_eq!(restored.records()[0].title, "new");
    }
}
