//! Versioned key table shared by the store backends.

use super::{Guard, KeyValue, Op, Txn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
    value: Vec<u8>,
    version: i64,
    create_revision: i64,
    mod_revision: i64,
}

/// Ordered map of keys with etcd-style versions and a global revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedTable {
    revision: i64,
    entries: BTreeMap<Vec<u8>, Entry>,
}

impl VersionedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revision of the last successful write
    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<KeyValue> {
        self.entries.get(key).map(|entry| to_key_value(key, entry))
    }

    pub fn scan(&self, prefix: &[u8], limit: Option<usize>) -> Vec<KeyValue> {
        let matching = self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| to_key_value(key, entry));

        match limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    pub fn delete_prefix(&mut self, prefix: &[u8]) -> usize {
        let doomed: Vec<Vec<u8>> = self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        if doomed.is_empty() {
            return 0;
        }

        self.revision += 1;
        for key in &doomed {
            self.entries.remove(key);
        }
        doomed.len()
    }

    fn version_of(&self, key: &[u8]) -> i64 {
        self.entries.get(key).map_or(0, |entry| entry.version)
    }

    fn holds(&self, guard: &Guard) -> bool {
        match guard {
            Guard::Absent(key) => self.version_of(key) == 0,
            Guard::Present(key) => self.version_of(key) > 0,
            Guard::VersionEquals(key, version) => self.version_of(key) == *version,
            Guard::ValueEquals(key, value) => self
                .entries
                .get(key)
                .is_some_and(|entry| &entry.value == value),
        }
    }

    /// Apply the transaction if all guards hold; otherwise leave the table untouched
    pub fn commit(&mut self, txn: &Txn) -> bool {
        if !txn.guards.iter().all(|guard| self.holds(guard)) {
            return false;
        }

        if txn.ops.is_empty() {
            return true;
        }

        self.revision += 1;
        let revision = self.revision;
        for op in &txn.ops {
            match op {
                Op::Put(key, value) => {
                    let entry = self.entries.entry(key.clone()).or_insert(Entry {
                        value: Vec::new(),
                        version: 0,
                        create_revision: revision,
                        mod_revision: revision,
                    });
                    entry.value = value.clone();
                    entry.version += 1;
                    entry.mod_revision = revision;
                }
                Op::Delete(key) => {
                    self.entries.remove(key);
                }
            }
        }
        true
    }
}

fn to_key_value(key: &[u8], entry: &Entry) -> KeyValue {
    KeyValue {
        key: key.to_vec(),
        value: entry.value.clone(),
        version: entry.version,
        mod_revision: entry.mod_revision,
    }
}
