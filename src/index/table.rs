//! Index Table
//!
//! Key → byte offset for a single segment.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Key;

/// Hash index over one segment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexTable {
    offsets: HashMap<Key, u64>,
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest offset for `key`, replacing any earlier one
    pub fn insert(&mut self, key: Key, offset: u64) {
        self.offsets.insert(key, offset);
    }

    pub fn get(&self, key: Key) -> Option<u64> {
        self.offsets.get(&key).copied()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.offsets.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.offsets.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, u64)> + '_ {
        self.offsets.iter().map(|(&k, &off)| (k, off))
    }

    /// Entries ordered by offset (file order)
    pub fn entries_by_offset(&self) -> Vec<(Key, u64)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable_by_key(|&(_, offset)| offset);
        entries
    }
}

impl FromIterator<(Key, u64)> for IndexTable {
    /// Later pairs win, matching replay order
    fn from_iter<I: IntoIterator<Item = (Key, u64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (key, offset) in iter {
            table.insert(key, offset);
        }
        table
    }
}
