//! Index Directory
//!
//! The active table plus every closed segment's frozen table.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::Key;

use super::IndexTable;

/// Where a key's current record lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub segment_id: u64,
    pub offset: u64,
}

/// Frozen index of a closed segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedTable {
    /// Size of the segment file when it was closed
    pub size: u64,
    pub table: IndexTable,
}

/// Closed tables keyed by segment id (ascending = oldest → newest)
pub type ClosedTables = BTreeMap<u64, Arc<ClosedTable>>;

/// Resolves keys across the active and closed index tables
///
/// ## Concurrency:
/// Not internally synchronized; the store keeps it behind a `RwLock`. The
/// closed set is an immutable `Arc` snapshot that freeze and compaction
/// replace wholesale, so a snapshot handed out by `closed_snapshot` never
/// changes underneath its holder.
#[derive(Debug, Clone, Default)]
pub struct IndexDirectory {
    /// Id of the segment the active table describes
    active_id: u64,
    /// Mutable table for the active segment
    active: IndexTable,
    /// Published closed-segment snapshot
    closed: Arc<ClosedTables>,
    /// Committed compaction outputs whose `.compact` files may not have been
    /// renamed into place yet
    pending_install: Vec<u64>,
}

impl IndexDirectory {
    /// Empty directory whose active segment is `active_id`
    pub fn new(active_id: u64) -> Self {
        Self::with_tables(active_id, IndexTable::new(), ClosedTables::new())
    }

    pub fn with_tables(active_id: u64, active: IndexTable, closed: ClosedTables) -> Self {
        Self {
            active_id,
            active,
            closed: Arc::new(closed),
            pending_install: Vec::new(),
        }
    }

    /// Resolve `key` to its most recent location
    ///
    /// Search order:
    /// 1. Active table
    /// 2. Closed tables, highest segment id first
    pub fn resolve(&self, key: Key) -> Option<Location> {
        if let Some(offset) = self.active.get(key) {
            return Some(Location {
                segment_id: self.active_id,
                offset,
            });
        }

        self.closed.iter().rev().find_map(|(&segment_id, closed)| {
            closed.table.get(key).map(|offset| Location { segment_id, offset })
        })
    }

    /// Record `key` at `offset` in the active segment
    pub fn record_active(&mut self, key: Key, offset: u64) {
        self.active.insert(key, offset);
    }

    /// Move the active table into the closed set under `segment_id`
    ///
    /// `segment_size` is the closed file's final size. A fresh empty table
    /// becomes active for segment `segment_id + 1`.
    pub fn freeze_active(&mut self, segment_id: u64, segment_size: u64) {
        let table = std::mem::take(&mut self.active);

        let mut closed = ClosedTables::clone(&self.closed);
        closed.insert(
            segment_id,
            Arc::new(ClosedTable {
                size: segment_size,
                table,
            }),
        );

        self.closed = Arc::new(closed);
        self.active_id = segment_id + 1;
    }

    /// Remove `retired_ids` from the closed set and insert `new_tables`
    /// in one step
    pub fn replace_closed(&mut self, new_tables: ClosedTables, retired_ids: &[u64]) {
        let mut closed = ClosedTables::clone(&self.closed);
        for id in retired_ids {
            closed.remove(id);
        }
        closed.extend(new_tables);

        self.closed = Arc::new(closed);
    }

    /// Compaction outputs still waiting to be renamed into place
    pub fn pending_install(&self) -> &[u64] {
        &self.pending_install
    }

    pub fn set_pending_install(&mut self, ids: Vec<u64>) {
        self.pending_install = ids;
    }

    /// Is segment `id` possibly still at its `.compact` path
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending_install.contains(&id)
    }

    /// Current closed-set snapshot
    pub fn closed_snapshot(&self) -> Arc<ClosedTables> {
        Arc::clone(&self.closed)
    }

    pub fn active_id(&self) -> u64 {
        self.active_id
    }

    pub fn active_table(&self) -> &IndexTable {
        &self.active
    }

    /// Closed segment ids, ascending
    pub fn closed_ids(&self) -> Vec<u64> {
        self.closed.keys().copied().collect()
    }

    /// Number of distinct keys across all tables
    pub fn key_count(&self) -> usize {
        let mut keys: HashSet<Key> = self.active.keys().collect();
        for closed in self.closed.values() {
            keys.extend(closed.table.keys());
        }
        keys.len()
    }
}
