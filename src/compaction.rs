//! Compaction: merging closed segments
//!
//! Closed segments accumulate shadowed records: values whose key was written
//! again later. Compaction copies only the newest record of each key into
//! fresh, densely packed segments and retires the originals.
//!
//! Crash safety comes from writing aside and committing through metadata:
//! 1. Write output to `{prefix}{id}.compact` files and sync them
//! 2. Commit a closed-index snapshot naming the outputs as pending
//! 3. Rename each output over `{prefix}{id}`
//! 4. Delete retired segments whose id was not reused
//! 5. Save the snapshot again with nothing pending
//!
//! If the process dies:
//! - Before step 2: the originals are untouched and recovery deletes the
//!   `.compact` files
//! - After step 2: recovery sees the pending ids and finishes steps 3–5
//!
//! If step 3 or 4 fails while the store is running, the pending ids stay in
//! the index (and in every snapshot saved meanwhile). Reads of a pending id
//! fall back to its `.compact` file, and the next `compact` or `close` retries
//! the install.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CompactionOrder;
use crate::error::Result;
use crate::index::{ClosedTable, ClosedTables, IndexTable};
use crate::segment::{SegmentDir, SegmentWriter};
use crate::Key;

/// Outcome of a compaction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Closed segments consumed
    pub segments_in: usize,
    /// Segments produced
    pub segments_out: usize,
    /// Index entries across the consumed segments
    pub records_in: usize,
    /// Records copied into the output
    pub records_out: usize,
    /// Bytes across the consumed segments
    pub bytes_before: u64,
    /// Bytes across the produced segments
    pub bytes_after: u64,
    /// Nothing was changed
    pub skipped: bool,
}

impl CompactionStats {
    pub(crate) fn skipped(inputs: &ClosedTables) -> Self {
        Self {
            segments_in: inputs.len(),
            records_in: inputs.values().map(|c| c.table.len()).sum(),
            bytes_before: inputs.values().map(|c| c.size).sum(),
            skipped: true,
            ..Self::default()
        }
    }

    /// Shadowed records that were dropped
    pub fn records_dropped(&self) -> usize {
        self.records_in.saturating_sub(self.records_out)
    }

    /// Space saved in bytes
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Output of the write phase, not yet visible to readers
#[derive(Debug)]
pub struct CompactionOutput {
    /// Index tables for the new segments, keyed by their final ids
    pub tables: ClosedTables,
    pub stats: CompactionStats,
}

impl CompactionOutput {
    pub fn segment_ids(&self) -> Vec<u64> {
        self.tables.keys().copied().collect()
    }
}

/// A record chosen to survive compaction
#[derive(Debug, Clone, Copy)]
struct Survivor {
    segment_id: u64,
    key: Key,
    offset: u64,
}

/// Rewrites a set of closed segments
pub struct Compactor<'a> {
    dir: &'a SegmentDir,
    max_segment_size: u64,
    order: CompactionOrder,
}

impl<'a> Compactor<'a> {
    pub fn new(dir: &'a SegmentDir, max_segment_size: u64, order: CompactionOrder) -> Self {
        Self {
            dir,
            max_segment_size,
            order,
        }
    }

    /// Write the compacted form of `inputs` as `.compact` files
    ///
    /// Keys in `shadowed` have a newer value outside `inputs` (the active
    /// segment) and are dropped. Output ids are assigned from 0 and must stay
    /// below `id_limit`; if more are needed the partial output is removed and
    /// `Ok(None)` is returned. On error the partial output is removed too.
    pub fn write_output(
        &self,
        inputs: &ClosedTables,
        shadowed: &HashSet<Key>,
        id_limit: u64,
    ) -> Result<Option<CompactionOutput>> {
        let survivors = self.select(inputs, shadowed);

        let tables = match self.write_survivors(&survivors, id_limit) {
            Ok(Some(tables)) => tables,
            Ok(None) => {
                self.discard();
                return Ok(None);
            }
            Err(e) => {
                self.discard();
                return Err(e);
            }
        };

        let stats = CompactionStats {
            segments_in: inputs.len(),
            segments_out: tables.len(),
            records_in: inputs.values().map(|c| c.table.len()).sum(),
            records_out: survivors.len(),
            bytes_before: inputs.values().map(|c| c.size).sum(),
            bytes_after: tables.values().map(|c| c.size).sum(),
            skipped: false,
        };

        Ok(Some(CompactionOutput { tables, stats }))
    }

    /// Move committed output into place and delete retired segments
    ///
    /// Outputs already renamed by an earlier, interrupted attempt are skipped,
    /// so a failed install can be retried.
    pub fn install(&self, output_ids: &[u64], retired_ids: &[u64]) -> Result<()> {
        for &id in output_ids {
            let compact_path = self.dir.compact_path(id);
            if compact_path.exists() {
                fs::rename(compact_path, self.dir.segment_path(id))?;
            }
        }

        for id in retired_ids {
            if output_ids.contains(id) {
                continue;
            }
            match fs::remove_file(self.dir.segment_path(*id)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.dir.sync()
    }

    /// Remove every `.compact` file (best effort)
    pub fn discard(&self) {
        let ids = match self.dir.list_compact_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "could not list compaction output for cleanup");
                return;
            }
        };

        for id in ids {
            if let Err(e) = fs::remove_file(self.dir.compact_path(id)) {
                warn!(segment_id = id, error = %e, "could not remove compaction output");
            }
        }
    }

    /// Choose the newest record of every key, in output order
    fn select(&self, inputs: &ClosedTables, shadowed: &HashSet<Key>) -> Vec<Survivor> {
        match self.order {
            CompactionOrder::NewestFirst => {
                // First writer wins while walking newest → oldest
                let mut placed = HashSet::new();
                let mut survivors = Vec::new();

                for (&segment_id, closed) in inputs.iter().rev() {
                    for (key, offset) in closed.table.entries_by_offset() {
                        if shadowed.contains(&key) || !placed.insert(key) {
                            continue;
                        }
                        survivors.push(Survivor {
                            segment_id,
                            key,
                            offset,
                        });
                    }
                }
                survivors
            }
            CompactionOrder::OldestFirst => {
                // Last writer wins while walking oldest → newest
                let mut latest: HashMap<Key, Survivor> = HashMap::new();

                for (&segment_id, closed) in inputs.iter() {
                    for (key, offset) in closed.table.entries_by_offset() {
                        if shadowed.contains(&key) {
                            continue;
                        }
                        latest.insert(
                            key,
                            Survivor {
                                segment_id,
                                key,
                                offset,
                            },
                        );
                    }
                }

                let mut survivors: Vec<Survivor> = latest.into_values().collect();
                survivors.sort_unstable_by_key(|s| (s.segment_id, s.offset));
                survivors
            }
        }
    }

    /// Copy survivors into size-bounded output segments
    fn write_survivors(
        &self,
        survivors: &[Survivor],
        id_limit: u64,
    ) -> Result<Option<ClosedTables>> {
        let mut tables = ClosedTables::new();
        let mut current: Option<(SegmentWriter, IndexTable)> = None;

        for survivor in survivors {
            let line = self
                .dir
                .read_raw(survivor.segment_id, survivor.offset, survivor.key)?;
            let len = line.len() as u64;

            let full = match &current {
                Some((writer, _)) => {
                    !writer.is_empty() && writer.size() + len > self.max_segment_size
                }
                None => true,
            };

            if full {
                if let Some((writer, table)) = current.take() {
                    tables.insert(writer.id(), finish(writer, table)?);
                }

                let id = tables.len() as u64;
                if id >= id_limit {
                    warn!(
                        needed = id + 1,
                        available = id_limit,
                        "compaction output needs more segment ids than are free, skipping"
                    );
                    return Ok(None);
                }
                let writer = SegmentWriter::create(&self.dir.compact_path(id), id)?;
                current = Some((writer, IndexTable::new()));
            }

            if let Some((writer, table)) = current.as_mut() {
                let offset = writer.append(&line)?;
                table.insert(survivor.key, offset);
            }
        }

        if let Some((writer, table)) = current.take() {
            tables.insert(writer.id(), finish(writer, table)?);
        }

        self.dir.sync()?;
        Ok(Some(tables))
    }
}

/// Sync a finished output segment and freeze its table
fn finish(writer: SegmentWriter, table: IndexTable) -> Result<Arc<ClosedTable>> {
    writer.sync()?;
    debug!(
        segment_id = writer.id(),
        size = writer.size(),
        records = table.len(),
        "wrote compacted segment"
    );

    Ok(Arc::new(ClosedTable {
        size: writer.size(),
        table,
    }))
}
