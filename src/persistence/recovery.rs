//! Startup Recovery
//!
//! Rebuilds the index directory from metadata, falling back to log replay.

use std::fs::{self, OpenOptions};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::index::{ClosedTable, ClosedTables, IndexDirectory, IndexTable};
use crate::segment::SegmentDir;

use super::metadata::MetadataStore;
use super::snapshot::ClosedIndexSnapshot;

/// How a part of the index was rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// Loaded from a validated metadata snapshot
    Metadata,
    /// Rebuilt by scanning segment files
    Replay,
}

/// Result of a recovery run
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub active_segment_id: u64,
    pub closed_segments: usize,
    pub closed_source: RecoverySource,
    pub active_source: RecoverySource,
    /// Records decoded while replaying segments
    pub records_replayed: u64,
    /// Bytes of an unterminated record cut from the active segment
    pub torn_bytes_truncated: u64,
    /// A committed compaction was finished during recovery
    pub compaction_rolled_forward: bool,
    /// Uncommitted compaction outputs deleted
    pub stray_compactions_removed: usize,
}

/// Rebuilt state, ready to serve
#[derive(Debug)]
pub struct Recovered {
    pub directory: IndexDirectory,
    pub report: RecoveryReport,
}

/// Rebuilds the index directory on startup
///
/// Steps:
/// 1. Finish a compaction whose metadata committed before a crash
/// 2. Delete compaction outputs nothing committed
/// 3. Take the highest segment id on disk as the active segment
/// 4. Load closed tables from metadata, or replay the closed segments
/// 5. Load the active table from metadata, or replay the active segment
pub struct Recovery<'a> {
    dir: &'a SegmentDir,
    metadata: &'a MetadataStore,
}

impl<'a> Recovery<'a> {
    pub fn new(dir: &'a SegmentDir, metadata: &'a MetadataStore) -> Self {
        Self { dir, metadata }
    }

    pub fn recover(&self) -> Result<Recovered> {
        let compaction_rolled_forward = self.finish_pending_compaction()?;
        let stray_compactions_removed = self.remove_stray_compactions()?;

        let ids = self.dir.list_segment_ids()?;
        let active_id = ids.last().copied().unwrap_or(0);
        let closed_ids = &ids[..ids.len().saturating_sub(1)];

        let mut records_replayed = 0u64;

        // Closed segments
        let (closed, closed_source) = match self.metadata.load_directory_metadata(self.dir) {
            Ok(closed) => (closed, RecoverySource::Metadata),
            Err(StoreError::MetadataUnavailable(reason)) => {
                if closed_ids.is_empty() {
                    debug!(%reason, "no closed index metadata");
                } else {
                    warn!(
                        %reason,
                        segments = closed_ids.len(),
                        "closed index metadata unavailable, replaying closed segments"
                    );
                }

                let mut closed = ClosedTables::new();
                for &id in closed_ids {
                    let (table, size, count) = self.replay_closed_segment(id)?;
                    records_replayed += count;
                    closed.insert(id, Arc::new(ClosedTable { size, table }));
                }
                (closed, RecoverySource::Replay)
            }
            Err(e) => return Err(e),
        };

        // Active segment
        let active_size = if ids.is_empty() {
            0
        } else {
            self.dir.segment_size(active_id)?
        };

        let mut torn_bytes_truncated = 0u64;
        let active_metadata = self.metadata.load_active_metadata(active_id, active_size);
        let (active, active_source) = match active_metadata {
            Ok(table) => (table, RecoverySource::Metadata),
            Err(StoreError::MetadataUnavailable(reason)) => {
                debug!(%reason, active_id, "replaying active segment");
                if ids.is_empty() {
                    (IndexTable::new(), RecoverySource::Replay)
                } else {
                    let (table, count, torn) = self.replay_active_segment(active_id)?;
                    records_replayed += count;
                    torn_bytes_truncated = torn;
                    (table, RecoverySource::Replay)
                }
            }
            Err(e) => return Err(e),
        };

        // Only valid for the shutdown that wrote it
        self.metadata.remove_active_metadata()?;

        let directory = IndexDirectory::with_tables(active_id, active, closed);

        if closed_source == RecoverySource::Replay {
            self.metadata
                .save_directory_metadata(&ClosedIndexSnapshot::capture(&directory))?;
        }

        let report = RecoveryReport {
            active_segment_id: active_id,
            closed_segments: closed_ids.len(),
            closed_source,
            active_source,
            records_replayed,
            torn_bytes_truncated,
            compaction_rolled_forward,
            stray_compactions_removed,
        };

        Ok(Recovered { directory, report })
    }

    /// Rebuild a closed segment's table by scanning it
    ///
    /// Later offsets win within the segment. Returns the table, the segment
    /// size and the number of records scanned. A closed segment is always
    /// fully written, so a torn tail is corruption.
    pub fn replay_closed_segment(&self, id: u64) -> Result<(IndexTable, u64, u64)> {
        let scan = self.dir.scan(id)?;

        if scan.has_torn_tail() {
            return Err(StoreError::corrupt(
                id,
                scan.valid_len,
                "closed segment ends with an unterminated record",
            ));
        }

        let count = scan.records.len() as u64;
        let table = scan
            .records
            .iter()
            .map(|r| (r.record.key, r.offset))
            .collect();

        debug!(segment_id = id, records = count, "replayed closed segment");
        Ok((table, scan.file_len, count))
    }

    /// Rebuild the active table, cutting off a torn final record
    fn replay_active_segment(&self, id: u64) -> Result<(IndexTable, u64, u64)> {
        let scan = self.dir.scan(id)?;
        let count = scan.records.len() as u64;

        let mut torn = 0;
        if scan.has_torn_tail() {
            torn = scan.file_len - scan.valid_len;
            warn!(
                segment_id = id,
                offset = scan.valid_len,
                bytes = torn,
                "truncating unterminated record at end of active segment"
            );

            let file = OpenOptions::new()
                .write(true)
                .open(self.dir.segment_path(id))?;
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        let table = scan
            .records
            .iter()
            .map(|r| (r.record.key, r.offset))
            .collect();

        debug!(segment_id = id, records = count, "replayed active segment");
        Ok((table, count, torn))
    }

    /// Roll forward a compaction committed by the closed snapshot
    fn finish_pending_compaction(&self) -> Result<bool> {
        let snapshot = match self.metadata.read_directory_metadata() {
            Ok(snapshot) => snapshot,
            Err(StoreError::MetadataUnavailable(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        if snapshot.pending_install.is_empty() {
            return Ok(false);
        }

        for &id in &snapshot.pending_install {
            let compact_path = self.dir.compact_path(id);
            if compact_path.exists() {
                fs::rename(&compact_path, self.dir.segment_path(id))?;
            }
        }

        // Anything below the committed active id that the snapshot does not
        // name was retired by the compaction
        for id in self.dir.list_segment_ids()? {
            if id < snapshot.active_segment_id && !snapshot.segments.contains_key(&id) {
                fs::remove_file(self.dir.segment_path(id))?;
            }
        }
        self.dir.sync()?;

        info!(
            installed = ?snapshot.pending_install,
            "finished interrupted compaction"
        );

        let snapshot = snapshot.with_pending_install(Vec::new());
        self.metadata.save_directory_metadata(&snapshot)?;
        Ok(true)
    }

    /// Delete `.compact` files left by a compaction that never committed
    fn remove_stray_compactions(&self) -> Result<usize> {
        let ids = self.dir.list_compact_ids()?;
        for &id in &ids {
            fs::remove_file(self.dir.compact_path(id))?;
        }
        if !ids.is_empty() {
            warn!(ids = ?ids, "removed uncommitted compaction output");
            self.dir.sync()?;
        }
        Ok(ids.len())
    }
}
