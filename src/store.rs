//! Store Module
//!
//! The facade that coordinates segments, index and metadata.
//!
//! ## Responsibilities
//! - Recover the index directory on open
//! - Serialize appends and index updates
//! - Resolve and read keys concurrently with writes
//! - Persist closed-index metadata on rotation and compaction
//! - Run compaction and swap its result in atomically

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::compaction::{CompactionStats, Compactor};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index::{ClosedTables, IndexDirectory};
use crate::persistence::{
    ActiveIndexSnapshot, ClosedIndexSnapshot, MetadataStore, Recovery, RecoveryReport,
};
use crate::segment::{Record, SegmentDir, SegmentLog, SEGMENTS_DIR};
use crate::Key;

/// Point-in-time view of the store's layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub active_segment_id: u64,
    pub active_segment_size: u64,
    /// Closed segment ids, ascending
    pub closed_segment_ids: Vec<u64>,
    /// Bytes across closed segments
    pub closed_bytes: u64,
    /// Distinct keys across all segments
    pub key_count: usize,
}

/// A log-structured, hash-indexed key-value store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put): Serialized by the `log` mutex
///   - Append, rotation, freeze and index update happen as one unit
///   - Lock order: log → index (write)
///
/// - **Reads** (get): Concurrent
///   - Hold `index` read lock across resolve + segment read, so a read
///     never sees a freeze or compaction swap half-applied
///   - Segment files are opened per read; no shared handle
///
/// - **Compaction**: Serialized by `compaction_lock`
///   - Output is written without blocking readers or writers
///   - The swap takes log → index (write), like a rotation
pub struct Store {
    /// Store configuration
    config: Config,

    /// Segment naming and reads (shared by readers, no lock)
    segments: SegmentDir,

    /// Index metadata files
    metadata: MetadataStore,

    /// Active segment writer (exclusive access needed)
    log: Mutex<SegmentLog>,

    /// Active + closed index tables
    index: RwLock<IndexDirectory>,

    /// Serializes compactions
    compaction_lock: Mutex<()>,

    /// How the index was rebuilt on open
    recovery: RecoveryReport,
}

impl Store {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Validate config, create `{data_dir}/segs`
    /// 2. Recover the index directory (metadata, else log replay)
    /// 3. Open the active segment for appends
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create directories
        fs::create_dir_all(&config.data_dir)?;
        let segments = SegmentDir::new(
            config.data_dir.join(SEGMENTS_DIR),
            config.segment_prefix.clone(),
        );
        segments.create()?;
        let metadata = MetadataStore::new(&config.data_dir);

        // Step 2: Rebuild the index
        let recovered = Recovery::new(&segments, &metadata).recover()?;
        let report = recovered.report;

        info!(
            data_dir = %config.data_dir.display(),
            active_segment = report.active_segment_id,
            closed_segments = report.closed_segments,
            closed_source = ?report.closed_source,
            active_source = ?report.active_source,
            records_replayed = report.records_replayed,
            "store opened"
        );

        // Step 3: Open the active segment
        let log = SegmentLog::open(
            segments.clone(),
            recovered.directory.active_id(),
            config.max_segment_size,
            config.sync_strategy,
        )?;

        Ok(Self {
            config,
            segments,
            metadata,
            log: Mutex::new(log),
            index: RwLock::new(recovered.directory),
            compaction_lock: Mutex::new(()),
            recovery: report,
        })
    }

    /// Open with a path and segment size bound (convenience method)
    ///
    /// Uses default config for everything else
    pub fn open_path(path: &Path, max_segment_size: u64) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path)
            .max_segment_size(max_segment_size)
            .build();
        Self::open(config)
    }

    /// Store a value under `key`
    ///
    /// Steps:
    /// 1. Encode the record, reject it if no segment could hold it
    /// 2. Acquire the writer lock
    /// 3. Append (rotating if the bound would be exceeded)
    /// 4. On rotation, freeze the active table
    /// 5. Record the new offset in the active table
    /// 6. On rotation, persist closed-index metadata
    pub fn put(&self, key: Key, value: Value) -> Result<()> {
        let line = Record::new(key, value).encode()?;
        let size = line.len() as u64;
        if size > self.config.max_segment_size {
            return Err(StoreError::RecordTooLarge {
                size,
                max: self.config.max_segment_size,
            });
        }

        let mut log = self.log.lock();
        let appended = log.append(&line)?;

        let snapshot = {
            let mut index = self.index.write();
            if let Some(closed) = appended.closed {
                index.freeze_active(closed.id, closed.size);
            }
            index.record_active(key, appended.offset);

            appended.closed.map(|_| ClosedIndexSnapshot::capture(&index))
        };

        // Still under the writer lock, so snapshots are saved in order
        if let Some(snapshot) = snapshot {
            self.metadata.save_directory_metadata(&snapshot)?;
        }

        Ok(())
    }

    /// Store any serializable value under `key`
    pub fn put_as<T: Serialize>(&self, key: Key, value: &T) -> Result<()> {
        self.put(key, serde_json::to_value(value)?)
    }

    /// Get the current value of `key`
    ///
    /// Search order:
    /// 1. Active segment's table
    /// 2. Closed segments' tables (newest to oldest)
    pub fn get(&self, key: Key) -> Result<Value> {
        let index = self.index.read();
        let location = index.resolve(key).ok_or(StoreError::KeyNotFound(key))?;

        let record = if index.is_pending(location.segment_id) {
            self.segments
                .read_installing(location.segment_id, location.offset)?
        } else {
            self.segments.read(location.segment_id, location.offset)?
        };
        if record.key != key {
            return Err(StoreError::corrupt(
                location.segment_id,
                location.offset,
                format!("expected key {}, found key {}", key, record.key),
            ));
        }

        Ok(record.value)
    }

    /// Get the current value of `key` as `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: Key) -> Result<T> {
        let value = self.get(key)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Check if `key` has a value
    pub fn contains_key(&self, key: Key) -> bool {
        self.index.read().resolve(key).is_some()
    }

    /// Merge closed segments, keeping only the newest record of each key
    ///
    /// Readers keep running during the write phase and see either the old or
    /// the new closed set, never a mix. A failure before the metadata commit
    /// leaves the store exactly as it was. A failure after it keeps the new
    /// closed set readable and is retried by the next `compact` or `close`.
    pub fn compact(&self) -> Result<CompactionStats> {
        let _compaction = self.compaction_lock.lock();

        // Finish an install an earlier run committed but could not complete
        {
            let _log = self.log.lock();
            let mut index = self.index.write();
            self.install_pending(&mut index)?;
        }

        let (inputs, active_id, shadowed) = {
            let index = self.index.read();
            let shadowed: HashSet<Key> = index.active_table().keys().collect();
            (index.closed_snapshot(), index.active_id(), shadowed)
        };

        if inputs.is_empty() {
            debug!("no closed segments to compact");
            return Ok(CompactionStats::skipped(&inputs));
        }

        let compactor = Compactor::new(
            &self.segments,
            self.config.max_segment_size,
            self.config.compaction_order,
        );

        // Phase 1: write output aside
        let output = match compactor.write_output(&inputs, &shadowed, active_id)? {
            Some(output) => output,
            None => return Ok(CompactionStats::skipped(&inputs)),
        };

        let retired_ids: Vec<u64> = inputs.keys().copied().collect();
        let output_ids = output.segment_ids();

        // Phase 2: swap, exclusive with writers and readers
        let _log = self.log.lock();
        let mut index = self.index.write();

        index.replace_closed(output.tables.clone(), &retired_ids);
        index.set_pending_install(output_ids.clone());
        let commit = ClosedIndexSnapshot::capture(&index);

        if let Err(e) = self.metadata.save_directory_metadata(&commit) {
            // The rename may have landed even though a later step failed
            match self.metadata.read_directory_metadata() {
                Ok(on_disk) if on_disk == commit => {
                    warn!(error = %e, "compaction commit reported an error but is on disk");
                }
                Ok(_) | Err(StoreError::MetadataUnavailable(_)) => {
                    warn!(error = %e, "compaction commit failed, keeping original segments");
                    index.replace_closed(ClosedTables::clone(&inputs), &output_ids);
                    index.set_pending_install(Vec::new());
                    compactor.discard();
                    return Err(e);
                }
                Err(read_err) => {
                    index.replace_closed(ClosedTables::clone(&inputs), &output_ids);
                    index.set_pending_install(Vec::new());

                    // Only drop the output once the old closed set is back on disk
                    let restore = ClosedIndexSnapshot::capture(&index);
                    if self.metadata.save_directory_metadata(&restore).is_ok() {
                        warn!(error = %e, "compaction commit failed, keeping original segments");
                        compactor.discard();
                    } else {
                        warn!(
                            error = %e,
                            read_error = %read_err,
                            "compaction commit state unknown, keeping output for recovery"
                        );
                    }
                    return Err(e);
                }
            }
        }

        // Committed: from here a crash is finished by recovery
        if let Err(e) = self.install_pending(&mut index) {
            warn!(
                error = %e,
                pending = ?index.pending_install(),
                "compaction output not installed, will retry"
            );
            return Err(e);
        }

        let stats = output.stats;
        info!(
            segments_in = stats.segments_in,
            segments_out = stats.segments_out,
            records_in = stats.records_in,
            records_out = stats.records_out,
            bytes_saved = stats.bytes_saved(),
            "compaction finished"
        );

        Ok(stats)
    }

    /// Rename committed compaction output into place and retire its inputs
    ///
    /// Caller holds the writer lock and the index write lock. Retired inputs
    /// are the segments below the active id that the closed set no longer
    /// names.
    fn install_pending(&self, index: &mut IndexDirectory) -> Result<()> {
        if index.pending_install().is_empty() {
            return Ok(());
        }

        let output_ids = index.pending_install().to_vec();
        let closed_ids = index.closed_ids();
        let retired_ids: Vec<u64> = self
            .segments
            .list_segment_ids()?
            .into_iter()
            .filter(|id| *id < index.active_id() && !closed_ids.contains(id))
            .collect();

        Compactor::new(
            &self.segments,
            self.config.max_segment_size,
            self.config.compaction_order,
        )
        .install(&output_ids, &retired_ids)?;

        index.set_pending_install(Vec::new());
        self.metadata
            .save_directory_metadata(&ClosedIndexSnapshot::capture(index))?;

        debug!(installed = ?output_ids, retired = ?retired_ids, "installed compaction output");
        Ok(())
    }

    /// Close the store gracefully
    ///
    /// Syncs the active segment and saves both index snapshots so the next
    /// open can skip replay. A compaction install still pending is retried
    /// first; if it fails again the next open finishes it.
    pub fn close(self) -> Result<()> {
        let log = self.log.lock();
        log.sync()?;

        let mut index = self.index.write();
        if let Err(e) = self.install_pending(&mut index) {
            warn!(error = %e, "compaction output still not installed, leaving it to recovery");
        }

        self.metadata
            .save_directory_metadata(&ClosedIndexSnapshot::capture(&index))?;
        self.metadata
            .save_active_metadata(&ActiveIndexSnapshot::capture(&index, log.active_size()))?;

        debug!(active_segment = log.active_id(), "store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Snapshot of the current layout
    pub fn stats(&self) -> StoreStats {
        let log = self.log.lock();
        let index = self.index.read();
        let closed = index.closed_snapshot();

        StoreStats {
            active_segment_id: log.active_id(),
            active_segment_size: log.active_size(),
            closed_segment_ids: closed.keys().copied().collect(),
            closed_bytes: closed.values().map(|c| c.size).sum(),
            key_count: index.key_count(),
        }
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.index.read().key_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How the index was rebuilt when this store was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the segment directory
    pub fn segments(&self) -> &SegmentDir {
        &self.segments
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
