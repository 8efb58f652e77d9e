//! Metadata Store
//!
//! Reads and atomically writes the index snapshot files in the store root.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::index::{ClosedTables, IndexTable};
use crate::segment::SegmentDir;

use super::snapshot::{self, ActiveIndexSnapshot, ClosedIndexSnapshot, KIND_ACTIVE, KIND_CLOSED};
use super::{ACTIVE_INDEX_FILE, CLOSED_INDEX_FILE, TEMP_SUFFIX};

/// Index metadata files under the store root
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn closed_path(&self) -> PathBuf {
        self.root.join(CLOSED_INDEX_FILE)
    }

    pub fn active_path(&self) -> PathBuf {
        self.root.join(ACTIVE_INDEX_FILE)
    }

    // =========================================================================
    // Closed Directory
    // =========================================================================

    /// Write a complete closed-directory snapshot
    pub fn save_directory_metadata(&self, snapshot: &ClosedIndexSnapshot) -> Result<()> {
        let data = snapshot::encode(KIND_CLOSED, snapshot)?;
        self.write_atomic(&self.closed_path(), &data)?;

        debug!(
            segments = snapshot.segments.len(),
            pending = snapshot.pending_install.len(),
            bytes = data.len(),
            "saved closed index metadata"
        );
        Ok(())
    }

    /// Read the closed-directory snapshot as written, without validation
    pub fn read_directory_metadata(&self) -> Result<ClosedIndexSnapshot> {
        let data = self.read_file(&self.closed_path())?;
        snapshot::decode(KIND_CLOSED, &data)
    }

    /// Load closed tables, validated against the segment files in `dir`
    ///
    /// `MetadataUnavailable` when the snapshot is absent, corrupt, has a
    /// compaction still pending, or disagrees with the files on disk. The
    /// highest segment id on disk is taken as the active segment.
    pub fn load_directory_metadata(&self, dir: &SegmentDir) -> Result<ClosedTables> {
        let snapshot = self.read_directory_metadata()?;

        let mut closed_ids = dir.list_segment_ids()?;
        closed_ids.pop();

        snapshot.validate(dir, &closed_ids)?;
        Ok(snapshot.into_closed_tables())
    }

    // =========================================================================
    // Active Table
    // =========================================================================

    /// Write the active table snapshot
    pub fn save_active_metadata(&self, snapshot: &ActiveIndexSnapshot) -> Result<()> {
        let data = snapshot::encode(KIND_ACTIVE, snapshot)?;
        self.write_atomic(&self.active_path(), &data)
    }

    /// Load the active table if it describes segment `segment_id` at exactly
    /// `segment_size` bytes
    pub fn load_active_metadata(&self, segment_id: u64, segment_size: u64) -> Result<IndexTable> {
        let data = self.read_file(&self.active_path())?;
        let snapshot: ActiveIndexSnapshot = snapshot::decode(KIND_ACTIVE, &data)?;

        if snapshot.segment_id != segment_id || snapshot.segment_size != segment_size {
            return Err(StoreError::MetadataUnavailable(format!(
                "active metadata describes segment {} at {} bytes, disk has segment {} at {} bytes",
                snapshot.segment_id, snapshot.segment_size, segment_id, segment_size
            )));
        }

        Ok(snapshot.table)
    }

    /// Delete the active table snapshot; it is only valid until the next write
    pub fn remove_active_metadata(&self) -> Result<()> {
        match fs::remove_file(self.active_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::MetadataUnavailable(
                format!("{} does not exist", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Write-then-rename:
    /// 1. Write to `<path>.tmp`
    /// 2. Sync the temp file
    /// 3. Rename over `path`
    /// 4. Sync the root directory so the rename is durable
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(TEMP_SUFFIX);
        let temp_path = PathBuf::from(temp_name);

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path)?;
        self.sync_root()
    }

    #[cfg(unix)]
    fn sync_root(&self) -> Result<()> {
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_root(&self) -> Result<()> {
        Ok(())
    }
}
