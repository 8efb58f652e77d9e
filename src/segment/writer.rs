//! Segment Writer
//!
//! Appends encoded record lines to one segment file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

/// Writes records to a single segment file
///
/// Writes go straight to the file (no userspace buffer) so a record is
/// readable through a separate handle as soon as `append` returns.
pub struct SegmentWriter {
    /// Segment id
    id: u64,
    /// Path of the segment file
    path: PathBuf,
    /// Handle opened for appending
    file: File,
    /// Current size in bytes (next append offset)
    size: u64,
}

impl SegmentWriter {
    /// Open or create a segment for appending, continuing at its current end
    pub fn open(path: &Path, id: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            size,
        })
    }

    /// Create an empty segment, truncating anything already at `path`
    pub fn create(path: &Path, id: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            size: 0,
        })
    }

    /// Append one encoded line. Returns the offset it was written at.
    ///
    /// On a failed write the file is cut back to the last complete record, so
    /// a partial line never sits in front of the next append.
    pub fn append(&mut self, line: &[u8]) -> Result<u64> {
        let offset = self.size;

        if let Err(e) = self.file.write_all(line) {
            self.rollback();
            return Err(e.into());
        }

        self.size += line.len() as u64;
        Ok(offset)
    }

    /// Force file contents to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Drop bytes past `size` left by a failed write
    fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.size) {
            warn!(
                segment_id = self.id,
                size = self.size,
                error = %e,
                "could not truncate partial write"
            );
            // Offsets must match the real file length
            if let Ok(metadata) = self.file.metadata() {
                self.size = metadata.len();
            }
        }
    }
}
