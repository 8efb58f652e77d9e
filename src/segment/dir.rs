//! Segment Directory
//!
//! File naming, discovery and scoped reads for the `segs/` directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Key;

use super::reader::{SegmentReader, SegmentScan};
use super::record::Record;
use super::COMPACT_SUFFIX;

/// Location of segment files and how they are named
///
/// Cheap to clone; readers keep their own copy so lookups never touch the
/// writer's lock.
#[derive(Debug, Clone)]
pub struct SegmentDir {
    /// Directory holding the segment files
    path: PathBuf,
    /// Filename prefix, e.g. "seg" for seg0, seg1, ...
    prefix: String,
}

impl SegmentDir {
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prefix: prefix.into(),
        }
    }

    /// Create the directory if it doesn't exist
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// "seg" + 7 → {dir}/seg7
    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.path.join(format!("{}{}", self.prefix, id))
    }

    /// "seg" + 7 → {dir}/seg7.compact
    pub fn compact_path(&self, id: u64) -> PathBuf {
        self.path.join(format!("{}{}{}", self.prefix, id, COMPACT_SUFFIX))
    }

    /// Parse a segment id from a filename: "seg42" → Some(42)
    pub fn parse_segment_id(&self, name: &str) -> Option<u64> {
        parse_digits(name.strip_prefix(self.prefix.as_str())?)
    }

    /// Parse a compaction output id: "seg42.compact" → Some(42)
    pub fn parse_compact_id(&self, name: &str) -> Option<u64> {
        let rest = name.strip_prefix(self.prefix.as_str())?;
        parse_digits(rest.strip_suffix(COMPACT_SUFFIX)?)
    }

    /// Ids of all segment files on disk, ascending
    pub fn list_segment_ids(&self) -> Result<Vec<u64>> {
        self.list_ids(|name| self.parse_segment_id(name))
    }

    /// Ids of all compaction outputs on disk, ascending
    pub fn list_compact_ids(&self) -> Result<Vec<u64>> {
        self.list_ids(|name| self.parse_compact_id(name))
    }

    /// Current size of a segment file in bytes
    pub fn segment_size(&self, id: u64) -> Result<u64> {
        Ok(fs::metadata(self.segment_path(id))?.len())
    }

    /// Read the record at `offset` in segment `id`
    pub fn read(&self, id: u64, offset: u64) -> Result<Record> {
        SegmentReader::read_at(&self.segment_path(id), id, offset)
    }

    /// Read from a committed compaction output that may still sit at its
    /// `.compact` path
    pub fn read_installing(&self, id: u64, offset: u64) -> Result<Record> {
        let compact_path = self.compact_path(id);
        if compact_path.exists() {
            SegmentReader::read_at(&compact_path, id, offset)
        } else {
            self.read(id, offset)
        }
    }

    /// Read the raw line for `key` at `offset` in segment `id`
    pub fn read_raw(&self, id: u64, offset: u64, key: Key) -> Result<Vec<u8>> {
        SegmentReader::read_raw_at(&self.segment_path(id), id, offset, key)
    }

    /// Scan all records in segment `id`
    pub fn scan(&self, id: u64) -> Result<SegmentScan> {
        SegmentReader::scan(&self.segment_path(id), id)
    }

    /// Fsync the directory so creates, renames and deletes are durable
    #[cfg(unix)]
    pub fn sync(&self) -> Result<()> {
        fs::File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn list_ids(&self, parse: impl Fn(&str) -> Option<u64>) -> Result<Vec<u64>> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(&parse) {
                ids.push(id);
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
