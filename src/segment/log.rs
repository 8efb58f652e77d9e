//! Segment Log
//!
//! Owns the active segment and rotates it at the configured size bound.

use tracing::debug;

use crate::config::SyncStrategy;
use crate::error::Result;

use super::dir::SegmentDir;
use super::record::Record;
use super::writer::SegmentWriter;

/// A segment that was closed by rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedSegment {
    pub id: u64,
    /// Final size in bytes, never above the bound
    pub size: u64,
}

/// Where an append landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Segment that received the record
    pub segment_id: u64,
    /// Offset of the record within that segment
    pub offset: u64,
    /// Set when this append rotated the previous active segment
    pub closed: Option<ClosedSegment>,
}

/// The sequence of segments and its single writable tail
///
/// Not internally synchronized: the store wraps it in the writer mutex.
pub struct SegmentLog {
    dir: SegmentDir,
    active: SegmentWriter,
    max_segment_size: u64,
    sync_strategy: SyncStrategy,
}

impl SegmentLog {
    /// Open the log with `active_id` as the writable segment
    pub fn open(
        dir: SegmentDir,
        active_id: u64,
        max_segment_size: u64,
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        dir.create()?;
        let active = SegmentWriter::open(&dir.segment_path(active_id), active_id)?;

        Ok(Self {
            dir,
            active,
            max_segment_size,
            sync_strategy,
        })
    }

    /// Append an encoded record line
    ///
    /// If `current_size + line.len()` would exceed the bound, the active
    /// segment is closed first and the line becomes offset 0 of segment
    /// `id + 1`. An empty active segment is never rotated.
    pub fn append(&mut self, line: &[u8]) -> Result<Appended> {
        let len = line.len() as u64;

        let full = !self.active.is_empty() && self.active.size() + len > self.max_segment_size;
        let closed = if full {
            Some(self.rotate()?)
        } else {
            None
        };

        let offset = self.active.append(line)?;
        if self.sync_strategy == SyncStrategy::EveryWrite {
            self.active.sync()?;
        }

        Ok(Appended {
            segment_id: self.active.id(),
            offset,
            closed,
        })
    }

    /// Read the record at `offset` in segment `segment_id`
    pub fn read(&self, segment_id: u64, offset: u64) -> Result<Record> {
        self.dir.read(segment_id, offset)
    }

    /// Flush the active segment to disk
    pub fn sync(&self) -> Result<()> {
        self.active.sync()
    }

    pub fn active_id(&self) -> u64 {
        self.active.id()
    }

    pub fn active_size(&self) -> u64 {
        self.active.size()
    }

    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    pub fn dir(&self) -> &SegmentDir {
        &self.dir
    }

    /// Close the active segment and open `id + 1`
    fn rotate(&mut self) -> Result<ClosedSegment> {
        self.active.sync()?;

        let next_id = self.active.id() + 1;
        let next = SegmentWriter::open(&self.dir.segment_path(next_id), next_id)?;
        let closed = std::mem::replace(&mut self.active, next);
        self.dir.sync()?;

        debug!(
            closed_id = closed.id(),
            closed_size = closed.size(),
            active_id = next_id,
            "rotated segment"
        );

        Ok(ClosedSegment {
            id: closed.id(),
            size: closed.size(),
        })
    }
}
