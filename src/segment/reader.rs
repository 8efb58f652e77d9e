//! Segment Reader
//!
//! Point reads at a known offset and full sequential scans. Each call opens
//! its own handle and drops it before returning.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::Key;

use super::record::{Record, RECORD_TERMINATOR};

/// Stateless reader for segment files
pub struct SegmentReader;

/// A record found by a sequential scan
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    /// Byte offset of the record's first byte
    pub offset: u64,
    /// Encoded length, terminator included
    pub len: u64,
    pub record: Record,
}

/// Result of scanning a whole segment
#[derive(Debug, Default)]
pub struct SegmentScan {
    /// Records in file order
    pub records: Vec<ScannedRecord>,
    /// Length of the prefix made of complete records
    pub valid_len: u64,
    /// Total file length
    pub file_len: u64,
}

impl SegmentScan {
    /// True when the file ends with an unterminated partial record
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.file_len
    }
}

impl SegmentReader {
    /// Read and decode the record starting at `offset`
    pub fn read_at(path: &Path, segment_id: u64, offset: u64) -> Result<Record> {
        let line = Self::read_line_at(path, segment_id, offset)?;
        Record::decode(&line).map_err(|e| StoreError::corrupt(segment_id, offset, e.to_string()))
    }

    /// Read the raw line at `offset`, verified to decode and carry `key`
    ///
    /// Used by compaction to copy records byte for byte.
    pub fn read_raw_at(path: &Path, segment_id: u64, offset: u64, key: Key) -> Result<Vec<u8>> {
        let line = Self::read_line_at(path, segment_id, offset)?;
        let record = Record::decode(&line)
            .map_err(|e| StoreError::corrupt(segment_id, offset, e.to_string()))?;
        if record.key != key {
            return Err(StoreError::corrupt(
                segment_id,
                offset,
                format!("expected key {}, found key {}", key, record.key),
            ));
        }
        Ok(line)
    }

    /// Scan every record in a segment
    ///
    /// A complete line that fails to decode is `CorruptRecord`. An
    /// unterminated final line is reported through `SegmentScan::valid_len`
    /// and left to the caller.
    pub fn scan(path: &Path, segment_id: u64) -> Result<SegmentScan> {
        let mut file = open_segment(path, segment_id)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let file_len = data.len() as u64;
        let mut records = Vec::new();
        let mut pos = 0usize;

        while pos < data.len() {
            let end = match data[pos..].iter().position(|&b| b == RECORD_TERMINATOR) {
                Some(i) => pos + i + 1,
                None => break, // torn tail
            };

            let offset = pos as u64;
            let record = Record::decode(&data[pos..end])
                .map_err(|e| StoreError::corrupt(segment_id, offset, e.to_string()))?;

            records.push(ScannedRecord {
                offset,
                len: (end - pos) as u64,
                record,
            });
            pos = end;
        }

        Ok(SegmentScan {
            records,
            valid_len: pos as u64,
            file_len,
        })
    }

    fn read_line_at(path: &Path, segment_id: u64, offset: u64) -> Result<Vec<u8>> {
        let mut file = open_segment(path, segment_id)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut line = Vec::new();
        BufReader::new(file).read_until(RECORD_TERMINATOR, &mut line)?;

        if line.is_empty() {
            return Err(StoreError::corrupt(
                segment_id,
                offset,
                "offset is past the end of the segment",
            ));
        }
        Ok(line)
    }
}

fn open_segment(path: &Path, segment_id: u64) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StoreError::SegmentNotFound(segment_id),
        _ => StoreError::Io(e),
    })
}
