//! Metadata snapshot payloads and their checksummed framing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::index::{ClosedTable, ClosedTables, IndexDirectory, IndexTable};
use crate::segment::SegmentDir;

// =============================================================================
// Framing Constants
// =============================================================================

/// Magic bytes identifying a hashkv metadata file
pub(crate) const MAGIC: &[u8; 4] = b"HKVM";

/// Current metadata format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Kind (1) + CRC (4) + Length (8)
pub(crate) const HEADER_SIZE: usize = 19;

/// Payload kinds, so one snapshot can never be read as the other
pub(crate) const KIND_CLOSED: u8 = 1;
pub(crate) const KIND_ACTIVE: u8 = 2;

// =============================================================================
// Payloads
// =============================================================================

/// Persisted form of one closed segment's index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Segment file size the table was built against
    pub size: u64,
    pub table: IndexTable,
}

/// Complete snapshot of the closed-segment directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedIndexSnapshot {
    /// Active segment id when the snapshot was taken
    pub active_segment_id: u64,
    /// Closed segments, ascending by id
    pub segments: BTreeMap<u64, SegmentMeta>,
    /// Compaction outputs committed by this snapshot whose `.compact`
    /// files may not have been renamed into place yet
    pub pending_install: Vec<u64>,
}

/// Snapshot of the active segment's table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveIndexSnapshot {
    pub segment_id: u64,
    /// Segment size the table was built against
    pub segment_size: u64,
    pub table: IndexTable,
}

impl ClosedIndexSnapshot {
    /// Capture the closed half of `directory`, pending installs included
    pub fn capture(directory: &IndexDirectory) -> Self {
        let segments = directory
            .closed_snapshot()
            .iter()
            .map(|(&id, closed)| {
                let meta = SegmentMeta {
                    size: closed.size,
                    table: closed.table.clone(),
                };
                (id, meta)
            })
            .collect();

        Self {
            active_segment_id: directory.active_id(),
            segments,
            pending_install: directory.pending_install().to_vec(),
        }
    }

    /// Mark `ids` as compaction outputs awaiting rename
    pub fn with_pending_install(mut self, ids: Vec<u64>) -> Self {
        self.pending_install = ids;
        self
    }

    /// Check the snapshot describes exactly the closed segments on disk
    ///
    /// Fails with `MetadataUnavailable` when ids or file sizes differ.
    pub fn validate(&self, dir: &SegmentDir, closed_ids: &[u64]) -> Result<()> {
        if !self.pending_install.is_empty() {
            return Err(StoreError::MetadataUnavailable(format!(
                "compaction outputs {:?} not installed",
                self.pending_install
            )));
        }

        let declared: BTreeSet<u64> = self.segments.keys().copied().collect();
        let on_disk: BTreeSet<u64> = closed_ids.iter().copied().collect();
        if declared != on_disk {
            return Err(StoreError::MetadataUnavailable(format!(
                "metadata declares segments {:?}, disk holds {:?}",
                declared, on_disk
            )));
        }

        for (&id, meta) in &self.segments {
            let actual = dir.segment_size(id)?;
            if actual != meta.size {
                return Err(StoreError::MetadataUnavailable(format!(
                    "segment {} is {} bytes, metadata expects {}",
                    id, actual, meta.size
                )));
            }
        }

        Ok(())
    }

    pub fn into_closed_tables(self) -> ClosedTables {
        self.segments
            .into_iter()
            .map(|(id, meta)| {
                let closed = ClosedTable {
                    size: meta.size,
                    table: meta.table,
                };
                (id, Arc::new(closed))
            })
            .collect()
    }
}

impl ActiveIndexSnapshot {
    /// Capture the active half of `directory`
    pub fn capture(directory: &IndexDirectory, segment_size: u64) -> Self {
        Self {
            segment_id: directory.active_id(),
            segment_size,
            table: directory.active_table().clone(),
        }
    }
}

// =============================================================================
// Framing
// =============================================================================

/// Frame a payload: header + bincode bytes
pub(crate) fn encode<T: Serialize>(kind: u8, payload: &T) -> Result<Vec<u8>> {
    let body = bincode::serialize(payload).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let crc = crc32fast::hash(&body);

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.push(kind);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&(body.len() as u64).to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Unframe and verify a payload. Every failure is `MetadataUnavailable`.
pub(crate) fn decode<T: DeserializeOwned>(kind: u8, data: &[u8]) -> Result<T> {
    let unavailable = |reason: String| StoreError::MetadataUnavailable(reason);

    if data.len() < HEADER_SIZE {
        return Err(unavailable(format!(
            "metadata truncated: {} bytes, header needs {}",
            data.len(),
            HEADER_SIZE
        )));
    }

    let (header, body) = data.split_at(HEADER_SIZE);

    if &header[0..4] != MAGIC {
        return Err(unavailable(format!("invalid metadata magic {:?}", &header[0..4])));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(unavailable(format!("unsupported metadata version {}", version)));
    }

    if header[6] != kind {
        return Err(unavailable(format!(
            "metadata kind {} where {} was expected",
            header[6], kind
        )));
    }

    let crc = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&header[11..19]);
    let len = u64::from_le_bytes(len_bytes);

    if len != body.len() as u64 {
        return Err(unavailable(format!(
            "metadata payload is {} bytes, header declares {}",
            body.len(),
            len
        )));
    }

    let actual = crc32fast::hash(body);
    if actual != crc {
        return Err(unavailable(format!(
            "metadata checksum mismatch: expected 0x{:08x}, got 0x{:08x}",
            crc, actual
        )));
    }

    bincode::deserialize(body).map_err(|e| unavailable(format!("metadata payload: {}", e)))
}
