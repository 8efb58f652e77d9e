//! Error types for hashkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::Key;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for hashkv operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// Filesystem failure (permissions, disk full, missing directory).
    /// Never retried by the store.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("key not found: {0}")]
    KeyNotFound(Key),

    #[error("segment {0} not found")]
    SegmentNotFound(u64),

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    /// Bytes at a known offset do not parse as a record
    #[error("corrupt record in segment {segment_id} at offset {offset}: {reason}")]
    CorruptRecord {
        segment_id: u64,
        offset: u64,
        reason: String,
    },

    /// Index metadata is absent, damaged, or disagrees with the segment files.
    /// Callers fall back to log replay.
    #[error("index metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("record of {size} bytes exceeds maximum segment size of {max} bytes")]
    RecordTooLarge { size: u64, max: u64 },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl StoreError {
    pub(crate) fn corrupt(segment_id: u64, offset: u64, reason: impl Into<String>) -> Self {
        StoreError::CorruptRecord {
            segment_id,
            offset,
            reason: reason.into(),
        }
    }
}
