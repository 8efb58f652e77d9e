//! Segment Module
//!
//! Append-only segment files and the log that rotates them.
//!
//! ## Responsibilities
//! - Encode/decode records on the segment line format
//! - Append records to the active segment, rotating at the size bound
//! - Read a single record at a known offset
//! - Scan a whole segment for index replay
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ segs/seg0                                    │
//! │   0,{"name":"a"}\n          ← offset 0        │
//! │   17,{"name":"b","n":2}\n   ← offset 15       │
//! │   ... one record per line                    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The key is the decimal text before the first comma. The value is compact
//! JSON, which never contains a raw newline, so `\n` always ends a record.

mod dir;
mod log;
mod reader;
mod record;
mod writer;

pub use dir::SegmentDir;
pub use log::{Appended, ClosedSegment, SegmentLog};
pub use reader::{ScannedRecord, SegmentReader, SegmentScan};
pub use record::{Record, RecordError, KEY_DELIMITER, RECORD_TERMINATOR};
pub use writer::SegmentWriter;

/// Name of the subdirectory holding segment files
pub const SEGMENTS_DIR: &str = "segs";

/// Suffix for compaction output that has not been installed yet
pub const COMPACT_SUFFIX: &str = ".compact";
