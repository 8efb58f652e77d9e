//! Persistence Module
//!
//! Index metadata snapshots and startup recovery.
//!
//! ## Responsibilities
//! - Snapshot the closed-segment index directory on every change
//! - Snapshot the active table on clean shutdown
//! - Validate snapshots against the segment files actually on disk
//! - Fall back to log replay when a snapshot can't be trusted
//! - Roll forward a compaction whose metadata was committed
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (19 bytes)                                            │
//! │   Magic: "HKVM" (4) | Version: u16 (2) | Kind: u8 (1)        │
//! │   CRC32 of payload: u32 (4) | Payload length: u64 (8)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (bincode)                                            │
//! │   closed: active id, segment id → (size, key → offset),      │
//! │           ids pending install                                │
//! │   active: segment id, segment size, key → offset             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write goes to `<name>.tmp`, is fsynced, then renamed into place.

mod metadata;
mod recovery;
mod snapshot;

pub use metadata::MetadataStore;
pub use recovery::{Recovered, Recovery, RecoveryReport, RecoverySource};
pub use snapshot::{ActiveIndexSnapshot, ClosedIndexSnapshot, SegmentMeta};

/// Closed-segment index snapshot
pub const CLOSED_INDEX_FILE: &str = "closed_index.meta";

/// Active-segment index snapshot, written on clean shutdown
pub const ACTIVE_INDEX_FILE: &str = "active_index.meta";

/// Suffix of in-flight metadata writes
pub const TEMP_SUFFIX: &str = ".tmp";
