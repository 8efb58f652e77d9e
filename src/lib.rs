//! # HashKV
//!
//! A log-structured key-value store with in-memory hash indexes:
//! - Append-only segment files with size-bounded rotation
//! - One hash table per segment, newest segment wins
//! - Crash-safe metadata snapshots with log-replay fallback
//! - Background-safe compaction of closed segments
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                               │
//! │             (Single Writer / Multi Reader)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌────────────────┐
//!   │ SegmentLog  │          │ IndexDirectory │
//!   │  (Append)   │          │    (RwLock)    │
//!   └──────┬──────┘          └───────┬────────┘
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌────────────────┐
//!   │   segs/     │◄─────────│   Compactor    │
//!   │ seg0..segN  │          │  Metadata      │
//!   └─────────────┘          └────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod segment;
pub mod index;
pub mod persistence;
pub mod compaction;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use compaction::CompactionStats;
pub use config::{CompactionOrder, Config, SyncStrategy};
pub use error::{Result, StoreError};
pub use serde_json::Value;
pub use store::{Store, StoreStats};

/// Keys are signed 64-bit integers
pub type Key = i64;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of HashKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
