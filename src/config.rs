//! Configuration for hashkv
//!
//! Centralized configuration with sensible defaults. Every field is fixed for
//! the lifetime of an open store.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Default segment size bound in bytes
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 4000;

/// Default segment filename prefix
pub const DEFAULT_SEGMENT_PREFIX: &str = "seg";

/// Main configuration for a hashkv store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── segs/               (segment files: {prefix}{id})
    ///     ├── closed_index.meta   (closed segment index snapshot)
    ///     └── active_index.meta   (active segment index, written on close)
    pub data_dir: PathBuf,

    /// Filename prefix for segment files
    pub segment_prefix: String,

    // -------------------------------------------------------------------------
    // Segment Configuration
    // -------------------------------------------------------------------------
    /// Max size of a segment (in bytes) before rotation
    pub max_segment_size: u64,

    /// Sync strategy: how often to fsync the active segment
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Order in which closed segments are consumed by compaction
    pub compaction_order: CompactionOrder,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync when a segment is closed and when the store is closed
    OnRotate,
}

/// Compaction input order
///
/// Both orders keep only the newest value of each key; they differ in the
/// physical layout of the output segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOrder {
    /// Walk closed segments newest → oldest, first writer of a key wins
    NewestFirst,

    /// Walk closed segments oldest → newest, last writer of a key wins
    OldestFirst,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./hashkv_data"),
            segment_prefix: DEFAULT_SEGMENT_PREFIX.to_string(),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            sync_strategy: SyncStrategy::OnRotate,
            compaction_order: CompactionOrder::NewestFirst,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the configuration can describe a consistent on-disk layout
    pub fn validate(&self) -> Result<()> {
        if self.max_segment_size == 0 {
            return Err(StoreError::Config(
                "max_segment_size must be > 0".to_string(),
            ));
        }

        let prefix = &self.segment_prefix;
        if prefix.is_empty() {
            return Err(StoreError::Config(
                "segment_prefix must not be empty".to_string(),
            ));
        }
        if prefix.contains(['/', '\\', '.']) {
            return Err(StoreError::Config(format!(
                "segment_prefix {:?} must not contain path separators or '.'",
                prefix
            )));
        }
        // "seg1" + "2" and "seg" + "12" would name the same file
        if prefix.ends_with(|c: char| c.is_ascii_digit()) {
            return Err(StoreError::Config(format!(
                "segment_prefix {:?} must not end with a digit",
                prefix
            )));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment filename prefix
    pub fn segment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.segment_prefix = prefix.into();
        self
    }

    /// Set the maximum segment size (in bytes)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Set the segment sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the compaction input order
    pub fn compaction_order(mut self, order: CompactionOrder) -> Self {
        self.config.compaction_order = order;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
