//! Index Module
//!
//! In-memory hash index from key to record location.
//!
//! ## Responsibilities
//! - One `IndexTable` (key → offset) per segment
//! - A mutable table for the active segment
//! - Frozen tables for closed segments, ordered by segment id
//! - Resolve a key: active table first, then closed tables newest → oldest
//!
//! ## Structure
//! ```text
//!   active  ──►  seg 7: { 3 → 0, 9 → 41 }          (mutable)
//!   closed  ──►  seg 6: { 1 → 0, 3 → 12, ... }     (immutable, Arc)
//!                seg 5: { ... }
//!                seg 0: { ... }
//! ```

mod directory;
mod table;

pub use directory::{ClosedTable, ClosedTables, IndexDirectory, Location};
pub use table::IndexTable;
