//! # SectorKV
//!
//! A log-structured key-value store for raw flash partitions with:
//! - Append-only records in fixed 32-byte slices, never rewritten in place
//! - Per-sector hash index for keyed lookups
//! - Wear-spreading sector rotation and garbage collection
//! - Power-loss recovery of interrupted writes and interrupted GCs
//! - Blobs segmented across sectors
//! - Single global lock over the whole store
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        KvStore                              │
//! │        (global lock, handles, typed values, iterators)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one per partition
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                               │
//! │       (groups, write/read/delete, blobs, consistency)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    SectorManager                            │
//! │        (active / idle lists, GC, crash recovery)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Sector    │          │  HashIndex  │
//!   │ (records)   │◄─────────│ (per sector)│
//!   └──────┬──────┘          └─────────────┘
//!          ▼
//!   ┌─────────────┐
//!   │  Partition  │──► FlashDevice (memory / file)
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod checkpoint;

pub mod flash;
pub mod item;
pub mod sector;
pub mod storage;
pub mod engine;
pub mod iterator;
pub mod value;
pub mod store;
pub mod export;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use checkpoint::{Checkpoint, CheckpointHook};
pub use config::Config;
pub use engine::{Engine, ItemInfo};
pub use error::{KvError, Result};
pub use flash::{FileFlash, FlashDevice, MemoryFlash, Partition, PartitionInfo, PartitionTable};
pub use item::{ItemName, TypeFilter, ValueType};
pub use iterator::{Cursor, EntryInfo};
pub use store::{EntryIterator, HandleId, KvStatus, KvStore, OpenMode};
pub use value::{Binary, Blob, KvValue};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SectorKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
