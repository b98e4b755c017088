//! Storage Module
//!
//! Sector lifecycle for one partition: which sectors hold data, which are
//! free, how space is reclaimed, and how a torn state is repaired at load.
//!
//! ## Sector Lifecycle
//! ```text
//!            activate                  full
//!   idle ─────────────► Using ──────────────► Full
//!    ▲                    │                    │
//!    │                    └──────┬─────────────┘
//!    │                           │ GC victim
//!    │        erase              ▼
//!    └─────────────────────── Deleting
//!
//!   Crashed / Invalid ──(erase on activation)──► Using
//! ```

mod gc;
mod manager;
mod recovery;

pub use manager::{Located, Location, SectorManager, SpaceStatus};
