//! Sector Module
//!
//! One erase unit of a partition and everything that happens inside it.
//!
//! ## Layout
//! ```text
//! ┌────────────┬──────────────────────────────────────────────┐
//! │ header     │ slot 0 │ slot 1 ...            │ 0xFF ...     │
//! │ (slice 0)  │ records, appended in order     │ unused       │
//! └────────────┴────────────────────────────────┴──────────────┘
//!                                     next_free_slice ▲
//! ```
//!
//! Slots are numbered from 0 after the header, so slot `n` lives at byte
//! `(n + 1) * SLICE_SIZE`. Records are only ever appended; removal writes a
//! tombstone byte into the record's state field.
//!
//! ## Counters (rebuilt on load)
//! - `next_free_slice`: append cursor
//! - `used_slice`: slots consumed by live and dropped records
//! - `dropped_slice`: slots consumed by dropped records
//!
//! `dropped_slice <= used_slice == next_free_slice <= entry_count`

mod find;
mod hash;
pub(crate) mod header;
mod load;
mod write;

use tracing::debug;

use crate::config::{Geometry, SLICE_SIZE};
use crate::error::Result;
use crate::flash::Partition;

pub use find::{FoundItem, ItemQuery};
pub use hash::HashIndex;
pub use header::SectorState;

/// In-memory state of one sector.
#[derive(Debug)]
pub struct Sector {
    index: usize,
    geometry: Geometry,
    state: SectorState,
    serial: u32,
    next_free_slice: usize,
    used_slice: usize,
    dropped_slice: usize,
    hash: HashIndex,
}

impl Sector {
    pub fn new(index: usize, geometry: Geometry) -> Self {
        Self {
            index,
            geometry,
            state: SectorState::Uninit,
            serial: 0,
            next_free_slice: 0,
            used_slice: 0,
            dropped_slice: 0,
            hash: HashIndex::new(geometry.entry_count()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Write a fresh header and start accepting records.
    pub fn init(&mut self, part: &Partition, serial: u32) -> Result<()> {
        let buf = header::encode(SectorState::Using, serial);
        if let Err(e) = part.write(self.index, 0, &buf) {
            self.state = SectorState::Invalid;
            return Err(e);
        }
        self.state = SectorState::Using;
        self.serial = serial;
        self.reset_counters();
        debug!(sector = self.index, serial, "sector initialized");
        Ok(())
    }

    /// Persist a new state byte.
    pub fn set_state(&mut self, part: &Partition, state: SectorState) -> Result<()> {
        if let Err(e) = part.write(self.index, header::STATE_OFFSET, &[state as u8]) {
            self.state = SectorState::Invalid;
            return Err(e);
        }
        debug!(sector = self.index, from = ?self.state, to = ?state, "sector state");
        self.state = state;
        Ok(())
    }

    /// Erase the sector back to `Uninit`.
    ///
    /// The header is marked crashed first so an interrupted erase is never
    /// mistaken for valid data.
    pub fn erase(&mut self, part: &Partition) -> Result<()> {
        if self.state != SectorState::Uninit {
            self.set_state(part, SectorState::Crashed)?;
        }
        if let Err(e) = part.erase_sector(self.index) {
            self.state = SectorState::Invalid;
            return Err(e);
        }
        self.state = SectorState::Uninit;
        self.serial = 0;
        self.reset_counters();
        debug!(sector = self.index, "sector erased");
        Ok(())
    }

    fn reset_counters(&mut self) {
        self.next_free_slice = 0;
        self.used_slice = 0;
        self.dropped_slice = 0;
        self.hash.clear();
    }

    /// Drop the in-memory index (sector leaves memory).
    pub fn unload(&mut self) {
        self.hash.clear();
    }

    // =========================================================================
    // Addressing
    // =========================================================================

    #[inline]
    pub(crate) fn header_offset(slot: usize) -> usize {
        (slot + 1) * SLICE_SIZE
    }

    #[inline]
    pub(crate) fn data_offset(slot: usize) -> usize {
        (slot + 2) * SLICE_SIZE
    }

    pub(crate) fn read_slice(&mut self, part: &Partition, slot: usize) -> Result<[u8; SLICE_SIZE]> {
        let mut buf = [0u8; SLICE_SIZE];
        if let Err(e) = part.read(self.index, Self::header_offset(slot), &mut buf) {
            self.state = SectorState::Invalid;
            return Err(e);
        }
        Ok(buf)
    }

    /// Read the out-of-line data of the record at `slot` into `buf`.
    pub fn read_data(&mut self, part: &Partition, slot: usize, buf: &mut [u8]) -> Result<()> {
        if let Err(e) = part.read(self.index, Self::data_offset(slot), buf) {
            self.state = SectorState::Invalid;
            return Err(e);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SectorState {
        self.state
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn next_free_slice(&self) -> usize {
        self.next_free_slice
    }

    pub fn used_slice(&self) -> usize {
        self.used_slice
    }

    pub fn dropped_slice(&self) -> usize {
        self.dropped_slice
    }

    pub fn live_slice(&self) -> usize {
        self.used_slice - self.dropped_slice
    }

    pub fn entry_count(&self) -> usize {
        self.geometry.entry_count()
    }

    pub fn hash(&self) -> &HashIndex {
        &self.hash
    }

    /// Bytes still appendable (zero once full).
    pub fn free_bytes(&self) -> usize {
        if self.state == SectorState::Full {
            return 0;
        }
        (self.entry_count() - self.next_free_slice) * SLICE_SIZE
    }

    /// Bytes a GC of this sector would make available.
    pub fn gc_size(&self) -> usize {
        (self.entry_count() - self.used_slice + self.dropped_slice) * SLICE_SIZE
    }

    pub fn is_writable(&self) -> bool {
        self.state == SectorState::Using
    }
}
