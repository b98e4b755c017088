//! Sector Manager
//!
//! Owns every sector of one partition and decides which ones hold data.
//!
//! ## Responsibilities
//! - Load all sectors and order the active ones by serial number
//! - Hand out fresh sectors, garbage-collecting when only one is left
//! - Repair interrupted writes and interrupted GCs at load
//! - Answer lookups across the active list, oldest generation first
//! - Report space usage

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::SLICE_SIZE;
use crate::error::{KvError, Result};
use crate::flash::Partition;
use crate::item::{ItemHeader, MAX_SEGMENTS, MIN_SEGMENT_SIZE};
use crate::sector::{ItemQuery, Sector, SectorState};

/// Where a record starts: sector index in the partition and slot in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub sector: usize,
    pub slot: usize,
}

/// A record found by the manager.
#[derive(Debug, Clone)]
pub struct Located {
    pub location: Location,
    pub header: ItemHeader,
}

/// Space accounting for a partition, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceStatus {
    pub total: usize,
    pub used: usize,
    pub dropped: usize,
    pub free: usize,
}

/// Manages the sectors of one partition
///
/// ## Lists:
/// - `active`: sectors holding data, ascending serial (the last one is the
///   append target)
/// - `idle`: erased or unusable sectors waiting to be activated; one is
///   always held back for garbage collection
pub struct SectorManager {
    pub(super) part: Partition,

    /// Slab of all sectors, indexed by position in the partition
    pub(super) sectors: Vec<Sector>,

    /// Indices into `sectors`, ascending serial
    pub(super) active: Vec<usize>,

    /// Indices into `sectors`, activation order
    pub(super) idle: VecDeque<usize>,

    /// Serial for the next activated sector
    pub(super) next_serial: u32,
}

impl SectorManager {
    /// Load every sector and run crash recovery.
    ///
    /// On load:
    /// 1. Classify each sector as active (has data) or idle
    /// 2. Sort active sectors by serial number
    /// 3. Activate a first sector on a blank partition
    /// 4. Repair an interrupted write, then an interrupted GC
    /// 5. Hand back an unused GC reserve sector to the idle pool
    pub fn load(part: Partition) -> Result<Self> {
        let geometry = part.geometry();
        let mut sectors: Vec<Sector> = (0..part.sector_count())
            .map(|i| Sector::new(i, geometry))
            .collect();

        let mut active: Vec<usize> = Vec::new();
        let mut idle = VecDeque::new();

        for sector in sectors.iter_mut() {
            let loaded = sector.load(&part);
            if let Err(e) = &loaded {
                warn!(sector = sector.index(), error = %e, "sector load failed");
            }
            if loaded.is_ok() && sector.state().has_data() {
                active.push(sector.index());
            } else {
                idle.push_back(sector.index());
            }
        }
        // Physical order is not write order.
        active.sort_by_key(|&i| sectors[i].serial());

        let next_serial = active
            .last()
            .map(|&i| sectors[i].serial().wrapping_add(1))
            .unwrap_or(1);

        let mut sm = Self {
            part,
            sectors,
            active,
            idle,
            next_serial,
        };

        if sm.part.is_read_only() {
            info!(partition = sm.part.name(), active = sm.active.len(), "loaded read-only");
            return Ok(sm);
        }

        if sm.active.is_empty() {
            sm.activate_sector()?;
        }

        if let Err(e) = sm.recover_incomplete_write() {
            warn!(error = %e, "incomplete write check failed");
        }
        if let Err(e) = sm.recover_incomplete_gc() {
            warn!(error = %e, "incomplete GC check failed");
        }
        sm.release_gc_reserve();

        info!(
            partition = sm.part.name(),
            active = sm.active.len(),
            idle = sm.idle.len(),
            next_serial = sm.next_serial,
            "sectors loaded"
        );
        Ok(sm)
    }

    /// Drop every sector's in-memory index.
    pub fn unload(&mut self) {
        for sector in self.sectors.iter_mut() {
            sector.unload();
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Make room for a record of `need` bytes in a new sector.
    ///
    /// Activates an idle sector while at least two remain; with only the
    /// GC reserve left, garbage-collects instead.
    pub fn request_sector(&mut self, need: usize) -> Result<()> {
        if self.part.is_read_only() {
            return Err(KvError::ReadOnly);
        }
        match self.idle.len() {
            0 => {
                warn!(partition = self.part.name(), "no idle sector");
                Err(KvError::NoMem)
            }
            1 => self.garbage_collect(need),
            _ => self.activate_sector().map(|_| ()),
        }
    }

    /// Move the first idle sector to the end of the active list.
    pub(super) fn activate_sector(&mut self) -> Result<usize> {
        let idx = self.idle.pop_front().ok_or(KvError::NoMem)?;
        let sector = &mut self.sectors[idx];

        let prepared = if sector.state() != SectorState::Uninit {
            sector.erase(&self.part)
        } else {
            Ok(())
        }
        .and_then(|_| sector.init(&self.part, self.next_serial));

        if let Err(e) = prepared {
            self.idle.push_back(idx);
            return Err(e);
        }

        debug!(sector = idx, serial = self.next_serial, "sector activated");
        self.next_serial = self.next_serial.wrapping_add(1);
        self.active.push(idx);
        Ok(idx)
    }

    /// Erase an active sector and return it to the idle pool.
    pub(super) fn retire_sector(&mut self, idx: usize) -> Result<()> {
        self.sectors[idx].erase(&self.part)?;
        self.active.retain(|&i| i != idx);
        self.idle.push_back(idx);
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// First match in generation order.
    pub fn find_item(&mut self, query: &ItemQuery<'_>) -> Result<Option<Located>> {
        for pos in 0..self.active.len() {
            let idx = self.active[pos];
            if let Some(found) = self.find_in_sector(idx, query, 0)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// First match that is not at `exclude`.
    pub fn find_item_except(
        &mut self,
        query: &ItemQuery<'_>,
        exclude: Location,
    ) -> Result<Option<Located>> {
        for pos in 0..self.active.len() {
            let idx = self.active[pos];
            let mut from = 0;
            while let Some(found) = self.find_in_sector(idx, query, from)? {
                if found.location != exclude {
                    return Ok(Some(found));
                }
                from = found.location.slot + found.header.span();
            }
        }
        Ok(None)
    }

    /// Every match, in generation then slot order.
    pub fn find_all(&mut self, query: &ItemQuery<'_>) -> Result<Vec<Located>> {
        let mut out = Vec::new();
        for pos in 0..self.active.len() {
            let idx = self.active[pos];
            let mut from = 0;
            while let Some(found) = self.find_in_sector(idx, query, from)? {
                from = found.location.slot + found.header.span();
                out.push(found);
            }
        }
        Ok(out)
    }

    /// Match in one sector at or after `from`.
    pub fn find_in_sector(
        &mut self,
        idx: usize,
        query: &ItemQuery<'_>,
        from: usize,
    ) -> Result<Option<Located>> {
        let found = self.sectors[idx].find_item(&self.part, query, from)?;
        Ok(found.map(|f| Located {
            location: Location {
                sector: idx,
                slot: f.slot,
            },
            header: f.header,
        }))
    }

    // =========================================================================
    // Record I/O
    // =========================================================================

    pub fn write_item(&mut self, idx: usize, header: &ItemHeader, data: &[u8]) -> Result<Location> {
        let slot = self.sectors[idx].write_item(&self.part, header, data)?;
        Ok(Location { sector: idx, slot })
    }

    pub fn erase_item(&mut self, item: &Located) -> Result<()> {
        let loc = item.location;
        self.sectors[loc.sector].erase_item(&self.part, loc.slot, &item.header)
    }

    pub fn read_data(&mut self, loc: Location, buf: &mut [u8]) -> Result<()> {
        self.sectors[loc.sector].read_data(&self.part, loc.slot, buf)
    }

    // =========================================================================
    // Space
    // =========================================================================

    /// Whether a blob of `size` bytes can be laid out in the free space of
    /// idle sectors and (after GC) active sectors, without writing anything.
    pub fn check_write_blob_size(&self, size: usize) -> Result<()> {
        let single = self.part.geometry().max_item_size() as isize;
        let slice = SLICE_SIZE as isize;
        let mut left = size as isize;

        if left > (self.sectors.len() as isize - 1) * single {
            return Err(KvError::NoSpace);
        }
        if left > MAX_SEGMENTS as isize * single {
            return Err(KvError::InvalidLength);
        }

        left -= (self.idle.len() as isize - 1) * single;
        if left <= -slice {
            return Ok(());
        }

        let mut segments = 0;
        for &idx in &self.active {
            let sector = &self.sectors[idx];
            let free = sector.gc_size() as isize;

            if left > 0 && segments >= MAX_SEGMENTS {
                debug!("blob would exceed segment limit");
                break;
            }
            if left > 0 {
                if left + slice <= free {
                    segments += 1;
                    left = 0;
                    if sector.next_free_slice() < sector.entry_count() {
                        return Ok(());
                    }
                } else if free >= (MIN_SEGMENT_SIZE as isize) + slice {
                    left -= free - slice;
                    segments += 1;
                }
            } else if free >= slice {
                return Ok(());
            }
        }

        Err(KvError::NoSpace)
    }

    pub fn status(&self) -> SpaceStatus {
        let (used, dropped) = self.active.iter().fold((0, 0), |(u, d), &i| {
            let s = &self.sectors[i];
            (u + s.used_slice() + 1, d + s.dropped_slice())
        });
        let total = self.part.geometry().sector_size() * self.sectors.len();
        let used = used * SLICE_SIZE;
        SpaceStatus {
            total,
            used,
            dropped: dropped * SLICE_SIZE,
            free: total.saturating_sub(used),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn partition(&self) -> &Partition {
        &self.part
    }

    pub fn sector(&self, idx: usize) -> &Sector {
        &self.sectors[idx]
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// Active sector indices, ascending serial.
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// The append target.
    pub fn current(&self) -> Option<usize> {
        self.active.last().copied()
    }

    pub fn next_serial(&self) -> u32 {
        self.next_serial
    }

    /// Position in the active list of the first sector with a serial
    /// greater than `serial`.
    pub fn active_after_serial(&self, serial: u32) -> usize {
        self.active
            .iter()
            .position(|&i| self.sectors[i].serial() > serial)
            .unwrap_or(self.active.len())
    }

    /// Position in the active list of the sector with `serial`, if it is
    /// still active.
    pub fn active_position(&self, idx: usize, serial: u32) -> Option<usize> {
        self.active
            .iter()
            .position(|&i| i == idx && self.sectors[i].serial() == serial)
    }
}
