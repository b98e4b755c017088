//! Load-time crash recovery
//!
//! Both checks are idempotent: a power cut during recovery leaves a state
//! the next load repairs the same way.

use tracing::{debug, warn};

use super::manager::SectorManager;
use crate::error::Result;
use crate::item::{data_crc, Payload, ValueType};
use crate::sector::{ItemQuery, SectorState};

impl SectorManager {
    /// Repair the last write before the power cut.
    ///
    /// The newest record is either torn (its data checksum fails: drop it)
    /// or complete, in which case an older copy of the same key may still
    /// be live because the replace never reached its "erase old" step.
    pub(super) fn recover_incomplete_write(&mut self) -> Result<()> {
        // A pending GC means no user write was in flight.
        if self.has_deleting() {
            debug!("GC pending, skipping incomplete write check");
            return Ok(());
        }
        let Some(last) = self.current() else {
            return Ok(());
        };

        let everything = ItemQuery::all();
        let mut newest = None;
        let mut from = 0;
        while let Some(found) = self.find_in_sector(last, &everything, from)? {
            from = found.location.slot + found.header.span();
            newest = Some(found);
        }
        let Some(newest) = newest else {
            return Ok(());
        };

        if let Payload::DataCrc(crc) = newest.header.payload {
            let mut data = vec![0u8; newest.header.length];
            self.read_data(newest.location, &mut data)?;
            if data_crc(&data) != crc {
                warn!(
                    name = %newest.header.name,
                    group = newest.header.group,
                    "torn write, dropping newest record"
                );
                return self.erase_item(&newest);
            }
        }

        let name = newest.header.name;
        let query = if newest.header.value_type == ValueType::BlobSegment {
            ItemQuery::segment(newest.header.group, &name, newest.header.seg_id)
        } else {
            ItemQuery::key(newest.header.group, &name)
        };

        if let Some(old) = self.find_item_except(&query, newest.location)? {
            warn!(
                name = %name,
                group = old.header.group,
                sector = old.location.sector,
                slot = old.location.slot,
                "superseded record still live, dropping"
            );
            self.erase_item(&old)?;
        }
        Ok(())
    }

    /// Finish a GC that was interrupted after its victim was marked
    /// deleting: discard the partial target, copy again, erase the victim.
    pub(super) fn recover_incomplete_gc(&mut self) -> Result<()> {
        let Some(&deleting) = self
            .active
            .iter()
            .find(|&&i| self.sectors[i].state() == SectorState::Deleting)
        else {
            return Ok(());
        };

        warn!(sector = deleting, "interrupted GC, redoing");

        if let Some(last) = self.current() {
            if last != deleting && self.sectors[last].serial() > self.sectors[deleting].serial() {
                debug!(sector = last, "discarding partial GC target");
                self.retire_sector(last)?;
            }
        }

        let target = self.activate_sector()?;
        self.copy_sector(deleting, target)?;
        self.retire_sector(deleting)?;

        debug!(victim = deleting, target, "GC redone");
        Ok(())
    }

    /// Return the newest active sector to the idle pool when no sector is
    /// left for GC. Only an empty sector (a GC target that never received
    /// data) is given back.
    pub(super) fn release_gc_reserve(&mut self) {
        if !self.idle.is_empty() || self.active.len() < 2 {
            return;
        }
        let Some(last) = self.current() else {
            return;
        };
        if self.sectors[last].used_slice() == 0 {
            warn!(sector = last, "no GC reserve, returning newest sector to idle");
            self.active.pop();
            self.idle.push_back(last);
        } else {
            warn!(sector = last, "no GC reserve and newest sector holds data");
        }
    }

    fn has_deleting(&self) -> bool {
        self.active
            .iter()
            .any(|&i| self.sectors[i].state() == SectorState::Deleting)
    }
}
